//! Incremental SSE wire codec.
//!
//! Fed raw body bytes in whatever chunks the transport produces, emits
//! complete events. Follows the SSE field grammar: `event:`, `data:`
//! (multi-line, joined with `\n`), `id:`, `retry:`, and `:` comment lines;
//! a blank line dispatches the pending event. Accepts CRLF, LF, and bare CR
//! line endings, and strips a leading UTF-8 BOM.

use crate::error::Error;
use std::time::Duration;

const UTF8_BOM: &[u8] = b"\xef\xbb\xbf";

/// One complete event dispatched off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SseEvent {
    /// Event name (`"message"` when the server sent none)
    pub name: String,
    /// Data payload; multi-line data joined with `\n`
    pub data: String,
    /// Last event id seen at dispatch time, if any
    pub id: Option<String>,
}

/// Incremental parser state. One instance per connection.
#[derive(Debug)]
pub struct SseParser {
    max_line_length: usize,
    buf: Vec<u8>,
    checked_bom: bool,
    /// A bare CR ended the previous chunk; swallow an LF that follows it
    skip_leading_lf: bool,
    event_name: String,
    data: String,
    has_data: bool,
    last_event_id: Option<String>,
    retry: Option<Duration>,
}

impl SseParser {
    pub fn new(max_line_length: usize) -> Self {
        Self {
            max_line_length,
            buf: Vec::new(),
            checked_bom: false,
            skip_leading_lf: false,
            event_name: String::new(),
            data: String::new(),
            has_data: false,
            last_event_id: None,
            retry: None,
        }
    }

    /// The most recent `id:` value, used for the `Last-Event-ID` request
    /// header on reconnect.
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    /// Server-suggested reconnection delay from the `retry:` field, if any.
    pub fn retry(&self) -> Option<Duration> {
        self.retry
    }

    /// Feed a chunk of body bytes, returning every event completed by it.
    pub fn feed(&mut self, chunk: &[u8]) -> Result<Vec<SseEvent>, Error> {
        self.buf.extend_from_slice(chunk);
        let mut out = Vec::new();

        if !self.checked_bom {
            if self.buf.len() >= UTF8_BOM.len() {
                if self.buf.starts_with(UTF8_BOM) {
                    self.buf.drain(..UTF8_BOM.len());
                }
                self.checked_bom = true;
            } else if !UTF8_BOM.starts_with(&self.buf) {
                self.checked_bom = true;
            } else {
                // Could still be a split BOM; wait for more bytes
                return Ok(out);
            }
        }

        loop {
            if self.skip_leading_lf {
                if self.buf.is_empty() {
                    break;
                }
                if self.buf[0] == b'\n' {
                    self.buf.drain(..1);
                }
                self.skip_leading_lf = false;
            }

            let Some(pos) = self.buf.iter().position(|&b| b == b'\n' || b == b'\r') else {
                if self.buf.len() > self.max_line_length {
                    return Err(Error::Protocol(format!(
                        "SSE line exceeds {} bytes",
                        self.max_line_length
                    )));
                }
                break;
            };
            if pos > self.max_line_length {
                return Err(Error::Protocol(format!(
                    "SSE line exceeds {} bytes",
                    self.max_line_length
                )));
            }

            let is_cr = self.buf[pos] == b'\r';
            let line = String::from_utf8_lossy(&self.buf[..pos]).into_owned();
            let mut consumed = pos + 1;
            if is_cr {
                match self.buf.get(pos + 1) {
                    Some(&b'\n') => consumed += 1,
                    Some(_) => {}
                    // CRLF may straddle chunk boundaries
                    None => self.skip_leading_lf = true,
                }
            }
            self.buf.drain(..consumed);
            self.process_line(&line, &mut out);
        }

        Ok(out)
    }

    fn process_line(&mut self, line: &str, out: &mut Vec<SseEvent>) {
        if line.is_empty() {
            self.dispatch(out);
            return;
        }
        if line.starts_with(':') {
            // Comment; servers use these as keep-alives
            return;
        }

        // "field: value" with one optional space after the colon;
        // a line with no colon is a field with an empty value.
        let (field, value) = match line.split_once(':') {
            Some((field, value)) => (field, value.strip_prefix(' ').unwrap_or(value)),
            None => (line, ""),
        };

        match field {
            "event" => {
                self.event_name.clear();
                self.event_name.push_str(value);
            }
            "data" => {
                if self.has_data {
                    self.data.push('\n');
                }
                self.data.push_str(value);
                self.has_data = true;
            }
            "id" => {
                if !value.contains('\0') {
                    self.last_event_id = Some(value.to_string());
                }
            }
            "retry" => {
                if !value.is_empty() && value.bytes().all(|b| b.is_ascii_digit()) {
                    if let Ok(ms) = value.parse::<u64>() {
                        self.retry = Some(Duration::from_millis(ms));
                    }
                }
            }
            // Unrecognized fields are ignored per the SSE grammar
            _ => {}
        }
    }

    fn dispatch(&mut self, out: &mut Vec<SseEvent>) {
        if !self.has_data {
            // Blank line with an empty data buffer resets the event name
            // without dispatching anything
            self.event_name.clear();
            return;
        }
        let name = if self.event_name.is_empty() {
            "message".to_string()
        } else {
            std::mem::take(&mut self.event_name)
        };
        out.push(SseEvent {
            name,
            data: std::mem::take(&mut self.data),
            id: self.last_event_id.clone(),
        });
        self.has_data = false;
        self.event_name.clear();
    }
}
