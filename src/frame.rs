use crate::error::DecodeError;
use serde::{Deserialize, Serialize};

/// The metric kinds carried on the stream, tagged by SSE event name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Memory telemetry (`mem` events)
    Memory,
    /// CPU telemetry (`cpu` events)
    Cpu,
}

impl MetricKind {
    /// The wire event name for this kind.
    pub fn event_name(&self) -> &'static str {
        match self {
            MetricKind::Memory => "mem",
            MetricKind::Cpu => "cpu",
        }
    }

    /// Map a wire event name back to a kind, if recognized.
    pub fn from_event_name(name: &str) -> Option<Self> {
        match name {
            "mem" => Some(MetricKind::Memory),
            "cpu" => Some(MetricKind::Cpu),
            _ => None,
        }
    }
}

/// Memory telemetry snapshot. Byte counts plus a usage percentage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MemoryStats {
    pub total: u64,
    pub free: u64,
    pub available: u64,
    pub used: u64,
    pub used_percent: f64,
}

/// CPU telemetry snapshot, percentages per mode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CpuStats {
    pub user: f64,
    pub system: f64,
    pub idle: f64,
}

/// One decoded unit of telemetry. The tag determines which fields exist;
/// there are no cross-variant fields.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricFrame {
    Memory(MemoryStats),
    Cpu(CpuStats),
}

impl MetricFrame {
    /// The kind tag of this frame.
    pub fn kind(&self) -> MetricKind {
        match self {
            MetricFrame::Memory(_) => MetricKind::Memory,
            MetricFrame::Cpu(_) => MetricKind::Cpu,
        }
    }

    /// Decode a raw event payload into a typed frame.
    ///
    /// Pure transformation, no side effects. Percentages outside [0, 100]
    /// are rejected rather than silently accepted, to surface upstream
    /// server bugs at the boundary.
    pub fn decode(event_name: &str, payload: &str) -> Result<MetricFrame, DecodeError> {
        match MetricKind::from_event_name(event_name) {
            None => Err(DecodeError::UnknownKind(event_name.to_string())),
            Some(MetricKind::Memory) => {
                let stats: MemoryStats = serde_json::from_str(payload)?;
                check_percent("usedPercent", stats.used_percent)?;
                Ok(MetricFrame::Memory(stats))
            }
            Some(MetricKind::Cpu) => {
                let stats: CpuStats = serde_json::from_str(payload)?;
                check_percent("user", stats.user)?;
                check_percent("system", stats.system)?;
                check_percent("idle", stats.idle)?;
                Ok(MetricFrame::Cpu(stats))
            }
        }
    }
}

// NaN fails the range check as well: `contains` is false for NaN.
fn check_percent(field: &'static str, value: f64) -> Result<(), DecodeError> {
    if !(0.0..=100.0).contains(&value) {
        return Err(DecodeError::OutOfRange { field, value });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const MEM_PAYLOAD: &str =
        r#"{"total":8589934592,"free":1073741824,"available":2147483648,"used":6442450944,"usedPercent":75.0}"#;
    const CPU_PAYLOAD: &str = r#"{"user":12.5,"system":3.75,"idle":83.75}"#;

    #[test]
    fn test_decode_mem() {
        let frame = MetricFrame::decode("mem", MEM_PAYLOAD).unwrap();
        assert_eq!(frame.kind(), MetricKind::Memory);
        match frame {
            MetricFrame::Memory(m) => {
                assert_eq!(m.total, 8589934592);
                assert_eq!(m.free, 1073741824);
                assert_eq!(m.available, 2147483648);
                assert_eq!(m.used, 6442450944);
                assert_eq!(m.used_percent, 75.0);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_decode_cpu() {
        let frame = MetricFrame::decode("cpu", CPU_PAYLOAD).unwrap();
        assert_eq!(frame.kind(), MetricKind::Cpu);
        match frame {
            MetricFrame::Cpu(c) => {
                assert_eq!(c.user, 12.5);
                assert_eq!(c.system, 3.75);
                assert_eq!(c.idle, 83.75);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn test_round_trip_preserves_values() {
        let MetricFrame::Memory(m) = MetricFrame::decode("mem", MEM_PAYLOAD).unwrap() else {
            panic!("wrong variant");
        };
        let reserialized = serde_json::to_string(&m).unwrap();
        let reparsed: MemoryStats = serde_json::from_str(&reserialized).unwrap();
        assert_eq!(m, reparsed);

        let MetricFrame::Cpu(c) = MetricFrame::decode("cpu", CPU_PAYLOAD).unwrap() else {
            panic!("wrong variant");
        };
        let reserialized = serde_json::to_string(&c).unwrap();
        let reparsed: CpuStats = serde_json::from_str(&reserialized).unwrap();
        assert_eq!(c, reparsed);
    }

    #[test]
    fn test_unknown_kind() {
        let err = MetricFrame::decode("disk", "{}").unwrap_err();
        assert!(matches!(err, DecodeError::UnknownKind(k) if k == "disk"));
    }

    #[test]
    fn test_missing_fields_are_malformed() {
        let err = MetricFrame::decode("mem", r#"{"total":100,"free":10}"#).unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn test_non_numeric_field_is_malformed() {
        let err = MetricFrame::decode("cpu", r#"{"user":"a lot","system":0,"idle":0}"#)
            .unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));

        // Negative byte counts cannot deserialize into u64
        let err = MetricFrame::decode(
            "mem",
            r#"{"total":-1,"free":0,"available":0,"used":0,"usedPercent":0}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::MalformedPayload(_)));
    }

    #[test]
    fn test_out_of_range_cpu() {
        let err = MetricFrame::decode("cpu", r#"{"user":150,"system":0,"idle":0}"#).unwrap_err();
        match err {
            DecodeError::OutOfRange { field, value } => {
                assert_eq!(field, "user");
                assert_eq!(value, 150.0);
            }
            other => panic!("expected OutOfRange, got {other:?}"),
        }
    }

    #[test]
    fn test_out_of_range_used_percent() {
        let err = MetricFrame::decode(
            "mem",
            r#"{"total":100,"free":0,"available":0,"used":100,"usedPercent":100.5}"#,
        )
        .unwrap_err();
        assert!(matches!(err, DecodeError::OutOfRange { field: "usedPercent", .. }));
    }

    #[test]
    fn test_boundary_percentages_accepted() {
        assert!(MetricFrame::decode("cpu", r#"{"user":0.0,"system":100.0,"idle":0.0}"#).is_ok());
        assert!(MetricFrame::decode(
            "mem",
            r#"{"total":1,"free":0,"available":0,"used":1,"usedPercent":100.0}"#
        )
        .is_ok());
    }

    #[test]
    fn test_event_name_round_trip() {
        for kind in [MetricKind::Memory, MetricKind::Cpu] {
            assert_eq!(MetricKind::from_event_name(kind.event_name()), Some(kind));
        }
        assert_eq!(MetricKind::from_event_name("message"), None);
    }
}
