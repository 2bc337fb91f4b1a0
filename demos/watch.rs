//! Example: watching a live telemetry stream.
//!
//! Point it at an SSE endpoint emitting `mem` and `cpu` events and it prints
//! each decoded frame until interrupted.
//!
//! Run with: cargo run --example watch -- http://127.0.0.1:8080/events

use sse_telemetry_client::{MetricFrame, MetricKind, TelemetryClient, TelemetryClientConfig};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "sse_telemetry_client=debug,watch=info".into()),
        )
        .init();

    let url = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "http://127.0.0.1:8080/events".to_string());

    let config = TelemetryClientConfig::builder().url(url).build()?;
    let client = TelemetryClient::new(config);

    client.subscribe(MetricKind::Memory, |frame| {
        if let MetricFrame::Memory(m) = frame {
            println!(
                "mem: used {:.2}% ({} / {} bytes, {} available)",
                m.used_percent, m.used, m.total, m.available
            );
        }
    });
    client.subscribe(MetricKind::Cpu, |frame| {
        if let MetricFrame::Cpu(c) = frame {
            println!(
                "cpu: user {:.2} system {:.2} idle {:.2}",
                c.user, c.system, c.idle
            );
        }
    });

    client.start()?;
    info!("streaming, press ctrl-c to stop");

    tokio::signal::ctrl_c().await?;
    client.stop();
    info!(snapshot = ?client.metrics().snapshot(), "stopped");
    Ok(())
}
