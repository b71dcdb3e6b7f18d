use std::path::PathBuf;

use anyhow::Result;
use building_ingest::{app, config::AppConfig, metrics_server, observability, transport};
use tokio_util::sync::CancellationToken;

/// Publish every event of one simulation CSV export, then exit.
///
/// Usage: `publish_simulation <csv_path>`
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let csv_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .ok_or_else(|| anyhow::anyhow!("usage: publish_simulation <csv_path>"))?;

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let broker = transport::resolve_broker(&cfg.mqtt).await?;

    let cancel = CancellationToken::new();
    app::cancel_on_ctrl_c(cancel.clone());

    let pipeline = app::publish_pipeline(&cfg, broker, &csv_path, cancel).await?;
    pipeline.run().await?;

    Ok(())
}
