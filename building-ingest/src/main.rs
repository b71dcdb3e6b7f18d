use std::path::PathBuf;

use anyhow::Result;
use building_ingest::{
    api, app,
    config::AppConfig,
    metrics_server, observability,
    transport::{self, MessageTransport},
};
use tokio_util::sync::CancellationToken;

/// Subscribe path, query API and, when a CSV path is given, the publish path.
#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    let cfg = AppConfig::load()?;

    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    let csv_path = std::env::args().nth(1).map(PathBuf::from);

    let broker = transport::resolve_broker(&cfg.mqtt).await?;
    let store = app::open_store(&cfg).await?;

    let cancel = CancellationToken::new();
    app::cancel_on_ctrl_c(cancel.clone());

    let publish = match &csv_path {
        Some(path) => match app::publish_pipeline(&cfg, broker, path, cancel.clone()).await {
            Ok(p) => Some(p),
            Err(e) => {
                store.close().await;
                return Err(e);
            }
        },
        None => None,
    };

    // Closed below as well, since `try_join!` drops the publish path on the first error.
    let publish_transport = publish.as_ref().map(|p| p.sink.transport());

    let subscribe = app::subscribe_pipeline(&cfg, broker, store.clone(), cancel.clone());

    let result = tokio::try_join!(
        async { subscribe.run().await.map_err(anyhow::Error::from) },
        api::serve(&cfg.api.bind_addr, store.clone(), cancel.clone()),
        async {
            match publish {
                Some(p) => p.run().await.map_err(anyhow::Error::from),
                None => Ok(()),
            }
        },
    );

    cancel.cancel();
    if let Some(transport) = publish_transport {
        transport.close().await;
    }
    store.close().await;
    tracing::info!("shutdown complete");

    result.map(|_| ())
}
