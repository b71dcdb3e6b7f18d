//! Wiring shared by the binaries: store selection and the two pipelines.

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use building_client::{
    db::{MemoryStore, QuestDbSettings, QuestDbStore},
    domain::MeasurementEvent,
};
use tokio_util::sync::CancellationToken;

use crate::{
    api::SharedStore,
    config::{AppConfig, StoreKind},
    pipeline::Pipeline,
    sinks::{PublisherSink, StoreWriterSink},
    sources::{MqttSubscriptionSource, SimulationCsvSource},
    transform::{MeasurementValidation, RowTransformer},
    transport::MqttTransport,
};

pub type PublishPipeline =
    Pipeline<SimulationCsvSource, MeasurementEvent, PublisherSink<MqttTransport>>;
pub type SubscribePipeline = Pipeline<MqttSubscriptionSource, MeasurementEvent, StoreWriterSink>;

pub async fn open_store(cfg: &AppConfig) -> anyhow::Result<SharedStore> {
    match cfg.store.kind {
        StoreKind::Memory => {
            tracing::warn!("using in-memory store; data is lost on exit");
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreKind::Questdb => {
            let q = cfg.questdb.as_ref().ok_or_else(|| {
                anyhow::anyhow!("store.kind = \"questdb\" requires a [questdb] section")
            })?;
            let ilp_addr: SocketAddr = q
                .ilp_tcp_addr
                .parse()
                .map_err(|e| anyhow::anyhow!("invalid questdb.ilp_tcp_addr: {e}"))?;

            let settings = QuestDbSettings {
                uri: q.uri.clone(),
                max_connections: q.max_connections,
                ilp_addr,
                timeout: Duration::from_millis(q.timeout_ms),
            };
            let store = QuestDbStore::connect(&settings).await?;
            tracing::info!(%ilp_addr, "connected to QuestDB");
            Ok(Arc::new(store))
        }
    }
}

/// CSV → validation → MQTT publisher. Fails if the file cannot be opened.
pub async fn publish_pipeline(
    cfg: &AppConfig,
    broker: SocketAddr,
    csv_path: &Path,
    cancel: CancellationToken,
) -> anyhow::Result<PublishPipeline> {
    let transformer = RowTransformer::new(&cfg.simulation.topology, cfg.simulation.reference_year);
    let source = SimulationCsvSource::open(csv_path, transformer, cancel)?;

    let transport = Arc::new(MqttTransport::start(&cfg.mqtt, broker));
    if !transport.wait_connected(cfg.mqtt.connect_timeout()).await {
        tracing::warn!(
            %broker,
            timeout_ms = cfg.mqtt.connect_timeout_ms,
            "MQTT broker not connected yet, publishes fail until it is"
        );
    }

    Ok(Pipeline {
        source,
        transforms: vec![Arc::new(MeasurementValidation)],
        sink: PublisherSink::new(transport),
    })
}

/// MQTT subscription → validation → store.
pub fn subscribe_pipeline(
    cfg: &AppConfig,
    broker: SocketAddr,
    store: SharedStore,
    cancel: CancellationToken,
) -> SubscribePipeline {
    Pipeline {
        source: MqttSubscriptionSource::new(&cfg.mqtt, broker, cancel),
        transforms: vec![Arc::new(MeasurementValidation)],
        sink: StoreWriterSink::new(store),
    }
}

/// Cancel `cancel` on Ctrl-C.
pub fn cancel_on_ctrl_c(cancel: CancellationToken) {
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("interrupt received, shutting down"),
            Err(e) => tracing::error!(error = %e, "failed to listen for Ctrl-C, shutting down"),
        }
        cancel.cancel();
    });
}
