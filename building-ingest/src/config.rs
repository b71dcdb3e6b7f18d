use serde::Deserialize;
use std::{fs, time::Duration};

#[derive(Debug, Clone, Deserialize)]
pub struct MqttConfig {
    pub host: String,
    #[serde(default = "default_mqtt_port")]
    pub port: u16,
    #[serde(default = "default_publisher_client_id")]
    pub publisher_client_id: String,
    #[serde(default = "default_subscriber_client_id")]
    pub subscriber_client_id: String,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    /// 0 = at most once, 1 = at least once.
    #[serde(default = "default_qos")]
    pub qos: u8,
    #[serde(default = "default_ack_timeout_ms")]
    pub ack_timeout_ms: u64,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_reconnect_backoff_ms")]
    pub reconnect_backoff_ms: u64,
    #[serde(default = "default_channel_capacity")]
    pub channel_capacity: usize,
}

impl MqttConfig {
    pub fn ack_timeout(&self) -> Duration {
        Duration::from_millis(self.ack_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn reconnect_backoff(&self) -> Duration {
        Duration::from_millis(self.reconnect_backoff_ms)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Questdb,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StoreConfig {
    pub kind: StoreKind,
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuestDbConfig {
    pub uri: String,
    pub ilp_tcp_addr: String,
    pub max_connections: u32,
    #[serde(default = "default_store_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub bind_addr: String,
}

/// `{block × orientation × floor}` combinations the simulation may report.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TopologyConfig {
    pub blocks: Vec<String>,
    pub orientations: Vec<String>,
    pub floors: Vec<String>,
}

impl Default for TopologyConfig {
    fn default() -> Self {
        let owned = |xs: &[&str]| xs.iter().map(|s| s.to_string()).collect();
        Self {
            blocks: owned(&["BLOCK1", "BLOCK2"]),
            orientations: owned(&["OFFICEXSW", "OFFICEXSE", "OFFICEXNW", "OFFICEXNE", "CORRIDOR"]),
            floors: owned(&["X1F", "X2F"]),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    #[serde(default = "default_reference_year")]
    pub reference_year: i32,
    #[serde(default)]
    pub topology: TopologyConfig,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            reference_year: default_reference_year(),
            topology: TopologyConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub bind_addr: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub store: StoreConfig,
    pub questdb: Option<QuestDbConfig>,
    pub api: ApiConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
    pub metrics: Option<MetricsConfig>,
}

impl AppConfig {
    pub fn load() -> anyhow::Result<Self> {
        use std::env;

        let path = env::var("BUILDING_INGEST_CONFIG")
            .unwrap_or_else(|_| "building-ingest.toml".to_string());
        let contents = fs::read_to_string(&path)
            .map_err(|e| anyhow::anyhow!("failed to read config '{path}': {e}"))?;
        Self::from_toml(&contents)
    }

    pub fn from_toml(contents: &str) -> anyhow::Result<Self> {
        let cfg: AppConfig = toml::from_str(contents)?;
        if cfg.mqtt.qos > 1 {
            anyhow::bail!("mqtt.qos must be 0 or 1, got {}", cfg.mqtt.qos);
        }
        if cfg.mqtt.channel_capacity == 0 {
            anyhow::bail!("mqtt.channel_capacity must be greater than zero");
        }
        if cfg.store.kind == StoreKind::Questdb && cfg.questdb.is_none() {
            anyhow::bail!("store.kind = \"questdb\" requires a [questdb] section");
        }
        Ok(cfg)
    }
}

fn default_mqtt_port() -> u16 {
    1883
}

fn default_publisher_client_id() -> String {
    "simulation_publisher".to_string()
}

fn default_subscriber_client_id() -> String {
    "store_writer".to_string()
}

fn default_keep_alive_secs() -> u64 {
    30
}

fn default_qos() -> u8 {
    1
}

fn default_ack_timeout_ms() -> u64 {
    5_000
}

fn default_connect_timeout_ms() -> u64 {
    10_000
}

fn default_reconnect_backoff_ms() -> u64 {
    1_000
}

fn default_channel_capacity() -> usize {
    1_024
}

fn default_store_timeout_ms() -> u64 {
    30_000
}

fn default_reference_year() -> i32 {
    2005
}
