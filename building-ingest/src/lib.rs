pub mod api;
pub mod app;
pub mod config;
pub mod metrics_server;
pub mod observability;
pub mod pipeline;
pub mod sinks;
pub mod sources;
pub mod transform;
pub mod transport;

pub use pipeline::{Envelope, Pipeline};
