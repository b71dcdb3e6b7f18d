pub mod event_publisher;
pub mod store_writer;

pub use event_publisher::{EventPublisher, PublishSummary, PublisherSink};
pub use store_writer::StoreWriterSink;
