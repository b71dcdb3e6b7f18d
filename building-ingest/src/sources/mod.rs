pub mod mqtt_subscription;
pub mod simulation_csv_file;

pub use mqtt_subscription::MqttSubscriptionSource;
pub use simulation_csv_file::SimulationCsvSource;
