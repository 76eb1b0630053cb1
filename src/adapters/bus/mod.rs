//! Event bus adapters.

#[cfg(feature = "kafka")]
pub mod kafka;
pub mod memory;

#[cfg(feature = "kafka")]
pub use kafka::{KafkaBusConfig, KafkaEventBus};
pub use memory::{InProcessBus, InProcessBusConfig};
