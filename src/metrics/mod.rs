//! Temperature acquisition and metric publishing.
//!
//! The [`acquirer`] runs the external tools and turns their output into
//! validated readings, the [`publisher`] owns the gauges and renders them for
//! scrapes, and the [`collector`] ties the two together on a timer.

pub mod acquirer;
pub mod collector;
pub mod command;
pub mod data;
pub mod publisher;
pub mod traits;

// Re-export commonly used items
pub use acquirer::ReadingAcquirer;
pub use collector::{LoopState, TemperatureCollector};
pub use command::SystemCommandRunner;
pub use data::{FieldPath, SensorSnapshot, TickReport};
pub use publisher::MetricPublisher;
pub use traits::{CommandOutput, CommandRunner, ToolCommand};
