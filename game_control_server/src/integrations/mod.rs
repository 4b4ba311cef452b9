mod sinks;

pub use sinks::{SinkApi, SinkConfig, SinkError};
