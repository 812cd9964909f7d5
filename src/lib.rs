#![forbid(unsafe_code)]

// groundlink library - concurrent ground-station link load harness

pub mod config;
pub mod control_plane;
pub mod error;
pub mod fleet;
pub mod ground_station;
pub mod metrics;
pub mod reporter;
pub mod session;
pub mod signaling;
pub mod stop;

pub use error::{LinkError, LinkResult};
