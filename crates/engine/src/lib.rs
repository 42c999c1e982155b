pub mod service;
pub mod watcher;

#[cfg(test)]
pub(crate) mod testing;

pub use service::{Monitor, MonitorConfig, StepOutcome};
pub use watcher::SnapshotWatcher;
