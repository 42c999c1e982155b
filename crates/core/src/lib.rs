pub mod config;
pub mod config_loader;
pub mod session;
pub mod signal;
pub mod snapshot;
pub mod traits;

pub use config::{
    AppConfig, DatabaseConfig, ExportConfig, ReplicationConfig, SessionConfig,
};
pub use config_loader::ConfigLoader;
pub use session::SessionClock;
pub use signal::{evaluate, Action, PositionView, Signal, SignalParams};
pub use snapshot::{Snapshot, SnapshotRow, SnapshotWindow};
pub use traits::{ReplicationSink, SnapshotSource, SourceError};
