pub mod ledger;
pub mod replication;
pub mod store;

pub use ledger::{LedgerError, Portfolio, PortfolioSummary, Position, Trade, TradeSide};
pub use replication::{GitReplicationSink, NoopReplicationSink};
pub use store::PortfolioStore;
