pub mod controller;
pub mod state;

use thiserror::Error;

pub use controller::SlotSynchronizer;
pub use state::{Connectivity, SlotSummary, SyncState};

/// Failures the synchronizer can run into. None of them are fatal: the state
/// always stays displayable.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum SyncError {
    /// Loading the table failed; retry with another load.
    #[error("failed to fetch parking data: {0}")]
    Fetch(String),
    /// The push channel degraded; data is kept but may be stale.
    #[error("transport degraded: {0}")]
    Transport(String),
    #[error("slot index {0} is outside the tracked range")]
    OutOfRange(i64),
}
