pub mod deribit;
pub mod snapshot_source;

// Re-export commonly used types
pub use deribit::DeribitClient;
pub use snapshot_source::{SnapshotSource, SourceStatus, OPTION_KIND};
