//! The two workflows of the tool: [backup] and [restore].

pub mod backup;
pub mod restore;

pub use backup::{BackupError, BackupPipeline, BackupReport};
pub use restore::{RestoreError, RestorePipeline};
