//! Helpers shared by the backup and restore pipelines.

pub mod command;
pub mod retention;

pub use command::{CommandError, Invocation, Runner, SystemRunner};
pub use retention::{PruneError, Pruned, RetentionWindow};
