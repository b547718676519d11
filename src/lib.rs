//! Library to backup and restore [PostgreSQL][pg] databases via object storage.
//!
//! A [backup](pipeline::BackupPipeline) dumps every configured database with
//! `pg_dump`, copies the dump to S3 or MinIO (see [`backends`]), prunes local
//! dumps outside the [retention window](util::RetentionWindow) and notifies by
//! mail and webhook. A [restore](pipeline::RestorePipeline) fetches a dump if it
//! isn't available locally and replays it with `pg_restore`.
//!
//! Dumps are named `<database>_<YYYY-MM-DD>`, see [`artifact`].
//!
//! <div class="warning">
//! Runs are not locked against each other: overlapping backup or restore runs
//! race on the backup directory. External tools are run without a timeout, so
//! a hanging tool hangs the run.
//! </div>
//!
//! [pg]: https://www.postgresql.org/

#![forbid(unsafe_code)]

pub mod artifact;
pub mod backends;
pub mod cli;
pub mod config;
pub mod notify;
pub mod pipeline;
pub mod postgres;
pub mod util;
