//! Object storage backends the database dumps are copied to.
//!
//! Currently the following backends are implemented:
//!
//! - [S3]: Amazon S3 through the `aws` CLI.
//! - [Minio]: MinIO (or any S3 compatible store) through the `mc` CLI.

pub mod minio;
pub mod s3;

use std::fmt;
use std::path::Path;

use clap::ValueEnum;
use derive_more::Display;

pub use minio::Minio;
pub use s3::S3;

use crate::util::{CommandError, Runner};

/// Generic object storage backend.
pub trait ObjectStore {
    /// Copies the local `file` to the remote location.
    fn upload(&self, file: &Path) -> Result<(), CommandError>;

    /// Copies the remote object `name` to the local path `dest`.
    fn download(&self, name: &str, dest: &Path) -> Result<(), CommandError>;
}

/// Kind of object storage, selected by `BACKUP_TYPE`.
#[derive(Copy, Clone, ValueEnum, Debug, Display, PartialEq, Eq)]
pub enum BackupType {
    /// Amazon S3 using the `aws` CLI.
    #[display("s3")]
    S3,
    /// MinIO using the `mc` CLI.
    #[display("minio")]
    Minio,
}

impl BackupType {
    /// Creates the [ObjectStore] for this kind of storage.
    pub fn store<'a>(
        self,
        remote: RemotePath,
        runner: &'a dyn Runner,
    ) -> Box<dyn ObjectStore + 'a> {
        match self {
            Self::S3 => Box::new(S3::new(remote, runner)),
            Self::Minio => Box::new(Minio::new(remote, runner)),
        }
    }
}

/// Remote prefix the backups live under, e.g. `s3://bucket/db/`.
///
/// Always ends with a `/`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemotePath(String);

impl RemotePath {
    /// Returns [None] for an empty (or blank) path.
    pub fn new(path: &str) -> Option<Self> {
        let path = path.trim();
        if path.is_empty() {
            None
        } else if path.ends_with('/') {
            Some(Self(path.to_string()))
        } else {
            Some(Self(format!("{path}/")))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Remote location of the object `name`.
    pub fn join(&self, name: &str) -> String {
        format!("{}{name}", self.0)
    }
}

impl fmt::Display for RemotePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
