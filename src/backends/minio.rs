//! Implements the [ObjectStore] for MinIO using the `mc` client.

use std::path::Path;
use std::process::Command;

use super::{ObjectStore, RemotePath};
use crate::util::{CommandError, Runner};

/// MinIO backend.
///
/// The remote path is expected to start with an `mc` alias, e.g. `minio/backups/`.
pub struct Minio<'a> {
    remote: RemotePath,
    runner: &'a dyn Runner,
}

impl<'a> Minio<'a> {
    pub fn new(remote: RemotePath, runner: &'a dyn Runner) -> Self {
        Self { remote, runner }
    }
}

impl ObjectStore for Minio<'_> {
    fn upload(&self, file: &Path) -> Result<(), CommandError> {
        log::debug!(target: "backend::minio", "Uploading {} to {}", file.display(), self.remote);

        let mut command = Command::new("mc");
        command.arg("cp").arg(file).arg(self.remote.as_str());
        self.runner.run(&mut command)?;

        Ok(())
    }

    fn download(&self, name: &str, dest: &Path) -> Result<(), CommandError> {
        let source = self.remote.join(name);
        log::debug!(target: "backend::minio", "Downloading {source} to {}", dest.display());

        let mut command = Command::new("mc");
        command.arg("cp").arg(source).arg(dest);
        self.runner.run(&mut command)?;

        Ok(())
    }
}
