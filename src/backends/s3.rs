//! Implements the [ObjectStore] for Amazon S3 using the `aws` CLI.

use std::path::Path;
use std::process::Command;

use super::{ObjectStore, RemotePath};
use crate::util::{CommandError, Runner};

/// Storage class for uploaded dumps; they are rarely read back.
const STORAGE_CLASS: &str = "STANDARD_IA";

/// Amazon S3 backend.
pub struct S3<'a> {
    remote: RemotePath,
    runner: &'a dyn Runner,
}

impl<'a> S3<'a> {
    pub fn new(remote: RemotePath, runner: &'a dyn Runner) -> Self {
        Self { remote, runner }
    }
}

impl ObjectStore for S3<'_> {
    fn upload(&self, file: &Path) -> Result<(), CommandError> {
        log::debug!(target: "backend::s3", "Uploading {} to {}", file.display(), self.remote);

        let mut command = Command::new("aws");
        command
            .arg("s3")
            .arg("cp")
            .arg(format!("--storage-class={STORAGE_CLASS}"))
            .arg(file)
            .arg(self.remote.as_str());
        self.runner.run(&mut command)?;

        Ok(())
    }

    fn download(&self, name: &str, dest: &Path) -> Result<(), CommandError> {
        let source = self.remote.join(name);
        log::debug!(target: "backend::s3", "Downloading {source} to {}", dest.display());

        let mut command = Command::new("aws");
        command.arg("s3").arg("cp").arg(source).arg(dest);
        self.runner.run(&mut command)?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::command::fake::FakeRunner;

    #[test]
    fn upload_copies_file_into_prefix() {
        let runner = FakeRunner::succeeding();
        let s3 = S3::new(RemotePath::new("s3://bucket/db").unwrap(), &runner);

        s3.upload(Path::new("/backups/orders_2024-03-01")).unwrap();

        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].program, "aws");
        assert_eq!(
            calls[0].args,
            [
                "s3",
                "cp",
                "--storage-class=STANDARD_IA",
                "/backups/orders_2024-03-01",
                "s3://bucket/db/"
            ]
        );
    }

    #[test]
    fn download_fetches_named_object() {
        let runner = FakeRunner::succeeding();
        let s3 = S3::new(RemotePath::new("s3://bucket/db/").unwrap(), &runner);

        s3.download("users_2024-03-01", Path::new("/backups/users_2024-03-01"))
            .unwrap();

        assert_eq!(
            runner.calls()[0].args,
            [
                "s3",
                "cp",
                "s3://bucket/db/users_2024-03-01",
                "/backups/users_2024-03-01"
            ]
        );
    }

    #[test]
    fn failed_upload_is_reported() {
        let runner = FakeRunner::with_handler(|_| Err("access denied".into()));
        let s3 = S3::new(RemotePath::new("s3://bucket").unwrap(), &runner);

        let err = s3.upload(Path::new("/backups/x_2024-03-01")).unwrap_err();
        assert_eq!(err.command().program, "aws");
    }
}
