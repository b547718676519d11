//! Download (if absent locally) → restore → notify for a single dump.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::Instant;

use derive_more::{Display, Error};

use crate::artifact::{BackupName, BackupNameError};
use crate::config::Config;
use crate::notify::{NotifyError, Notifier};
use crate::postgres::Postgres;
use crate::util::{CommandError, Runner};

#[derive(Debug, Display, Error)]
/// Errors on restoring a database dump.
pub enum RestoreError {
    /// The database can't be derived from the file name.
    #[display("{_0}")]
    InvalidName(BackupNameError),
    /// The dump isn't available locally and there is nowhere to fetch it from.
    #[display("Backup file {_0} doesn't exist locally and no BACKUP_PATH is configured")]
    NoRemotePath(#[error(ignore)] String),
    /// The local backup directory can't be created.
    #[display("Creating the backup directory {} failed: {source}", path.display())]
    BackupDir { path: PathBuf, source: io::Error },
    /// Fetching the dump from the object storage failed.
    #[display("Downloading the dump failed: {_0}")]
    Download(CommandError),
    /// The dump still doesn't exist after downloading it.
    #[display("Backup file doesn't exist: {}", _0.display())]
    Missing(#[error(ignore)] PathBuf),
    /// `pg_restore` failed.
    #[display("Restoring the database failed: {_0}")]
    Restore(CommandError),
    /// The database was restored, but the notification failed.
    #[display("{_0}")]
    Notify(NotifyError),
}

/// Restore of a single database dump.
pub struct RestorePipeline<'a> {
    config: &'a Config,
    runner: &'a dyn Runner,
}

impl<'a> RestorePipeline<'a> {
    pub fn new(config: &'a Config, runner: &'a dyn Runner) -> Self {
        Self { config, runner }
    }

    /// Restores the dump `file_name` into the database it was taken from.
    ///
    /// Returns the parsed name of the restored dump.
    pub fn run(&self, file_name: &str) -> Result<BackupName, RestoreError> {
        let start = Instant::now();
        let name = BackupName::parse(file_name).map_err(RestoreError::InvalidName)?;

        let result = self.restore(&name, file_name);

        let notifier = Notifier::new(self.config.mail.as_ref(), None, self.runner);
        if notifier.is_enabled() {
            let (subject, body) = match &result {
                Ok(()) => (
                    format!("Restore complete: {}", name.database),
                    format!("Took {:.2} seconds", start.elapsed().as_secs_f64()),
                ),
                Err(e) => (format!("Restore failed: {}", name.database), e.to_string()),
            };

            if let Err(e) = notifier.notify(&subject, &body) {
                if result.is_ok() {
                    return Err(RestoreError::Notify(e));
                }
                log::error!(target: "restore", "Notification about failed restore failed: {e}");
            }
        }
        result?;

        log::info!(target: "restore", "Restore complete, took {:.2} seconds", start.elapsed().as_secs_f64());
        Ok(name)
    }

    fn restore(&self, name: &BackupName, file_name: &str) -> Result<(), RestoreError> {
        let backup_dir = &self.config.backup_dir;
        let file = backup_dir.join(file_name);

        if file.exists() {
            log::info!(target: "restore", "Backup file already exists in filesystem {}", file.display());
        } else {
            let remote = self
                .config
                .remote_path
                .clone()
                .ok_or_else(|| RestoreError::NoRemotePath(file_name.to_string()))?;

            fs::create_dir_all(backup_dir).map_err(|source| RestoreError::BackupDir {
                path: backup_dir.clone(),
                source,
            })?;

            log::info!(target: "restore", "Downloading database dump from {}", remote.join(file_name));
            self.config
                .backup_type
                .store(remote, self.runner)
                .download(file_name, &file)
                .map_err(RestoreError::Download)?;
        }

        if !file.exists() {
            return Err(RestoreError::Missing(file));
        }

        log::info!(target: "restore", "Restoring database {}", name.database);
        Postgres::new(&self.config.database, self.runner)
            .restore(&name.database, &file)
            .map_err(RestoreError::Restore)
    }
}
