//! Dump → upload → prune → notify for every configured database.

use std::fs;
use std::io;
use std::path::PathBuf;
use std::time::{Duration, Instant, SystemTime};

use chrono::NaiveDate;
use derive_more::{Display, Error};

use crate::artifact::{BackupName, BackupNameError};
use crate::backends::ObjectStore;
use crate::config::{BackupConfig, Config};
use crate::notify::{NotifyError, Notifier};
use crate::postgres::Postgres;
use crate::util::{CommandError, PruneError, Runner};

#[derive(Debug, Display, Error)]
/// Errors on backup of a single database.
pub enum BackupError {
    /// The database name can't be turned into a file name.
    #[display("{_0}")]
    Name(BackupNameError),
    /// Refusing to overwrite an existing dump.
    #[display("Backup file already exists: {}", _0.display())]
    AlreadyExists(#[error(ignore)] PathBuf),
    /// The local backup directory can't be created.
    #[display("Creating the backup directory {} failed: {source}", path.display())]
    BackupDir { path: PathBuf, source: io::Error },
    /// `pg_dump` failed.
    #[display("Dumping the database failed: {_0}")]
    Dump(CommandError),
    /// Copying the dump to the object storage failed.
    #[display("Uploading the dump failed: {_0}")]
    Upload(CommandError),
}

/// Outcome of the backup of one database.
#[derive(Debug)]
pub struct DatabaseReport {
    pub database: String,
    /// Local path of the uploaded dump.
    pub result: Result<PathBuf, BackupError>,
    /// Set if notifying about this database failed.
    pub notification: Option<NotifyError>,
}

/// Outcome of a whole backup run.
#[derive(Debug, Default)]
pub struct BackupReport {
    pub databases: Vec<DatabaseReport>,
    /// Local files removed by the retention.
    pub pruned: Vec<PathBuf>,
    /// Entries the retention couldn't prune.
    pub prune_errors: Vec<PruneError>,
    pub elapsed: Duration,
}

impl BackupReport {
    /// Returns if every database was backed up, pruned and notified.
    pub fn is_success(&self) -> bool {
        self.prune_errors.is_empty()
            && self
                .databases
                .iter()
                .all(|db| db.result.is_ok() && db.notification.is_none())
    }

    /// Databases whose dump or upload failed.
    pub fn failed(&self) -> impl Iterator<Item = &DatabaseReport> {
        self.databases.iter().filter(|db| db.result.is_err())
    }

    pub fn log_summary(&self) {
        let failed = self.failed().count();
        let total = self.databases.len();

        if failed == 0 {
            log::info!(target: "backup", "Backed up {total} database(s), pruned {} file(s)", self.pruned.len());
        } else {
            log::error!(target: "backup", "Backup of {failed} of {total} database(s) failed");
            for db in self.failed() {
                if let Err(e) = &db.result {
                    log::error!(target: "backup", "  {}: {e}", db.database);
                }
            }
        }
        for e in &self.prune_errors {
            log::error!(target: "backup", "Pruning local backup copies failed: {e}");
        }
        let undelivered = self
            .databases
            .iter()
            .filter(|db| db.notification.is_some())
            .count();
        if undelivered > 0 {
            log::error!(target: "backup", "{undelivered} notification(s) couldn't be delivered");
        }
    }
}

/// Backup of all databases listed in the [BackupConfig].
pub struct BackupPipeline<'a> {
    config: &'a Config,
    backup: &'a BackupConfig,
    runner: &'a dyn Runner,
}

impl<'a> BackupPipeline<'a> {
    pub fn new(config: &'a Config, backup: &'a BackupConfig, runner: &'a dyn Runner) -> Self {
        Self {
            config,
            backup,
            runner,
        }
    }

    /// Backs up every database, naming the dumps after `today`.
    ///
    /// A failing database doesn't stop the others; failures are collected in
    /// the [BackupReport]. Only a backup directory that can't be created
    /// aborts the run.
    pub fn run(&self, today: NaiveDate) -> Result<BackupReport, BackupError> {
        let start = Instant::now();
        log::info!(target: "backup", "Dumping databases...");

        let Some(remote) = &self.config.remote_path else {
            log::warn!(target: "backup", "No path defined! Nothing to do.");
            return Ok(BackupReport::default());
        };

        let backup_dir = &self.config.backup_dir;
        fs::create_dir_all(backup_dir).map_err(|source| BackupError::BackupDir {
            path: backup_dir.clone(),
            source,
        })?;

        let postgres = Postgres::new(&self.config.database, self.runner);
        let store = self.config.backup_type.store(remote.clone(), self.runner);

        let mut databases = Vec::with_capacity(self.backup.databases.len());
        for database in &self.backup.databases {
            let result = self.backup_database(&postgres, store.as_ref(), database, today);
            match &result {
                Ok(file) => log::info!(target: "backup", "Uploaded {} to {remote}", file.display()),
                Err(e) => log::error!(target: "backup", "Backup of database {database} failed: {e}"),
            }

            databases.push(DatabaseReport {
                database: database.clone(),
                result,
                notification: None,
            });
        }

        log::info!(target: "backup", "Pruning local backup copies");
        let pruned = self
            .backup
            .retention
            .prune(backup_dir, SystemTime::now());
        if !pruned.is_success() {
            log::error!(
                target: "backup",
                "Pruning {} left {} error(s)",
                backup_dir.display(),
                pruned.errors.len()
            );
        }

        let notifier = Notifier::new(
            self.config.mail.as_ref(),
            self.backup.webhook.as_ref(),
            self.runner,
        );
        if notifier.is_enabled() {
            for report in &mut databases {
                let (subject, body) = match &report.result {
                    Ok(_) => (
                        format!("Backup complete: {}", report.database),
                        format!("Took {:.2} seconds", start.elapsed().as_secs_f64()),
                    ),
                    Err(e) => (format!("Backup failed: {}", report.database), e.to_string()),
                };

                if let Err(e) = notifier.notify(&subject, &body) {
                    log::error!(target: "backup", "Notification about {} failed: {e}", report.database);
                    report.notification = Some(e);
                }
            }
        }

        let elapsed = start.elapsed();
        log::info!(target: "backup", "Backup complete, took {:.2} seconds", elapsed.as_secs_f64());

        Ok(BackupReport {
            databases,
            pruned: pruned.removed,
            prune_errors: pruned.errors,
            elapsed,
        })
    }

    fn backup_database(
        &self,
        postgres: &Postgres,
        store: &dyn ObjectStore,
        database: &str,
        today: NaiveDate,
    ) -> Result<PathBuf, BackupError> {
        let name = BackupName::new(database, today).map_err(BackupError::Name)?;
        let file = self.config.backup_dir.join(name.to_string());

        if file.exists() {
            return Err(BackupError::AlreadyExists(file));
        }

        log::info!(target: "backup::dump", "Dumping database {database}");
        postgres.dump(database, &file).map_err(BackupError::Dump)?;

        log::info!(target: "backup::upload", "Uploading {} to {}", file.display(), self.config.backup_type);
        store.upload(&file).map_err(BackupError::Upload)?;

        Ok(file)
    }
}

#[cfg(test)]
mod tests {
    use std::fs::File;
    use std::path::Path;

    use super::*;
    use crate::backends::{BackupType, RemotePath};
    use crate::config::{DatabaseConfig, MailConfig, WebhookConfig};
    use crate::util::command::fake::FakeRunner;
    use crate::util::command::Invocation;
    use crate::util::RetentionWindow;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 3, 1).unwrap()
    }

    fn config(backup_dir: &Path, backup_path: &str) -> Config {
        Config {
            backup_dir: backup_dir.to_path_buf(),
            backup_type: BackupType::S3,
            remote_path: RemotePath::new(backup_path),
            database: DatabaseConfig {
                host: "localhost".into(),
                user: "postgres".into(),
                password: "secret".into(),
            },
            mail: None,
        }
    }

    fn backup_config(databases: &[&str]) -> BackupConfig {
        BackupConfig {
            databases: databases.iter().map(|db| db.to_string()).collect(),
            retention: RetentionWindow::new(7),
            webhook: None,
        }
    }

    fn mail() -> MailConfig {
        MailConfig {
            to: "ops@example.com".into(),
            from: "backup@example.com".into(),
            region: "us-east-1".into(),
        }
    }

    /// Simulates `pg_dump` by writing the target file.
    fn dumping_runner() -> FakeRunner {
        FakeRunner::with_handler(|call| {
            if call.program == "pg_dump" {
                write_dump(call);
            }
            Ok(())
        })
    }

    fn write_dump(call: &Invocation) {
        let target = call.arg_after("-f").expect("pg_dump should write to a file");
        fs::write(target, b"PGDMP").unwrap();
    }

    fn subjects(runner: &FakeRunner) -> Vec<String> {
        runner
            .calls()
            .iter()
            .filter(|call| call.args.iter().any(|arg| arg == "send-email"))
            .map(|call| {
                let message: serde_json::Value =
                    serde_json::from_str(call.arg_after("--message").unwrap()).unwrap();
                message["Subject"]["Data"].as_str().unwrap().to_string()
            })
            .collect()
    }

    #[test]
    fn backs_up_every_database() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "s3://bucket/db/");
        config.mail = Some(mail());
        let backup = backup_config(&["orders", "users"]);
        let runner = dumping_runner();

        let report = BackupPipeline::new(&config, &backup, &runner)
            .run(today())
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.databases.len(), 2);

        let calls = runner.calls();
        let programs: Vec<_> = calls.iter().map(|call| call.program.as_str()).collect();
        assert_eq!(programs, ["pg_dump", "aws", "pg_dump", "aws", "aws", "aws"]);

        let orders = dir.path().join("orders_2024-03-01");
        let users = dir.path().join("users_2024-03-01");
        assert_eq!(calls[0].arg_after("-f"), Some(orders.to_str().unwrap()));
        assert_eq!(calls[0].args.last().unwrap(), "orders");
        assert_eq!(calls[1].args[3..], [orders.to_str().unwrap(), "s3://bucket/db/"]);
        assert_eq!(calls[2].arg_after("-f"), Some(users.to_str().unwrap()));
        assert_eq!(calls[3].args[3..], [users.to_str().unwrap(), "s3://bucket/db/"]);

        assert_eq!(
            subjects(&runner),
            ["Backup complete: orders", "Backup complete: users"]
        );
        assert!(orders.exists());
        assert!(users.exists());
    }

    #[test]
    fn missing_remote_path_does_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("orders_2020-01-01");
        File::create(&old)
            .unwrap()
            .set_modified(SystemTime::UNIX_EPOCH)
            .unwrap();

        let mut config = config(dir.path(), "");
        config.mail = Some(mail());
        let backup = backup_config(&["orders"]);
        let runner = dumping_runner();

        let report = BackupPipeline::new(&config, &backup, &runner)
            .run(today())
            .unwrap();

        assert!(report.is_success());
        assert!(report.databases.is_empty());
        assert!(runner.calls().is_empty());
        assert!(old.exists(), "nothing is pruned without a remote path");
    }

    #[test]
    fn existing_dump_is_not_overwritten() {
        let dir = tempfile::tempdir().unwrap();
        let existing = dir.path().join("orders_2024-03-01");
        fs::write(&existing, b"earlier dump").unwrap();

        let config = config(dir.path(), "s3://bucket/db");
        let backup = backup_config(&["orders", "users"]);
        let runner = dumping_runner();

        let report = BackupPipeline::new(&config, &backup, &runner)
            .run(today())
            .unwrap();

        assert!(!report.is_success());
        assert!(matches!(
            report.databases[0].result,
            Err(BackupError::AlreadyExists(ref path)) if path == &existing
        ));
        assert!(report.databases[1].result.is_ok());

        let calls = runner.calls();
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[0].program, "pg_dump");
        assert_eq!(calls[0].args.last().unwrap(), "users");
        assert_eq!(fs::read(&existing).unwrap(), b"earlier dump");
    }

    #[test]
    fn failing_database_does_not_stop_the_others() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "s3://bucket/db");
        config.mail = Some(mail());
        let backup = backup_config(&["orders", "users"]);
        let runner = FakeRunner::with_handler(|call| {
            if call.program == "pg_dump" {
                if call.args.last().is_some_and(|db| db == "orders") {
                    return Err("database \"orders\" does not exist".into());
                }
                write_dump(call);
            }
            Ok(())
        });

        let report = BackupPipeline::new(&config, &backup, &runner)
            .run(today())
            .unwrap();

        assert!(!report.is_success());
        assert!(matches!(report.databases[0].result, Err(BackupError::Dump(_))));
        assert!(report.databases[1].result.is_ok());
        assert_eq!(report.failed().count(), 1);

        // no upload of the failed dump
        assert_eq!(runner.programs()[..3], ["pg_dump", "pg_dump", "aws"]);
        assert_eq!(
            subjects(&runner),
            ["Backup failed: orders", "Backup complete: users"]
        );
    }

    #[test]
    fn failed_upload_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "s3://bucket/db");
        let backup = backup_config(&["orders"]);
        let runner = FakeRunner::with_handler(|call| match call.program.as_str() {
            "pg_dump" => {
                write_dump(call);
                Ok(())
            }
            _ => Err("could not connect to endpoint".into()),
        });

        let report = BackupPipeline::new(&config, &backup, &runner)
            .run(today())
            .unwrap();

        assert!(matches!(report.databases[0].result, Err(BackupError::Upload(_))));
        assert!(!report.is_success());
    }

    #[test]
    fn prunes_once_after_all_databases() {
        let dir = tempfile::tempdir().unwrap();
        let old = dir.path().join("orders_2024-01-01");
        File::create(&old)
            .unwrap()
            .set_modified(SystemTime::now() - Duration::from_secs(30 * 24 * 60 * 60))
            .unwrap();

        let config = config(dir.path(), "s3://bucket/db");
        let backup = backup_config(&["orders", "users"]);
        let runner = dumping_runner();

        let report = BackupPipeline::new(&config, &backup, &runner)
            .run(today())
            .unwrap();

        assert!(report.is_success());
        assert_eq!(report.pruned, [old.clone()]);
        assert!(!old.exists());
        assert!(dir.path().join("orders_2024-03-01").exists());
        assert!(dir.path().join("users_2024-03-01").exists());
    }

    #[test]
    fn failed_prune_fails_the_run() {
        let root = tempfile::tempdir().unwrap();
        let backup_dir = root.path().join("dumps");
        let config = config(&backup_dir, "s3://bucket/db");
        let backup = backup_config(&["orders"]);

        // The directory disappears under the run before the retention pass.
        let doomed = backup_dir.clone();
        let runner = FakeRunner::with_handler(move |call| {
            match call.program.as_str() {
                "pg_dump" => write_dump(call),
                "aws" => fs::remove_dir_all(&doomed).unwrap(),
                _ => {}
            }
            Ok(())
        });

        let report = BackupPipeline::new(&config, &backup, &runner)
            .run(today())
            .unwrap();

        assert!(report.databases[0].result.is_ok());
        assert!(matches!(
            &report.prune_errors[..],
            [PruneError::ReadDir { .. }]
        ));
        assert!(!report.is_success());
    }

    #[test]
    fn minio_backend_is_dispatched() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = config(dir.path(), "minio/backups");
        config.backup_type = BackupType::Minio;
        let backup = backup_config(&["orders"]);
        let runner = dumping_runner();

        BackupPipeline::new(&config, &backup, &runner)
            .run(today())
            .unwrap();

        let calls = runner.calls();
        assert_eq!(calls[1].program, "mc");
        assert_eq!(calls[1].args.last().unwrap(), "minio/backups/");
    }

    #[test]
    fn webhook_is_called_per_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "s3://bucket/db");
        let mut backup = backup_config(&["orders", "users"]);
        backup.webhook = Some(WebhookConfig {
            url: "https://hooks.example.com/done".into(),
            method: "GET".into(),
        });
        let runner = dumping_runner();

        let report = BackupPipeline::new(&config, &backup, &runner)
            .run(today())
            .unwrap();

        assert!(report.is_success());
        let curls = runner
            .programs()
            .into_iter()
            .filter(|program| program == "curl")
            .count();
        assert_eq!(curls, 2);
    }

    #[test]
    fn undelivered_notification_fails_the_run() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(dir.path(), "s3://bucket/db");
        let mut backup = backup_config(&["orders"]);
        backup.webhook = Some(WebhookConfig {
            url: "https://hooks.example.com/done".into(),
            method: "POST".into(),
        });
        let runner = FakeRunner::with_handler(|call| match call.program.as_str() {
            "pg_dump" => {
                write_dump(call);
                Ok(())
            }
            "curl" => Err("HTTP 500".into()),
            _ => Ok(()),
        });

        let report = BackupPipeline::new(&config, &backup, &runner)
            .run(today())
            .unwrap();

        assert!(report.databases[0].result.is_ok());
        assert!(matches!(
            report.databases[0].notification,
            Some(NotifyError::Webhook(_))
        ));
        assert!(!report.is_success());
    }
}
