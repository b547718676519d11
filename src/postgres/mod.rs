//! Dump and restore of PostgreSQL databases using `pg_dump` and `pg_restore`.

use std::fs;
use std::path::Path;
use std::process::Command;

use crate::config::DatabaseConfig;
use crate::util::{CommandError, Runner};

/// Access to the database server through the PostgreSQL client tools.
pub struct Postgres<'a> {
    config: &'a DatabaseConfig,
    runner: &'a dyn Runner,
}

impl<'a> Postgres<'a> {
    pub fn new(config: &'a DatabaseConfig, runner: &'a dyn Runner) -> Self {
        Self { config, runner }
    }

    /// Command for `program` authenticated as the configured user.
    fn command(&self, program: &str) -> Command {
        let mut command = Command::new(program);
        command
            .env("PGPASSWORD", &self.config.password)
            .arg("-Fc") // custom archive format, compressed
            .arg("-h")
            .arg(&self.config.host)
            .arg("-U")
            .arg(&self.config.user);
        command
    }

    /// Dumps `database` into `file`.
    ///
    /// On failure a partially written `file` is removed again.
    pub fn dump(&self, database: &str, file: &Path) -> Result<(), CommandError> {
        log::info!(target: "postgres", "Create database dump of: {database}");
        log::trace!(target: "postgres", "Using user '{}' on '{}' for dump", self.config.user, self.config.host);

        let mut command = self.command("pg_dump");
        command.arg("-f").arg(file).arg(database);

        if let Err(e) = self.runner.run(&mut command) {
            if file.exists() {
                log::debug!(target: "postgres", "Removing incomplete dump: {}", file.display());
                if let Err(remove_err) = fs::remove_file(file) {
                    log::warn!(target: "postgres", "Removing incomplete dump {} failed: {remove_err}", file.display());
                }
            }
            return Err(e);
        }

        log::debug!(target: "postgres", "Saved database dump at: {}", file.display());
        Ok(())
    }

    /// Replays the dump `file` into `database`.
    pub fn restore(&self, database: &str, file: &Path) -> Result<(), CommandError> {
        log::info!(target: "postgres", "Restore database {database} from: {}", file.display());

        let mut command = self.command("pg_restore");
        command.arg("-d").arg(database).arg(file);
        self.runner.run(&mut command)?;

        log::debug!(target: "postgres", "Finished restore of database {database}");
        Ok(())
    }
}
