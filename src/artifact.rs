//! Naming of backup files: `<database>_<YYYY-MM-DD>`.

use std::fmt;
use std::sync::LazyLock;

use chrono::NaiveDate;
use derive_more::{Display, Error};
use regex::Regex;

const DATE_FORMAT: &str = "%Y-%m-%d";

static BACKUP_NAME: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?<database>.+)_(?<date>\d{4}-\d{2}-\d{2})$").unwrap());

/// Identifies a database dump by database name and creation date.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct BackupName {
    pub database: String,
    pub date: NaiveDate,
}

#[derive(Debug, Display, Error, PartialEq, Eq)]
/// Errors of names that can't be used for or derived from backup files.
pub enum BackupNameError {
    /// The file name doesn't look like `<database>_<YYYY-MM-DD>`.
    #[display("Backup file name should look like <database>_<YYYY-MM-DD>: {_0}")]
    Malformed(#[error(ignore)] String),
    /// The date suffix is not a calendar date.
    #[display("Backup file name carries an invalid date: {_0}")]
    InvalidDate(#[error(ignore)] String),
    /// The database name is unusable as file name or process argument.
    #[display("Invalid database name: {_0:?}")]
    InvalidDatabase(#[error(ignore)] String),
}

/// Checks that `database` is usable as part of a file name and as a single
/// argument to the dump and restore tools.
pub fn validate_database_name(database: &str) -> Result<(), BackupNameError> {
    let invalid = database.is_empty()
        || database.starts_with('-')
        || database.contains(['/', '\\', '\0'])
        || database == "."
        || database == "..";

    if invalid {
        Err(BackupNameError::InvalidDatabase(database.to_string()))
    } else {
        Ok(())
    }
}

impl BackupName {
    pub fn new(database: impl Into<String>, date: NaiveDate) -> Result<Self, BackupNameError> {
        let database = database.into();
        validate_database_name(&database)?;

        Ok(Self { database, date })
    }

    /// Parses a backup file name, deriving the database by stripping the
    /// trailing `_<date>` segment.
    pub fn parse(file_name: &str) -> Result<Self, BackupNameError> {
        let captures = BACKUP_NAME
            .captures(file_name)
            .ok_or_else(|| BackupNameError::Malformed(file_name.to_string()))?;

        let date = NaiveDate::parse_from_str(&captures["date"], DATE_FORMAT)
            .map_err(|_| BackupNameError::InvalidDate(file_name.to_string()))?;

        Self::new(&captures["database"], date)
    }
}

impl fmt::Display for BackupName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.database, self.date.format(DATE_FORMAT))
    }
}
