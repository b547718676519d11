//! Validated, immutable configuration of a run.
//!
//! Built once from the parsed [command line](crate::cli) (which also reads the
//! environment) and then passed by reference into the pipelines.

use std::fmt;
use std::path::PathBuf;

use derive_more::{Display, Error};

use crate::artifact::{validate_database_name, BackupNameError};
use crate::backends::{BackupType, RemotePath};
use crate::cli::{BackupArgs, CommonArgs};
use crate::util::RetentionWindow;

#[derive(Debug, Display, Error)]
/// Invalid configuration, detected at startup.
pub enum ConfigError {
    /// A required value is empty.
    #[display("{variable} must not be empty")]
    Empty { variable: &'static str },
    /// A database name in `BACKUP_DBNAMES` can't be used.
    #[display("BACKUP_DBNAMES contains an unusable name: {_0}")]
    InvalidDatabase(BackupNameError),
    /// `WEBHOOK_METHOD` is not an HTTP method token.
    #[display("WEBHOOK_METHOD is not a valid HTTP method: {_0:?}")]
    InvalidWebhookMethod(#[error(ignore)] String),
}

/// Connection to the database server.
#[derive(Clone, PartialEq, Eq)]
pub struct DatabaseConfig {
    pub host: String,
    pub user: String,
    pub password: String,
}

impl fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("host", &self.host)
            .field("user", &self.user)
            .field("password", &"***")
            .finish()
    }
}

/// Notification mails sent through AWS SES.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MailConfig {
    pub to: String,
    pub from: String,
    pub region: String,
}

/// HTTP request made after every database backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookConfig {
    pub url: String,
    pub method: String,
}

/// Settings shared by backup and restore.
#[derive(Debug, Clone)]
pub struct Config {
    /// Local directory of the dumps.
    pub backup_dir: PathBuf,
    pub backup_type: BackupType,
    /// [None] if `BACKUP_PATH` is unset or empty.
    pub remote_path: Option<RemotePath>,
    pub database: DatabaseConfig,
    /// [None] unless both receiver and sender are set.
    pub mail: Option<MailConfig>,
}

/// Settings only used by the backup.
#[derive(Debug, Clone)]
pub struct BackupConfig {
    pub databases: Vec<String>,
    pub retention: RetentionWindow,
    pub webhook: Option<WebhookConfig>,
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

impl Config {
    pub fn from_args(args: &CommonArgs) -> Result<Self, ConfigError> {
        if args.backup_dir.as_os_str().is_empty() {
            return Err(ConfigError::Empty {
                variable: "BACKUP_DIR",
            });
        }
        if args.postgres_user.trim().is_empty() {
            return Err(ConfigError::Empty {
                variable: "POSTGRES_USER",
            });
        }
        if args.postgres_host.trim().is_empty() {
            return Err(ConfigError::Empty {
                variable: "POSTGRES_HOST",
            });
        }

        let remote_path = args.backup_path.as_deref().and_then(RemotePath::new);

        let mail = match (
            non_empty(args.mail_to.as_deref()),
            non_empty(args.mail_from.as_deref()),
        ) {
            (Some(to), Some(from)) => Some(MailConfig {
                to: to.to_string(),
                from: from.to_string(),
                region: args.mail_region.trim().to_string(),
            }),
            (None, None) => None,
            (Some(_), None) => {
                log::warn!(target: "config", "MAIL_TO is set without MAIL_FROM, not sending mails");
                None
            }
            (None, Some(_)) => {
                log::warn!(target: "config", "MAIL_FROM is set without MAIL_TO, not sending mails");
                None
            }
        };

        Ok(Self {
            backup_dir: args.backup_dir.clone(),
            backup_type: args.backup_type,
            remote_path,
            database: DatabaseConfig {
                host: args.postgres_host.trim().to_string(),
                user: args.postgres_user.trim().to_string(),
                password: args.postgres_password.clone(),
            },
            mail,
        })
    }
}

impl BackupConfig {
    pub fn from_args(args: &BackupArgs) -> Result<Self, ConfigError> {
        let databases: Vec<String> = args
            .dbnames
            .split(',')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .map(String::from)
            .collect();

        if databases.is_empty() {
            return Err(ConfigError::Empty {
                variable: "BACKUP_DBNAMES",
            });
        }
        for database in &databases {
            validate_database_name(database).map_err(ConfigError::InvalidDatabase)?;
        }

        let webhook = match non_empty(args.webhook.as_deref()) {
            Some(url) => {
                let method = non_empty(Some(args.webhook_method.as_str()))
                    .unwrap_or("GET")
                    .to_ascii_uppercase();
                if !method.chars().all(|c| c.is_ascii_alphabetic()) {
                    return Err(ConfigError::InvalidWebhookMethod(method));
                }

                Some(WebhookConfig {
                    url: url.to_string(),
                    method,
                })
            }
            None => None,
        };

        Ok(Self {
            databases,
            retention: RetentionWindow::new(args.keep_backup_days),
            webhook,
        })
    }
}
