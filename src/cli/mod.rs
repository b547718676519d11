use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use log::LevelFilter;

use crate::backends::BackupType;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Verbosity of the command output.
    #[arg(long, global = true)]
    pub verbose: Option<LevelFilter>,

    #[command(subcommand)]
    pub action: Action,
}

#[derive(Subcommand, Debug)]
pub enum Action {
    /// Dump, upload and prune the configured databases.
    Backup(BackupArgs),
    /// Restore a database from a dump, downloading it if necessary.
    Restore(RestoreArgs),
}

/// Settings shared by backup and restore.
#[derive(Args, Debug, Clone)]
pub struct CommonArgs {
    /// Local directory holding the database dumps.
    #[arg(long, env = "BACKUP_DIR")]
    pub backup_dir: PathBuf,

    /// Object storage the dumps are copied to.
    #[arg(long, env = "BACKUP_TYPE", value_enum)]
    pub backup_type: BackupType,

    /// Remote prefix of the dumps, e.g. `s3://bucket/db/`.
    #[arg(long, env = "BACKUP_PATH")]
    pub backup_path: Option<String>,

    /// PostgreSQL user for dump and restore.
    #[arg(long, env = "POSTGRES_USER")]
    pub postgres_user: String,

    /// Password of the PostgreSQL user.
    #[arg(long, env = "POSTGRES_PASSWORD", hide_env_values = true)]
    pub postgres_password: String,

    /// Host of the PostgreSQL server.
    #[arg(long, env = "POSTGRES_HOST", default_value = "localhost")]
    pub postgres_host: String,

    /// Receiver of notification mails.
    #[arg(long, env = "MAIL_TO")]
    pub mail_to: Option<String>,

    /// Sender of notification mails.
    #[arg(long, env = "MAIL_FROM")]
    pub mail_from: Option<String>,

    /// AWS region of the SES endpoint used for mails.
    #[arg(long, env = "MAIL_REGION", default_value = "us-east-1")]
    pub mail_region: String,
}

#[derive(Args, Debug, Clone)]
pub struct BackupArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Comma separated names of the databases to back up.
    #[arg(long, env = "BACKUP_DBNAMES")]
    pub dbnames: String,

    /// Days of local dumps to keep.
    #[arg(long, env = "KEEP_BACKUP_DAYS", default_value = "7")]
    pub keep_backup_days: u32,

    /// URL requested after every database backup.
    #[arg(long, env = "WEBHOOK")]
    pub webhook: Option<String>,

    /// HTTP method of the webhook request.
    #[arg(long, env = "WEBHOOK_METHOD", default_value = "GET")]
    pub webhook_method: String,
}

#[derive(Args, Debug, Clone)]
pub struct RestoreArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Name of the dump to restore, e.g. `orders_2024-03-01`.
    pub file_name: String,
}
