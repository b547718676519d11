use std::process::ExitCode;

use chrono::Local;
use clap::Parser;

use pg_backup_lib::cli::{Action, BackupArgs, Cli, RestoreArgs};
use pg_backup_lib::config::{BackupConfig, Config};
use pg_backup_lib::pipeline::{BackupPipeline, RestoreError, RestorePipeline};
use pg_backup_lib::util::SystemRunner;

fn main() -> ExitCode {
    let cli = Cli::parse();

    // init logger
    let mut env_logger =
        env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"));
    if let Some(level) = cli.verbose {
        env_logger.filter_level(level);
    }
    env_logger.try_init().expect("env_logger should not fail");

    match cli.action {
        Action::Backup(args) => backup(&args),
        Action::Restore(args) => restore(&args),
    }
}

fn backup(args: &BackupArgs) -> ExitCode {
    let (config, backup_config) =
        match Config::from_args(&args.common).and_then(|config| {
            BackupConfig::from_args(args).map(|backup_config| (config, backup_config))
        }) {
            Ok(configs) => configs,
            Err(e) => {
                log::error!("Invalid configuration: {e}");
                return ExitCode::FAILURE;
            }
        };

    let today = Local::now().date_naive();
    let pipeline = BackupPipeline::new(&config, &backup_config, &SystemRunner);
    match pipeline.run(today) {
        Ok(report) => {
            report.log_summary();
            if report.is_success() {
                ExitCode::SUCCESS
            } else {
                ExitCode::FAILURE
            }
        }
        Err(e) => {
            log::error!(target: "backup", "Backup resulted in a fatal error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn restore(args: &RestoreArgs) -> ExitCode {
    let config = match Config::from_args(&args.common) {
        Ok(config) => config,
        Err(e) => {
            log::error!("Invalid configuration: {e}");
            return ExitCode::FAILURE;
        }
    };

    match RestorePipeline::new(&config, &SystemRunner).run(&args.file_name) {
        Ok(_) => ExitCode::SUCCESS,
        Err(RestoreError::Notify(e)) => {
            log::error!(target: "restore", "Restored {}, but the notification failed: {e}", args.file_name);
            ExitCode::FAILURE
        }
        Err(e) => {
            log::error!(target: "restore", "Restore of {} failed: {e}", args.file_name);
            ExitCode::FAILURE
        }
    }
}
