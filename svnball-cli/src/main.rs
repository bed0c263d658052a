use std::path::Path;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};

mod cli;
mod commands;
mod config;
mod error;
mod server;

use cli::{CliArgs, Command};
use commands::CommandExecutor;
use config::AppConfig;
use error::AppError;

fn main() {
    if let Err(e) = bootstrap() {
        eprintln!("Error: {e}");
        error!(error = ?e, "Application failed");
        std::process::exit(1);
    }
}

#[tokio::main]
async fn bootstrap() -> Result<(), AppError> {
    let args = CliArgs::parse();

    init_logging(args.verbose, args.log_file.as_deref())?;

    let config = AppConfig::load(args.config.as_deref())?;
    info!(
        cache_dir = ?config.archiver.cache_dir,
        store = ?config.cache.store,
        targets = config.targets.len(),
        "Configuration loaded"
    );

    let executor = CommandExecutor::new(config);

    match args.command {
        Command::Serve { bind } => executor.serve(bind).await?,
        Command::Resolve { url, base_filename } => executor.resolve(&url, base_filename).await?,
        Command::Generate { url, base_filename } => executor.generate(&url, base_filename).await?,
        Command::Refresh { url } => executor.refresh(url.as_deref()).await?,
        Command::Tree { url, depth } => executor.tree(&url, depth).await?,
    }

    Ok(())
}

/// `RUST_LOG` wins; otherwise `info`, or `debug` with `--verbose`.
fn init_logging(verbose: bool, log_file: Option<&Path>) -> Result<(), AppError> {
    let default_level = if verbose { "debug" } else { "info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(verbose)
        .with_writer(log_writer(log_file)?)
        .with_ansi(log_file.is_none())
        .try_init()
        .map_err(|e| AppError::Initialization(e.to_string()))
}

/// Stdout, teed into `log_file` when one is given.
fn log_writer(log_file: Option<&Path>) -> Result<BoxMakeWriter, AppError> {
    let Some(path) = log_file else {
        return Ok(BoxMakeWriter::new(std::io::stdout));
    };
    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    Ok(BoxMakeWriter::new(MakeWriterExt::and(std::io::stdout, file)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tracing_subscriber::fmt::MakeWriter;

    #[test]
    fn test_log_file_gets_a_copy_of_stdout_logs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("svnball.log");
        std::fs::write(&path, "earlier run\n").unwrap();

        let writer = log_writer(Some(&path)).unwrap();
        writer.make_writer().write_all(b"archive ready\n").unwrap();

        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "earlier run\narchive ready\n");
    }
}
