//! Entry point: config loading, logging setup, command dispatch.

mod cli;
mod node;

use clap::Parser;
use cli::{Cli, Commands, FILE_GUARD};
use eyre::{Result, WrapErr};
use std::fs;
use std::path::Path;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

fn main() -> Result<()> {
    color_eyre::install()?;
    let args = Cli::parse();

    let content = fs::read_to_string(&args.config)
        .wrap_err_with(|| format!("read config {}", args.config.display()))?;
    let cfg = tanklevel_config::load_toml(&content).wrap_err("parse config TOML")?;
    cfg.validate().wrap_err("invalid config")?;

    init_logging(&args, &cfg.logging)?;

    match args.cmd {
        Commands::Run {
            read_interval_ms,
            cycles,
        } => node::run(&cfg, read_interval_ms, cycles),
        Commands::Read => node::read_once(&cfg),
        Commands::SelfCheck => node::self_check(&cfg),
    }
}

/// Console logging on stderr (stdout is reserved for payload output); an
/// optional JSON-lines file sink per the `[logging]` config section.
fn init_logging(args: &Cli, logging: &tanklevel_config::Logging) -> Result<()> {
    let level = logging.level.as_deref().unwrap_or(&args.log_level);
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    if let Some(file) = &logging.file {
        let rotation = match logging.rotation.as_deref() {
            Some("daily") => Rotation::DAILY,
            Some("hourly") => Rotation::HOURLY,
            _ => Rotation::NEVER,
        };
        let path = Path::new(file);
        let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
        let name = path.file_name().map(Path::new).unwrap_or(path);
        let appender =
            RollingFileAppender::new(rotation, dir.unwrap_or_else(|| Path::new(".")), name);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let _ = FILE_GUARD.set(guard);
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(writer)
            .init();
    } else if args.json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }
    Ok(())
}
