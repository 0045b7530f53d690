use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::filter::{EnvFilter, LevelFilter};

mod bot;
mod config;
mod media;
mod utils;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to the config file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn get_config_path(args: &Args) -> Option<PathBuf> {
    if let Some(path) = &args.config {
        return Some(path.clone());
    }

    if let Ok(path) = std::env::var("CONFIG_FILE") {
        return Some(PathBuf::from(path));
    }

    let mut candidates = Vec::new();
    if let Ok(xdg_config_home) = std::env::var("XDG_CONFIG_HOME") {
        candidates.push(PathBuf::from(xdg_config_home));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home.join(".config"));
    }

    candidates
        .into_iter()
        .map(|dir| dir.join("clipgrab").join("config.toml"))
        .find(|path| path.exists())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = get_config_path(&args);

    let config = match &config_path {
        Some(path) => crate::config::Config::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => crate::config::Config::default(),
    };

    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy();

    if config.get_logging_format() == "json" {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    }

    info!("Starting clipgrab...");
    match &config_path {
        Some(path) => info!("Loaded config from: {}", path.display()),
        None => info!("No config file found, running with defaults"),
    }

    bot::run(config).await
}
