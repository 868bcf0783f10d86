use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use deckpad_core::Session;
use deckpad_icons::{default_icons_dir, IconLibrary};
use deckpad_pptx::PptxCodec;
use directories::ProjectDirs;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{prelude::*, EnvFilter};

mod config;
mod server;
mod tools;

use config::Config;
use tools::Toolbox;

#[derive(Debug, Parser)]
#[command(
    name = "deckpad",
    version,
    about = "Presentation editing tools served over JSON-RPC on stdio"
)]
struct Args {
    /// Config file (default: <config dir>/config.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory of bundled icons, one subdirectory per category
    #[arg(long)]
    icons_dir: Option<PathBuf>,

    /// Directory for the log file
    #[arg(long)]
    log_dir: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let project_dirs = ProjectDirs::from("net", "deckpad", "deckpad")
        .ok_or_else(|| anyhow!("unable to resolve platform data directories"))?;

    let mut config = Config::load(args.config.as_deref(), &project_dirs)?;
    if args.icons_dir.is_some() {
        config.icons_dir = args.icons_dir;
    }
    if args.log_dir.is_some() {
        config.log_dir = args.log_dir;
    }

    let _log_guard = init_logging(
        &config.log_dir(&project_dirs),
        config.log_filter.as_deref(),
    )?;

    let icons = load_icons(config.icons_dir.clone())?;
    let session = Session::new(Arc::new(PptxCodec::new()))
        .with_default_size(config.slide_width, config.slide_height)
        .context("invalid default slide size in config")?
        .with_script_limits(config.script);
    let toolbox = Toolbox::new(session, Arc::new(icons), config.default_icon_color);

    server::serve(toolbox, tokio::io::stdin(), tokio::io::stdout()).await
}

fn load_icons(configured: Option<PathBuf>) -> Result<IconLibrary> {
    match configured.or_else(default_icons_dir) {
        Some(dir) => IconLibrary::load(&dir)
            .with_context(|| format!("failed to load icons from {:?}", dir)),
        None => {
            warn!("no icon directory configured or found; insert_icon will find no icons");
            Ok(IconLibrary::empty())
        }
    }
}

fn init_logging(log_dir: &Path, configured_filter: Option<&str>) -> Result<WorkerGuard> {
    fs::create_dir_all(log_dir)
        .with_context(|| format!("failed to create log directory {:?}", log_dir))?;

    let file_appender = tracing_appender::rolling::never(log_dir, "deckpad.log");
    let (file_writer, guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| match configured_filter {
            Some(filter) => EnvFilter::try_new(filter),
            None => Ok(EnvFilter::new("info")),
        })
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let file_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(file_writer);
    // stdout carries protocol frames only.
    let console_layer = tracing_subscriber::fmt::layer()
        .with_ansi(false)
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(env_filter)
        .with(file_layer)
        .with(console_layer)
        .try_init()
        .map_err(|err| anyhow!(err))?;

    info!(dir = %log_dir.display(), "logging initialised");
    Ok(guard)
}
