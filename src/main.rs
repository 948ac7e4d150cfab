mod app;
mod backend;
mod cache;
mod commands;
mod config;
mod db;
mod event;
mod files;
mod logging;
mod query;
mod ui;

use clap::Parser;
use color_eyre::Result;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "classdesk")]
#[command(about = "A terminal dashboard for classes, documents and items")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/classdesk/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Run against an in-memory backend with sample data
  #[arg(long)]
  demo: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  // The terminal belongs to the UI, so logs go to a file
  let _log_guard = logging::init()?;

  let mut app = if args.demo {
    let downloads = dirs::download_dir().unwrap_or_else(|| PathBuf::from("."));
    app::App::demo(downloads).await?
  } else {
    let config = config::Config::load(args.config.as_deref())?;
    app::App::connect(&config).await?
  };
  app.run().await?;

  Ok(())
}
