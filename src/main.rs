mod app;
mod cache;
mod config;
mod connectivity;
mod event;
mod http;
mod store;
mod sync;
#[cfg(test)]
mod testing;
mod worker;

use clap::{Parser, Subcommand};
use color_eyre::Result;
use std::io;
use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "kerigma-offline")]
#[command(about = "Offline cache and sync agent for the Kerigma Hub student portal")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/kerigma-offline/config.yaml)
  #[arg(short, long, global = true)]
  config: Option<PathBuf>,

  /// Church (tenant) id that partitions local data
  #[arg(short, long, global = true)]
  scope: Option<String>,

  /// Never touch the network
  #[arg(long, global = true)]
  offline: bool,

  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
  /// Route one GET through the worker
  Fetch {
    path: String,
    /// Treat as a top-level page navigation
    #[arg(long, conflicts_with = "image")]
    navigate: bool,
    #[arg(long)]
    image: bool,
  },
  /// Record lesson progress (queued when offline)
  Progress {
    #[arg(long)]
    course: String,
    #[arg(long)]
    lesson: String,
    /// 0-100; values above 100 are clamped
    #[arg(long)]
    percent: u8,
  },
  /// Queue a generic submission
  Submit {
    #[arg(long)]
    endpoint: String,
    /// JSON body
    #[arg(long)]
    body: String,
  },
  /// List mutations not yet acknowledged by the server
  Pending,
  /// Show local progress and cached portal data
  Portal,
  /// Drain the queues now
  Sync {
    /// background-sync or sync-aluno-progress (default: both)
    #[arg(long)]
    tag: Option<String>,
  },
  /// List named caches with entry counts
  Caches,
  /// Delete every named cache
  ClearCache,
  /// Render a push payload as a notification
  Push { payload: String },
  /// Run the agent until Ctrl-C
  Run,
}

/// Log to stderr and to a daily file under the data directory.
///
/// The returned guard flushes the file writer on drop.
fn init_tracing() -> Result<WorkerGuard> {
  let log_dir = config::data_dir()?.join("logs");
  let file_appender = tracing_appender::rolling::daily(log_dir, "kerigma-offline.log");
  let (file_writer, guard) = tracing_appender::non_blocking(file_appender);

  // RUST_LOG overrides, e.g. RUST_LOG=kerigma_offline=debug
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

  tracing_subscriber::registry()
    .with(filter)
    .with(fmt::layer().with_writer(io::stderr))
    .with(fmt::layer().with_writer(file_writer).with_ansi(false))
    .init();

  Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let _guard = init_tracing()?;

  let config = config::Config::load(args.config.as_deref())?;
  let app = app::App::new(config, args.scope, args.offline)?;

  match args.command {
    Commands::Fetch {
      path,
      navigate,
      image,
    } => app.fetch(&path, navigate, image).await?,
    Commands::Progress {
      course,
      lesson,
      percent,
    } => app.progress(&course, &lesson, percent).await?,
    Commands::Submit { endpoint, body } => app.submit(&endpoint, &body).await?,
    Commands::Pending => app.pending().await?,
    Commands::Portal => app.portal().await?,
    Commands::Sync { tag } => app.sync(tag.as_deref()).await?,
    Commands::Caches => app.caches()?,
    Commands::ClearCache => app.clear_cache().await?,
    Commands::Push { payload } => app.push(&payload)?,
    Commands::Run => app.run().await?,
  }

  Ok(())
}
