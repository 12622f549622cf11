use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use tracing::{info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, EnvFilter};

use frametagger::db::default_library_directory;
use frametagger::{load_config, Config, Database, JobManager, SqliteLibrary};

mod routes;
use routes::{build_router, AppState};

#[derive(Parser, Debug)]
#[command(version, about = "Image upload ingestion server")]
struct CliArgs {
    /// Path to a JSON configuration file.
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Library directory to use when no configuration file is given.
    #[arg(long)]
    library_dir: Option<PathBuf>,

    /// The port to listen on.
    #[arg(short, long, default_value_t = 8000)]
    port: u16,

    /// Address to bind.
    #[arg(long, default_value = "0.0.0.0")]
    bind: String,

    /// Maximum request body size for upload batches, in MiB.
    #[arg(long, default_value_t = 512)]
    max_upload_mb: usize,
}

fn init_logging() -> Result<()> {
    tracing_log::LogTracer::init().context("Failed to bridge log records")?;

    let subscriber = tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        );
    tracing::subscriber::set_global_default(subscriber)
        .context("Failed to install tracing subscriber")?;
    Ok(())
}

fn resolve_config(cli_args: &CliArgs) -> Result<Config> {
    if let Some(path) = &cli_args.config {
        info!("Loading configuration from {:?}", path);
        return load_config(path).with_context(|| format!("Invalid configuration {:?}", path));
    }

    let library_directory = match &cli_args.library_dir {
        Some(dir) => dir.clone(),
        None => default_library_directory()
            .ok_or_else(|| anyhow!("No platform data directory; pass --library-dir"))?,
    };
    Ok(Config::with_library_directory(library_directory))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli_args = CliArgs::parse();
    init_logging()?;

    let config = resolve_config(&cli_args)?;
    let database_file = config.database_file();
    info!("Opening image library database at {:?}...", database_file);
    let db = Database::open(&database_file)
        .with_context(|| format!("Failed to open database {:?}", database_file))?;

    let library = Arc::new(SqliteLibrary::new(db, config.library_path()));
    let manager = JobManager::new(&config, library.clone());
    info!(
        canvas_width = config.canvas.width,
        canvas_height = config.canvas.height,
        "Upload pipeline ready"
    );

    let app = build_router(
        AppState { manager, library },
        cli_args.max_upload_mb * 1024 * 1024,
    );

    let listener = tokio::net::TcpListener::bind((cli_args.bind.as_str(), cli_args.port))
        .await
        .with_context(|| format!("Failed to bind {}:{}", cli_args.bind, cli_args.port))?;
    info!("Listening on {}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;
    Ok(())
}
