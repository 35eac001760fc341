//! videozone - endless img2img hallucination stream
//!
//! Usage:
//!   videozone                              → engine + HTTP gateway on port 8000
//!   videozone --config videozone.toml      → load settings from TOML
//!   videozone --offline                    → no model, noise fallback only
//!   videozone --dump-config                → print the default config and exit
//!   videozone version                      → show version

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use videozone_core::{BindMode, ModelBackend, VideozoneConfig};
use videozone_engine::HallucinationEngine;
use videozone_gateway::start_gateway;
use videozone_model::{ImageModel, OfflineModel, RemoteImg2Img};

#[derive(Parser)]
#[command(
    name = "videozone",
    about = "Self-feeding video hallucination engine served over HTTP",
    version = env!("CARGO_PKG_VERSION")
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Path to config file (TOML)
    #[arg(short, long, default_value = "videozone.toml")]
    config: PathBuf,

    /// Port for the HTTP server
    #[arg(short, long)]
    port: Option<u16>,

    /// Bind mode: lan or loopback
    #[arg(short, long)]
    bind: Option<String>,

    /// img2img backend URL
    #[arg(short, long)]
    endpoint: Option<String>,

    /// Initial prompt
    #[arg(long)]
    prompt: Option<String>,

    /// Run without a model (noise fallback only)
    #[arg(long, default_value_t = false)]
    offline: bool,

    /// Write logs to a file (in addition to stderr)
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Print the default configuration as TOML and exit
    #[arg(long, default_value_t = false)]
    dump_config: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Version) = cli.command {
        println!("videozone v{}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }
    if cli.dump_config {
        print!("{}", VideozoneConfig::default().to_toml());
        return Ok(());
    }

    let _log_guard = init_tracing(cli.log_file.as_deref())?;

    let config = apply_overrides(VideozoneConfig::load(&cli.config), &cli);
    let model = build_model(&config)?;
    info!(
        "Model backend: {} ({})",
        model.name(),
        config.model.endpoint
    );

    let engine = Arc::new(HallucinationEngine::new(&config, model));
    engine.start();
    start_gateway(&config.server, engine).await
}

fn apply_overrides(mut config: VideozoneConfig, cli: &Cli) -> VideozoneConfig {
    if let Some(port) = cli.port {
        config.server.port = port;
    }
    if let Some(bind) = &cli.bind {
        config.server.bind = BindMode::parse(bind);
    }
    if let Some(endpoint) = &cli.endpoint {
        config.model.endpoint = endpoint.clone();
    }
    if let Some(prompt) = &cli.prompt {
        config.engine.prompt = prompt.clone();
    }
    if cli.offline {
        config.model.backend = ModelBackend::Offline;
    }
    config
}

fn build_model(config: &VideozoneConfig) -> anyhow::Result<Arc<dyn ImageModel>> {
    let model: Arc<dyn ImageModel> = match config.model.backend {
        ModelBackend::Remote => Arc::new(RemoteImg2Img::new(&config.model)?),
        ModelBackend::Offline => Arc::new(OfflineModel::new()),
    };
    Ok(model)
}

/// stderr always; a non-blocking file layer when `log_file` is set. The
/// returned guard flushes the file on drop.
fn init_tracing(
    log_file: Option<&std::path::Path>,
) -> anyhow::Result<Option<tracing_appender::non_blocking::WorkerGuard>> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "videozone=info,tower_http=info".into());

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            let (writer, guard) = tracing_appender::non_blocking(file);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .init();
    Ok(guard)
}
