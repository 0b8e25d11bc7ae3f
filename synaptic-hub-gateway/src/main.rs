use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use synaptic_hub::catalog::SearchRequest;
use synaptic_hub::server;
use synaptic_hub::{Gateway, HubConfig};

#[derive(Parser)]
#[command(name = "synaptic-hub")]
#[command(version)]
#[command(about = "Synaptic Hub - dynamic tool gateway for a single editor engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the WebSocket listener (and optionally a stdio JSON-RPC session)
    Serve(ServeArgs),
    /// Print the tool categories known to the registry
    Categories(RegistryArgs),
    /// Rank registry tools against a query
    Search(SearchArgs),
}

#[derive(Args)]
struct RegistryArgs {
    /// TOML configuration file
    #[arg(long, env = "SYNAPTIC_HUB_CONFIG")]
    config: Option<PathBuf>,

    /// Generated tool registry (overrides the config file)
    #[arg(long, env = "SYNAPTIC_HUB_REGISTRY")]
    registry: Option<PathBuf>,
}

#[derive(Args)]
struct ServeArgs {
    #[command(flatten)]
    registry: RegistryArgs,

    #[arg(long, env = "SYNAPTIC_HUB_BIND_ADDR")]
    bind_addr: Option<String>,

    #[arg(long)]
    request_timeout_ms: Option<u64>,

    #[arg(long)]
    max_attempts: Option<u32>,

    #[arg(long)]
    retry_delay_ms: Option<u64>,

    /// Also serve the tool protocol over stdin/stdout; exit when stdin closes
    #[arg(long)]
    stdio: bool,
}

#[derive(Args)]
struct SearchArgs {
    #[command(flatten)]
    registry: RegistryArgs,

    query: String,

    #[arg(long)]
    limit: Option<usize>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing()?;
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve(args) => serve(args).await,
        Commands::Categories(args) => categories(args),
        Commands::Search(args) => search(args).await,
    }
}

/// Logs go to stderr; stdout belongs to the stdio transport.
fn init_tracing() -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("synaptic_hub=info"));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    tracing::subscriber::set_global_default(subscriber)
        .context("failed to install tracing subscriber")?;
    tracing_log::LogTracer::init().context("failed to bridge log records")?;
    Ok(())
}

fn load_config(args: &RegistryArgs) -> anyhow::Result<HubConfig> {
    let mut config = match &args.config {
        Some(path) => HubConfig::from_file(path)
            .with_context(|| format!("loading {}", path.display()))?,
        None => HubConfig::default(),
    };
    if let Some(registry) = &args.registry {
        config.registry_path = registry.clone();
    }
    Ok(config)
}

async fn serve(args: ServeArgs) -> anyhow::Result<()> {
    let mut config = load_config(&args.registry)?;
    if let Some(bind_addr) = args.bind_addr {
        config.bind_addr = bind_addr;
    }
    if let Some(timeout) = args.request_timeout_ms {
        config.request_timeout_ms = timeout;
    }
    if let Some(attempts) = args.max_attempts {
        config.max_attempts = attempts;
    }
    if let Some(delay) = args.retry_delay_ms {
        config.retry_delay_ms = delay;
    }
    config.validate()?;

    let listener = tokio::net::TcpListener::bind(&config.bind_addr)
        .await
        .with_context(|| format!("binding {}", config.bind_addr))?;
    let gateway = Arc::new(Gateway::from_config(config));
    info!("[Hub] Synaptic Hub {} started", env!("CARGO_PKG_VERSION"));

    if args.stdio {
        let stdio = tokio::spawn(server::serve_stdio(gateway.clone()));
        let shutdown = async move {
            tokio::select! {
                _ = stdio => info!("[Hub] stdin closed, shutting down"),
                _ = tokio::signal::ctrl_c() => info!("[Hub] Interrupted, shutting down"),
            }
        };
        server::serve(gateway, listener, shutdown).await?;
    } else {
        let shutdown = async {
            let _ = tokio::signal::ctrl_c().await;
            info!("[Hub] Interrupted, shutting down");
        };
        server::serve(gateway, listener, shutdown).await?;
    }
    Ok(())
}

fn categories(args: RegistryArgs) -> anyhow::Result<()> {
    let gateway = Gateway::from_config(load_config(&args)?);
    let catalog = gateway.catalog();
    let summary = serde_json::json!({
        "categories": catalog.category_summary(),
        "degraded": catalog.is_degraded(),
    });
    println!("{}", serde_json::to_string_pretty(&summary)?);
    Ok(())
}

async fn search(args: SearchArgs) -> anyhow::Result<()> {
    let gateway = Gateway::from_config(load_config(&args.registry)?);
    let request = SearchRequest {
        query: args.query,
        limit: args.limit,
    };
    let outcome = gateway.catalog().search(&request).await;
    println!("{}", serde_json::to_string_pretty(&outcome)?);
    Ok(())
}
