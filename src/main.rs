use clap::{Args, Parser, Subcommand};
use llm_gateway::app::telemetry;
use llm_gateway::{Backend, Gateway, GatewayConfig, StatusMapping};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "llm-gateway")]
#[command(version)]
#[command(about = "Serve local large language models over HTTP and gRPC", long_about = None)]
struct Cli {
    /// YAML configuration file
    #[arg(short, long, global = true, env = "LLM_GATEWAY_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP and gRPC servers (default)
    Serve(ServeArgs),
    /// Print the resolved configuration and exit
    CheckConfig(ServeArgs),
    Version,
}

#[derive(Args, Default)]
struct ServeArgs {
    #[arg(long)]
    http_addr: Option<SocketAddr>,
    #[arg(long)]
    grpc_addr: Option<SocketAddr>,
    #[arg(long)]
    models_root: Option<PathBuf>,
    #[arg(long)]
    default_model: Option<String>,
    #[arg(long)]
    backend: Option<Backend>,
    #[arg(long)]
    grpc_workers: Option<usize>,
    #[arg(long)]
    timeout_secs: Option<u64>,
    /// `typed` (default) gives each failure its own status, e.g. 404 for an
    /// unknown model; `collapsed` answers every model or inference failure
    /// with 500 / INTERNAL
    #[arg(long)]
    status_mapping: Option<StatusMapping>,
    /// Load these models before accepting requests
    #[arg(long)]
    preload: Vec<String>,
}

impl ServeArgs {
    fn apply(self, config: &mut GatewayConfig) {
        if let Some(v) = self.http_addr {
            config.http_addr = v;
        }
        if let Some(v) = self.grpc_addr {
            config.grpc_addr = v;
        }
        if let Some(v) = self.models_root {
            config.models_root = v;
        }
        if let Some(v) = self.default_model {
            config.default_model = v;
        }
        if let Some(v) = self.backend {
            config.backend = v;
        }
        if let Some(v) = self.grpc_workers {
            config.grpc_workers = v;
        }
        if let Some(v) = self.timeout_secs {
            config.request_timeout_secs = v;
        }
        if let Some(v) = self.status_mapping {
            config.status_mapping = v;
        }
        config.preload.extend(self.preload);
    }
}

fn resolve_config(path: Option<&std::path::Path>, args: ServeArgs) -> anyhow::Result<GatewayConfig> {
    let mut config = GatewayConfig::load(path)?;
    args.apply(&mut config);
    config.validate()?;
    Ok(config)
}

async fn serve(config: GatewayConfig) -> anyhow::Result<()> {
    tracing::info!(
        http = %config.http_addr,
        grpc = %config.grpc_addr,
        models_root = %config.models_root().display(),
        backend = %config.backend,
        default_model = %config.default_model,
        "starting llm-gateway"
    );

    let gateway = Gateway::from_config(config)?;
    gateway.run(shutdown_signal()).await
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    telemetry::init_tracing("info");

    let config_path = cli.config.as_deref();
    let result = match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => match resolve_config(config_path, args) {
            Ok(config) => serve(config).await,
            Err(e) => Err(e),
        },
        Commands::CheckConfig(args) => resolve_config(config_path, args).and_then(|config| {
            println!("{}", serde_yaml::to_string(&config)?);
            Ok(())
        }),
        Commands::Version => {
            println!("llm-gateway {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
    };

    if let Err(e) = result {
        eprintln!("Error: {:#}", e);
        process::exit(1);
    }
}
