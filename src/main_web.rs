// Fraud inference bridge web server; the same binary doubles as the reference worker
use std::convert::Infallible;
use std::error::Error;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use hyper::service::{make_service_fn, service_fn};
use hyper::Server;

use fraud_bridge::web::config::BridgeConfig;
use fraud_bridge::web::logger::setup_logging;
use fraud_bridge::web::models::{AppState, SharedAppState};
use fraud_bridge::web::routes::handle_request;
use fraud_bridge::web::worker::ipc_types::WorkerMode;
use fraud_bridge::web::worker::worker_main::{run_worker, EXIT_USAGE};
use fraud_bridge::{sys_error, sys_info, sys_warn};

/// Fraud classification service backed by isolated worker processes
#[derive(Parser, Debug)]
#[command(name = "fraud_bridge_web")]
#[command(version)]
struct Cli {
    /// Run as a scoring worker instead of the server
    #[arg(long, requires = "mode")]
    worker: bool,

    /// Worker mode (with --worker)
    #[arg(value_enum, requires = "worker")]
    mode: Option<WorkerMode>,

    /// Serialized transaction (with --worker predict)
    #[arg(allow_hyphen_values = true, requires = "worker")]
    payload: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listening port
    #[arg(short, long)]
    port: Option<u16>,

    /// Override the worker executable
    #[arg(long)]
    worker_program: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    if cli.worker {
        let code = match cli.mode {
            Some(mode) => run_worker(mode, cli.payload.as_deref()),
            None => EXIT_USAGE,
        };
        std::process::exit(code);
    }

    if let Err(e) = run_server(cli) {
        sys_error!("fatal: {e}");
        eprintln!("fraud_bridge_web: {e}");
        std::process::exit(1);
    }
}

fn run_server(cli: Cli) -> Result<(), Box<dyn Error>> {
    let mut config = BridgeConfig::load(cli.config.as_deref())?;
    if let Some(port) = cli.port {
        config.port = port;
    }
    if let Some(program) = cli.worker_program {
        config.worker.program = program;
    }
    config.validate()?;

    setup_logging(&config.logging)?;

    let host: IpAddr = config
        .host
        .parse()
        .map_err(|e| format!("invalid host {:?}: {e}", config.host))?;
    let addr = SocketAddr::new(host, config.port);
    let state: SharedAppState = Arc::new(AppState::from_config(config)?);

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    runtime.block_on(serve(addr, state))
}

async fn serve(addr: SocketAddr, state: SharedAppState) -> Result<(), Box<dyn Error>> {
    if !state.bridge.program().is_available() {
        sys_warn!(
            "[STARTUP] worker executable not found: {}; /predict will fail until it is installed",
            state.bridge.program()
        );
    }

    let make_svc = make_service_fn({
        let state = state.clone();
        move |_conn| {
            let state = state.clone();
            async move {
                Ok::<_, Infallible>(service_fn(move |req| handle_request(req, state.clone())))
            }
        }
    });

    let server = Server::try_bind(&addr)?.serve(make_svc);

    sys_info!("Fraud bridge listening on http://{addr}");
    sys_info!("  model:     {}", state.config.model_id);
    sys_info!("  estimator: {}", state.estimator.kind());
    sys_info!("  worker:    {}", state.bridge.program());
    sys_info!("Available endpoints:");
    sys_info!("  GET  /health   - Liveness and worker status");
    sys_info!("  POST /predict  - Classify a transaction");
    sys_info!("  POST /train    - Run the training worker");

    server
        .with_graceful_shutdown(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                sys_error!("failed to listen for shutdown signal: {e}");
                std::future::pending::<()>().await;
            }
            sys_info!("Shutting down");
        })
        .await?;
    Ok(())
}
