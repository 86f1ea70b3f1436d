mod collectors;
mod config;
mod control;
mod error;
mod http;
mod metrics;
mod models;
mod uptime;

use clap::Parser;
use collectors::MockTelemetry;
use config::{Config, Overrides};
use control::SimulatedController;
use http::{AppState, HttpOptions, ShutdownOutcome};
use metrics::Metrics;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "statusd")]
#[command(version)]
struct Cli {
    /// YAML config file; built-in defaults are used when omitted.
    #[arg(long)]
    config: Option<String>,
    #[arg(long)]
    print_default_config: bool,
    #[arg(long, env = "PORT")]
    port: Option<u16>,
    /// Hide raw failure details from 500 responses.
    #[arg(long)]
    production: bool,
    /// `production` has the same effect as `--production`.
    #[arg(long = "app-env", env = "APP_ENV", hide = true)]
    app_env: Option<String>,
}

#[tokio::main]
async fn main() {
    init_tracing();

    let cli = Cli::parse();
    if cli.print_default_config {
        println!("{}", Config::example_yaml());
        return;
    }

    let mut cfg = match &cli.config {
        Some(path) => match Config::load_from_file(path) {
            Ok(cfg) => cfg,
            Err(err) => {
                error!(error = %err, "failed to load configuration");
                std::process::exit(1);
            }
        },
        None => Config::default(),
    };
    cfg.apply_overrides(&Overrides {
        port: cli.port,
        production: cli.production,
        app_env: cli.app_env.clone(),
    });
    if let Err(err) = cfg.validate() {
        error!(error = %err, "invalid configuration");
        std::process::exit(1);
    }

    let metrics = match Metrics::new() {
        Ok(m) => m,
        Err(err) => {
            error!(error = %err, "failed to initialise metrics");
            std::process::exit(1);
        }
    };

    let state = AppState::new(
        Arc::new(MockTelemetry::new()),
        Arc::new(SimulatedController::from_config(&cfg.control)),
        metrics,
    );
    let app = http::build_router(state, &HttpOptions::from_config(&cfg));

    let addr = cfg.listen_addr();
    let listener = match TcpListener::bind(addr).await {
        Ok(l) => l,
        Err(err) => {
            error!(error = %err, listen = %addr, "failed to bind HTTP listener");
            std::process::exit(1);
        }
    };
    info!(
        listen = %addr,
        production = cfg.production,
        public_dir = %cfg.public_dir.display(),
        "statusd started"
    );

    let shutdown = async {
        let signal = shutdown_signal().await;
        info!(signal, "shutdown signal received, stopping");
    };
    match http::serve_until(listener, app, shutdown, cfg.shutdown_grace).await {
        Ok(ShutdownOutcome::Drained) => info!("all in-flight requests finished"),
        Ok(ShutdownOutcome::GraceElapsed) => info!("exiting with requests still in flight"),
        Err(err) => {
            error!(error = %err, "HTTP server exited unexpectedly");
            std::process::exit(1);
        }
    }
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

/// Resolves with the name of the first termination signal received.
async fn shutdown_signal() -> &'static str {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!(error = %err, "failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}
