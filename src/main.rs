use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio::net::TcpListener;
use tracing::info;

use asr_gateway::client;
use asr_gateway::config::{AppConfig, Cli, Commands, ProxyArgs};
use asr_gateway::metrics::MetricsStore;
use asr_gateway::readiness::AlwaysReady;
use asr_gateway::server::{self, AppState};
use asr_gateway::session::SessionContext;
use asr_gateway::upstream::ws::WsEngineConnector;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Proxy(ProxyArgs::default())) {
        Commands::Proxy(args) => run_proxy(args).await,
        Commands::Client(args) => {
            setup_tracing("warn");
            client::run(&args).await
        }
    }
}

async fn run_proxy(args: ProxyArgs) -> anyhow::Result<()> {
    let config = AppConfig::resolve(&args);
    setup_tracing(&config.log);
    let engine_url = config
        .engine_url
        .clone()
        .context("engine URL is required (--engine-url or ASR_GATEWAY_ENGINE_URL)")?;

    let ctx = Arc::new(SessionContext {
        metrics: Arc::new(MetricsStore::default()),
        readiness: Arc::new(AlwaysReady),
        connector: Arc::new(WsEngineConnector::new(engine_url)),
        audio_buffer_frames: config.audio_buffer_frames,
    });
    let state = AppState {
        auth_mode: config.auth_mode.clone(),
        api_keys: config.api_keys.clone(),
        session: ctx,
    };
    let app = server::router(state);

    let listen: SocketAddr = config
        .listen
        .parse()
        .with_context(|| format!("invalid listen address '{}'", config.listen))?;
    let listener = TcpListener::bind(listen)
        .await
        .context("failed to bind tcp listener")?;
    info!(%listen, auth_mode = %config.auth_mode, "starting asr-gateway websocket server");
    axum::serve(listener, app.into_make_service())
        .await
        .context("websocket server exited")?;
    Ok(())
}

fn setup_tracing(filter: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(filter));
    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}
