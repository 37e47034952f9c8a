use std::env;
use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::auth::parse_api_keys;

const ENV_PREFIX: &str = "ASR_GATEWAY_";

#[derive(Parser)]
#[command(name = "asr-gateway", about = "WebSocket transcription gateway")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the gateway server
    Proxy(ProxyArgs),
    /// Stream an audio file through a running gateway
    Client(ClientArgs),
}

#[derive(Args, Debug, Clone, Default)]
pub struct ProxyArgs {
    /// Listen address, e.g. 0.0.0.0:8080
    #[arg(long)]
    pub listen: Option<String>,
    /// Upstream engine WebSocket URL
    #[arg(long)]
    pub engine_url: Option<String>,
    /// Client auth mode (none|api_key)
    #[arg(long)]
    pub auth_mode: Option<String>,
    /// Comma-separated client API keys
    #[arg(long)]
    pub api_keys: Option<String>,
    /// Max audio frames buffered between the socket and the engine
    #[arg(long)]
    pub audio_buffer_frames: Option<usize>,
    /// Log filter, e.g. `info` or `asr_gateway=debug`
    #[arg(long)]
    pub log: Option<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ClientArgs {
    /// Gateway WebSocket URL
    #[arg(long, default_value = "ws://localhost:8080/ws")]
    pub url: String,
    /// Input audio file, streamed as raw bytes
    #[arg(short, long)]
    pub input: PathBuf,
    /// Model name for the init message
    #[arg(long, default_value = "atran-generic")]
    pub model: String,
    /// Lexicon file with `source:target` lines
    #[arg(long)]
    pub lexicon: Option<PathBuf>,
    /// Audio chunk size in bytes
    #[arg(long, default_value_t = 4096)]
    pub chunk_size: usize,
    /// Print raw JSON frames instead of final text lines
    #[arg(long)]
    pub json: bool,
    /// How to present the API key (none|header|bearer|query|subprotocol)
    #[arg(long, default_value = "none")]
    pub auth: String,
    /// API key used with --auth
    #[arg(long)]
    pub api_key: Option<String>,
}

/// Resolved server configuration: defaults, then `ASR_GATEWAY_*` environment
/// variables, then CLI flags.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub listen: String,
    pub engine_url: Option<String>,
    pub auth_mode: String,
    pub api_keys: Vec<String>,
    pub audio_buffer_frames: usize,
    pub log: String,
}

impl AppConfig {
    pub fn resolve(args: &ProxyArgs) -> Self {
        Self::from_parts(args, &|name| env::var(format!("{ENV_PREFIX}{name}")).ok())
    }

    fn from_parts(args: &ProxyArgs, env: &dyn Fn(&str) -> Option<String>) -> Self {
        let listen = pick(args.listen.clone(), env("LISTEN"))
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let engine_url = pick(args.engine_url.clone(), env("ENGINE_URL"));
        let auth_mode =
            pick(args.auth_mode.clone(), env("AUTH_MODE")).unwrap_or_else(|| "none".to_string());
        let api_keys = parse_api_keys(
            pick(args.api_keys.clone(), env("API_KEYS"))
                .as_deref(),
        );
        let audio_buffer_frames = args
            .audio_buffer_frames
            .or_else(|| env("AUDIO_BUFFER_FRAMES").and_then(|value| value.trim().parse().ok()))
            .filter(|frames| *frames > 0)
            .unwrap_or(32);
        let log = pick(args.log.clone(), env("LOG")).unwrap_or_else(|| "info".to_string());

        Self {
            listen,
            engine_url,
            auth_mode,
            api_keys,
            audio_buffer_frames,
            log,
        }
    }
}

fn pick(cli: Option<String>, env: Option<String>) -> Option<String> {
    cli.filter(|value| !value.trim().is_empty())
        .or_else(|| env.filter(|value| !value.trim().is_empty()))
}
