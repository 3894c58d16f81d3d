#![deny(unsafe_code)]
use agentspec_config::{apply_env_overrides, load_config, validate_config, RuntimeConfig};
use agentspec_core::Document;
use agentspec_server::{boot, build_router, BootOutput, HttpLlmClient};
use agentspec_server::middleware::{AuthConfig, CorsConfig};
use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "agentspec-server", version, about = "AgentSpec HTTP control-plane")]
struct Args {
    /// Path to the compiled IR document (JSON, as produced by `agentspec compile`).
    #[arg(long)]
    document: PathBuf,

    /// Path to a `RuntimeConfig` TOML file. Omit to use defaults plus
    /// `AGENTSPEC_*` environment overrides.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Override the configured bind address.
    #[arg(long)]
    bind: Option<String>,

    /// Base URL of the chat-completions-shaped model backend.
    #[arg(long, default_value = "https://api.openai.com/v1")]
    llm_base_url: String,

    /// API key for the model backend. Falls back to `AGENTSPEC_LLM_API_KEY`.
    #[arg(long)]
    llm_api_key: Option<String>,

    /// Enable debug-level tracing.
    #[arg(long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("agentspec=debug,tower_http=debug")
    } else {
        EnvFilter::new("agentspec=info")
    };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let mut config = load_config(args.config.as_deref()).context("load runtime config")?;
    apply_env_overrides(&mut config);
    if let Some(bind) = &args.bind {
        config.bind_addr = Some(bind.clone());
    }

    for warning in validate_config(&config).context("validate runtime config")? {
        warn!(%warning, "config warning");
    }

    let bind_addr = config
        .bind_addr
        .clone()
        .ok_or_else(|| anyhow::anyhow!("no bind address configured (pass --bind or set bind_addr)"))?;

    let doc_bytes = std::fs::read_to_string(&args.document)
        .with_context(|| format!("read document {}", args.document.display()))?;
    let doc: Document = serde_json::from_str(&doc_bytes)
        .with_context(|| format!("parse document {}", args.document.display()))?;

    let api_key = args.llm_api_key.or_else(|| std::env::var("AGENTSPEC_LLM_API_KEY").ok());
    let llm = Arc::new(HttpLlmClient::new(args.llm_base_url.clone(), api_key));

    let vault_root = config.state_dir.clone().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let BootOutput { state, redactor } =
        boot(&doc, &config, vault_root, llm).await.context("boot runtime")?;

    let auth = AuthConfig { api_key: config.api_key.clone(), no_auth: config.no_auth };
    let cors = CorsConfig {
        allowed_origins: vec!["*".to_string()],
        allowed_methods: vec!["GET".to_string(), "POST".to_string(), "DELETE".to_string()],
        allowed_headers: vec!["content-type".to_string(), "authorization".to_string(), "x-api-key".to_string()],
    };

    let app = build_router(
        state,
        auth,
        config.rate_limit_rps,
        config.rate_limit_burst,
        config.body_limit_bytes as usize,
        &cors,
    );

    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("bind {bind_addr}"))?;
    info!(bind = %bind_addr, document = %redactor.redact(&args.document.display().to_string()), "agentspec-server listening");

    axum::serve(listener, app).await.context("serve")
}
