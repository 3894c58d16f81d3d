// SPDX-License-Identifier: MIT OR Apache-2.0
#![deny(unsafe_code)]
use agentspec_cli::commands::{self, SchemaKind};
use agentspec_cli::config::{config_check, load_effective_config};
use agentspec_cli::format::{Formatter, OutputFormat};
use agentspec_config::validate_config;
use agentspec_plan::{Adapter, Applier, LocalAdapter, Planner};
use agentspec_runtime::cancel::CancellationToken;
use agentspec_runtime::invocation::Invocation;
use agentspec_server::middleware::{AuthConfig, CorsConfig};
use agentspec_server::{boot, build_router, BootOutput, HttpLlmClient};
use agentspec_state::StateStore;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Exit code for runtime errors.
const EXIT_RUNTIME_ERROR: i32 = 1;

#[derive(Parser, Debug)]
#[command(name = "agentspec", version, about = "AgentSpec toolchain CLI: compile, plan, apply, invoke, serve")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(long)]
    debug: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Lower an AST file into a compiled IR document, checking references
    /// and acyclicity.
    Compile {
        /// Path to the AST JSON file (as an external parser would emit).
        #[arg(long)]
        ast: PathBuf,

        /// Pre-lowered import documents, as `key=path.json`. Repeatable.
        #[arg(long = "import")]
        imports: Vec<String>,

        /// Where to write the compiled document. Defaults to stdout.
        #[arg(long)]
        out: Option<PathBuf>,
    },

    /// Validate an already-compiled document: every reference resolves and
    /// the resource graph is acyclic.
    Validate {
        /// Path to the compiled document JSON.
        #[arg(long)]
        document: PathBuf,
    },

    /// Print a JSON schema for a CLI-known type.
    Schema {
        /// Which schema to print.
        #[arg(value_enum, default_value_t = SchemaArg::Config)]
        kind: SchemaArg,
    },

    /// Compute the desired-state plan for a document against its last
    /// applied state, without carrying it out.
    Plan {
        /// Path to the compiled document JSON.
        #[arg(long)]
        document: PathBuf,

        /// Directory holding (or to hold) the state file.
        #[arg(long, default_value = ".")]
        state_dir: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormatArg::Compact)]
        output: OutputFormatArg,
    },

    /// Compute and carry out the desired-state plan against the local
    /// file-backed adapter.
    Apply {
        /// Path to the compiled document JSON.
        #[arg(long)]
        document: PathBuf,

        /// Directory holding (or to hold) the state file.
        #[arg(long, default_value = ".")]
        state_dir: PathBuf,

        /// Root directory the local adapter writes deployed snapshots into.
        #[arg(long, default_value = ".agentspec/deployed")]
        deploy_root: PathBuf,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormatArg::Compact)]
        output: OutputFormatArg,
    },

    /// Invoke one agent from a compiled document directly, without running
    /// the HTTP server.
    Invoke {
        /// Path to the compiled document JSON.
        #[arg(long)]
        document: PathBuf,

        /// Fully-qualified name of the agent to invoke.
        #[arg(long)]
        agent: String,

        /// Input payload, as a JSON string.
        #[arg(long, default_value = "{}")]
        input: String,

        /// Path to a `RuntimeConfig` TOML file.
        #[arg(long)]
        config: Option<PathBuf>,

        /// Base URL of the chat-completions-shaped model backend.
        #[arg(long, default_value = "https://api.openai.com/v1")]
        llm_base_url: String,

        /// API key for the model backend. Falls back to `AGENTSPEC_LLM_API_KEY`.
        #[arg(long)]
        llm_api_key: Option<String>,

        /// Output format.
        #[arg(long, value_enum, default_value_t = OutputFormatArg::Text)]
        output: OutputFormatArg,
    },

    /// Boot the runtime and serve the HTTP control-plane in-process (a
    /// convenience wrapper over the standalone `agentspec-server` binary).
    Serve {
        /// Path to the compiled document JSON.
        #[arg(long)]
        document: PathBuf,

        /// Path to a `RuntimeConfig` TOML file.
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
    },

    /// Inspect a persisted invocation receipt and verify its content hash.
    Inspect {
        /// Path to the receipt JSON file.
        file: PathBuf,
    },

    /// Check the effective `RuntimeConfig` for errors and warnings.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Load and validate the configuration, reporting errors and warnings.
    Check {
        /// Path to a `RuntimeConfig` TOML file.
        #[arg(long)]
        file: Option<PathBuf>,
    },
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum SchemaArg {
    /// `RuntimeConfig`'s schema.
    Config,
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum OutputFormatArg {
    Json,
    JsonPretty,
    Text,
    Table,
    Compact,
}

impl From<OutputFormatArg> for OutputFormat {
    fn from(a: OutputFormatArg) -> Self {
        match a {
            OutputFormatArg::Json => OutputFormat::Json,
            OutputFormatArg::JsonPretty => OutputFormat::JsonPretty,
            OutputFormatArg::Text => OutputFormat::Text,
            OutputFormatArg::Table => OutputFormat::Table,
            OutputFormatArg::Compact => OutputFormat::Compact,
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let filter = if cli.debug { EnvFilter::new("agentspec=debug") } else { EnvFilter::new("agentspec=info") };
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if let Err(e) = run(cli.command).await {
        eprintln!("{}", Formatter::new(OutputFormat::Text).format_error(&e.to_string()));
        std::process::exit(EXIT_RUNTIME_ERROR);
    }
}

async fn run(command: Commands) -> Result<()> {
    match command {
        Commands::Compile { ast, imports, out } => cmd_compile(ast, imports, out),
        Commands::Validate { document } => cmd_validate(document),
        Commands::Schema { kind } => cmd_schema(kind),
        Commands::Plan { document, state_dir, output } => cmd_plan(document, state_dir, output),
        Commands::Apply { document, state_dir, deploy_root, output } => cmd_apply(document, state_dir, deploy_root, output).await,
        Commands::Invoke { document, agent, input, config, llm_base_url, llm_api_key, output } => {
            cmd_invoke(document, agent, input, config, llm_base_url, llm_api_key, output).await
        }
        Commands::Serve { document, config, bind, llm_base_url, llm_api_key } => {
            cmd_serve(document, config, bind, llm_base_url, llm_api_key).await
        }
        Commands::Inspect { file } => cmd_inspect(file),
        Commands::Config { action: ConfigAction::Check { file } } => cmd_config_check(file),
    }
}

fn cmd_compile(ast_path: PathBuf, import_flags: Vec<String>, out: Option<PathBuf>) -> Result<()> {
    let ast = commands::read_ast(&ast_path)?;

    let mut imports = BTreeMap::new();
    for flag in import_flags {
        let (key, path) = flag.split_once('=').with_context(|| format!("malformed --import flag (want key=path): {flag}"))?;
        let doc = commands::read_document(&PathBuf::from(path))?;
        imports.insert(key.to_string(), doc);
    }

    let doc = commands::compile(&ast, &imports)?;
    let json = serde_json::to_string_pretty(&doc)?;
    match out {
        Some(path) => std::fs::write(&path, json).with_context(|| format!("write document to {}", path.display())),
        None => {
            println!("{json}");
            Ok(())
        }
    }
}

fn cmd_validate(document: PathBuf) -> Result<()> {
    let doc = commands::read_document(&document)?;
    let problems = commands::validate_document(&doc);
    if problems.is_empty() {
        println!("valid: {} resources, 0 problems", doc.resources.len());
        Ok(())
    } else {
        for problem in &problems {
            eprintln!("problem: {problem}");
        }
        anyhow::bail!("{} validation problem(s) found", problems.len());
    }
}

fn cmd_schema(kind: SchemaArg) -> Result<()> {
    let key = match kind {
        SchemaArg::Config => SchemaKind::Config,
    };
    println!("{}", commands::schema_json(key)?);
    Ok(())
}

fn cmd_plan(document: PathBuf, state_dir: PathBuf, output: OutputFormatArg) -> Result<()> {
    let doc = commands::read_document(&document)?;
    let store = StateStore::new(state_dir);
    let state = store.load().context("load state")?;
    let actions = Planner::plan(&doc, &state);

    let formatter = Formatter::new(output.into());
    for action in &actions {
        println!("{}", formatter.format_action(action));
    }
    println!("{} action(s) planned", actions.len());
    Ok(())
}

async fn cmd_apply(document: PathBuf, state_dir: PathBuf, deploy_root: PathBuf, output: OutputFormatArg) -> Result<()> {
    let doc = commands::read_document(&document)?;
    let store = StateStore::new(state_dir);
    let state = store.load().context("load state")?;
    let actions = Planner::plan(&doc, &state);

    let adapter = LocalAdapter::new(deploy_root);
    let cancel = CancellationToken::new();
    let applier = Applier::new(&adapter as &dyn Adapter);
    let results = applier.apply(&cancel, &actions, state, &store).await.context("apply actions")?;

    let formatter = Formatter::new(output.into());
    let mut failures = 0;
    for result in &results {
        if matches!(result.status, agentspec_plan::ApplyOutcome::Failed) {
            failures += 1;
        }
        println!("{}", formatter.format_apply_result(result));
    }
    println!("{} applied, {failures} failed", results.len());
    if failures > 0 {
        anyhow::bail!("{failures} action(s) failed to apply");
    }
    Ok(())
}

async fn cmd_invoke(
    document: PathBuf,
    agent: String,
    input: String,
    config_path: Option<PathBuf>,
    llm_base_url: String,
    llm_api_key: Option<String>,
    output: OutputFormatArg,
) -> Result<()> {
    let doc = commands::read_document(&document)?;
    let config = load_effective_config(config_path.as_deref())?;
    for warning in validate_config(&config).context("validate runtime config")? {
        warn!(%warning, "config warning");
    }

    let input_value: serde_json::Value = serde_json::from_str(&input).context("parse --input as JSON")?;
    let api_key = llm_api_key.or_else(|| std::env::var("AGENTSPEC_LLM_API_KEY").ok());
    let llm = Arc::new(HttpLlmClient::new(llm_base_url, api_key));

    let vault_root = config.state_dir.clone().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let BootOutput { state, .. } = boot(&doc, &config, vault_root, llm).await.context("boot runtime")?;

    let invocation = Invocation::new(agent, input_value);
    let outcome = state.runtime.invoke(invocation).await.context("invoke agent")?;

    println!("{}", Formatter::new(output.into()).format_outcome(&outcome));
    Ok(())
}

async fn cmd_serve(
    document: PathBuf,
    config_path: Option<PathBuf>,
    bind: Option<String>,
    llm_base_url: String,
    llm_api_key: Option<String>,
) -> Result<()> {
    let doc = commands::read_document(&document)?;
    let mut config = load_effective_config(config_path.as_deref())?;
    if let Some(bind) = bind {
        config.bind_addr = Some(bind);
    }
    for warning in validate_config(&config).context("validate runtime config")? {
        warn!(%warning, "config warning");
    }

    let bind_addr =
        config.bind_addr.clone().ok_or_else(|| anyhow::anyhow!("no bind address configured (pass --bind or set bind_addr)"))?;

    let api_key = llm_api_key.or_else(|| std::env::var("AGENTSPEC_LLM_API_KEY").ok());
    let llm = Arc::new(HttpLlmClient::new(llm_base_url, api_key));

    let vault_root = config.state_dir.clone().map(PathBuf::from).unwrap_or_else(|| PathBuf::from("."));
    let BootOutput { state, redactor } = boot(&doc, &config, vault_root, llm).await.context("boot runtime")?;

    let auth = AuthConfig { api_key: config.api_key.clone(), no_auth: config.no_auth };
    let cors = CorsConfig {
        allowed_origins: vec!["*".to_string()],
        allowed_methods: vec!["GET".to_string(), "POST".to_string(), "DELETE".to_string()],
        allowed_headers: vec!["content-type".to_string(), "authorization".to_string(), "x-api-key".to_string()],
    };

    let app =
        build_router(state, auth, config.rate_limit_rps, config.rate_limit_burst, config.body_limit_bytes as usize, &cors);

    let listener = tokio::net::TcpListener::bind(&bind_addr).await.with_context(|| format!("bind {bind_addr}"))?;
    tracing::info!(bind = %bind_addr, document = %redactor.redact(&document.display().to_string()), "agentspec serving");
    axum::serve(listener, app).await.context("serve")
}

fn cmd_inspect(file: PathBuf) -> Result<()> {
    let (receipt, valid) = commands::inspect_receipt_file(&file)?;
    println!("run_id:     {}", receipt.run_id);
    println!("agent:      {}", receipt.agent_fqn);
    println!("outcome:    {:?}", receipt.outcome);
    println!("turns:      {}", receipt.turns_used);
    println!("tokens:     {}", receipt.tokens_used);
    println!("cost_usd:   {}", receipt.cost_usd);
    println!("duration:   {}ms", receipt.duration_ms);
    println!("hash_valid: {valid}");
    if !valid {
        anyhow::bail!("receipt hash does not match its recorded fields");
    }
    Ok(())
}

fn cmd_config_check(file: Option<PathBuf>) -> Result<()> {
    let diagnostics = config_check(file.as_deref());
    let has_error = diagnostics.iter().any(|d| d.starts_with("error:"));
    for d in &diagnostics {
        println!("{d}");
    }
    if has_error {
        anyhow::bail!("configuration is invalid");
    }
    Ok(())
}
