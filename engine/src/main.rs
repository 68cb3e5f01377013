use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::{fs, io::Read};

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use uiforge_core::{
    default_state_dir, load_generation_prompt, present_tool_invocation, ConfigStore,
    DEFAULT_SERVER_HOST, DEFAULT_SERVER_PORT,
};
use uiforge_observability::{
    emit_event, init_process_logging, logs_dir_from_state_dir, ObservabilityEvent, ProcessKind,
};
use uiforge_server::{serve, AppState};
use uiforge_types::ToolInvocation;
use uuid::Uuid;

const SUPPORTED_ENVIRONMENTS: [&str; 3] = ["development", "production", "test"];

#[derive(Parser, Debug)]
#[command(name = "uiforge-engine")]
#[command(about = "UIForge authentication and project backend")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    Serve {
        #[arg(long, alias = "host", default_value = DEFAULT_SERVER_HOST)]
        hostname: String,
        #[arg(long, default_value_t = DEFAULT_SERVER_PORT)]
        port: u16,
        #[arg(long)]
        state_dir: Option<String>,
        #[arg(long)]
        config: Option<String>,
        #[arg(long, env = "UIFORGE_JWT_SECRET", hide_env_values = true)]
        jwt_secret: Option<String>,
        #[arg(long)]
        environment: Option<String>,
    },
    /// Print the generation system prompt.
    Prompt {
        #[arg(long)]
        state_dir: Option<String>,
        #[arg(long)]
        config: Option<String>,
    },
    /// Render a tool invocation the way the chat view shows it.
    DescribeTool {
        /// Inline JSON, `@path` to read a file, or `-` for stdin.
        #[arg(long)]
        json: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Serve {
            hostname,
            port,
            state_dir,
            config,
            jwt_secret,
            environment,
        } => {
            let overrides = build_cli_overrides(jwt_secret, environment)?;
            let state_dir = resolve_state_dir(state_dir);
            let config_path = resolve_config_path(&state_dir, config);
            let config = ConfigStore::new(&config_path, overrides)
                .await
                .with_context(|| format!("failed to load config {}", config_path.display()))?;
            let app_config = config.get().await;

            let logs_dir = logs_dir_from_state_dir(&state_dir);
            let (_log_guard, log_info) = init_process_logging(
                ProcessKind::Server,
                &logs_dir,
                app_config.log_retention_days,
            )?;
            emit_event(
                tracing::Level::INFO,
                ProcessKind::Server,
                ObservabilityEvent {
                    event: "logging.initialized",
                    component: "engine.main",
                    status: Some("ok"),
                    detail: Some("server jsonl logging initialized"),
                    ..Default::default()
                },
            );
            info!("server logging initialized: {:?}", log_info);

            let startup_attempt_id = Uuid::new_v4().to_string();
            let addr: SocketAddr = format!("{hostname}:{port}")
                .parse()
                .context("invalid hostname or port")?;
            log_startup_paths(&state_dir, &config_path, &addr, &startup_attempt_id);

            let state = match AppState::new(&state_dir, config).await {
                Ok(state) => state,
                Err(err) => {
                    let detail = format!("attempt_id={startup_attempt_id} error={err:#}");
                    emit_event(
                        tracing::Level::ERROR,
                        ProcessKind::Server,
                        ObservabilityEvent {
                            event: "server.startup.failed",
                            component: "engine.main",
                            correlation_id: Some(&startup_attempt_id),
                            status: Some("failed"),
                            error_code: Some("SERVER_STARTUP_FAILED"),
                            detail: Some(&detail),
                            ..Default::default()
                        },
                    );
                    return Err(err);
                }
            };
            emit_event(
                tracing::Level::INFO,
                ProcessKind::Server,
                ObservabilityEvent {
                    event: "server.startup.ready",
                    component: "engine.main",
                    correlation_id: Some(&startup_attempt_id),
                    status: Some("ok"),
                    ..Default::default()
                },
            );
            serve(addr, state).await?;
        }
        Command::Prompt { state_dir, config } => {
            let state_dir = resolve_state_dir(state_dir);
            let config_path = resolve_config_path(&state_dir, config);
            let config = ConfigStore::new(&config_path, None).await?;
            let app_config = config.get().await;
            let prompt =
                load_generation_prompt(app_config.generation_prompt_path.as_deref()).await?;
            println!("{prompt}");
        }
        Command::DescribeTool { json } => {
            let invocation: ToolInvocation = serde_json::from_value(read_tool_json(&json)?)
                .context("expected a tool invocation with toolName, args and state")?;
            let display = present_tool_invocation(&invocation)
                .context("tool arguments are not valid JSON")?;
            println!("{}", serde_json::to_string_pretty(&display)?);
        }
    }

    Ok(())
}

fn build_cli_overrides(
    jwt_secret: Option<String>,
    environment: Option<String>,
) -> anyhow::Result<Option<serde_json::Value>> {
    let environment = normalize_and_validate_environment(environment)?;
    let jwt_secret = jwt_secret.filter(|secret| !secret.trim().is_empty());

    if jwt_secret.is_none() && environment.is_none() {
        return Ok(None);
    }
    let mut root = serde_json::Map::new();
    if let Some(env) = environment {
        root.insert("environment".to_string(), serde_json::Value::String(env));
    }
    if let Some(secret) = jwt_secret {
        root.insert("jwt_secret".to_string(), serde_json::Value::String(secret));
    }
    Ok(Some(serde_json::Value::Object(root)))
}

fn normalize_and_validate_environment(
    environment: Option<String>,
) -> anyhow::Result<Option<String>> {
    let Some(environment) = environment else {
        return Ok(None);
    };
    let normalized = environment.trim().to_lowercase();
    if SUPPORTED_ENVIRONMENTS.contains(&normalized.as_str()) {
        return Ok(Some(normalized));
    }
    anyhow::bail!(
        "unsupported environment `{}`. supported environments: {}",
        environment,
        SUPPORTED_ENVIRONMENTS.join(", ")
    );
}

fn resolve_state_dir(flag: Option<String>) -> PathBuf {
    if let Some(dir) = flag {
        return PathBuf::from(dir);
    }
    if let Ok(dir) = std::env::var("UIFORGE_STATE_DIR") {
        if !dir.trim().is_empty() {
            return PathBuf::from(dir);
        }
    }
    default_state_dir()
}

fn resolve_config_path(state_dir: &Path, flag: Option<String>) -> PathBuf {
    flag.map(PathBuf::from)
        .unwrap_or_else(|| state_dir.join("config.json"))
}

fn read_tool_json(input: &str) -> anyhow::Result<serde_json::Value> {
    if input.trim() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        return Ok(serde_json::from_str(&buf)?);
    }
    if let Some(path) = input.strip_prefix('@') {
        let raw = fs::read_to_string(path)?;
        return Ok(serde_json::from_str(&raw)?);
    }
    Ok(serde_json::from_str(input)?)
}

fn log_startup_paths(
    state_dir: &Path,
    config_path: &Path,
    addr: &SocketAddr,
    startup_attempt_id: &str,
) {
    let exe = std::env::current_exe().unwrap_or_else(|_| PathBuf::from("<unknown>"));
    let cwd = std::env::current_dir().unwrap_or_else(|_| PathBuf::from("<unknown>"));
    info!("starting uiforge-engine on http://{addr}");
    info!(
        "startup paths: attempt_id={} exe={} cwd={} state_dir={} config_path={}",
        startup_attempt_id,
        exe.display(),
        cwd.display(),
        state_dir.display(),
        config_path.display()
    );
}
