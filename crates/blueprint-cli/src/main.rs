//! Blueprint CLI binary.
//!
//! Loads a blueprint file, wires the built-in integrations and runs it locally.

mod credentials;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use blueprint_engine::blueprint::TriggerType;
use blueprint_engine::{
    create_default_registry, parse_blueprint_file, Blueprint, BlueprintEngine, EngineConfig,
    HttpAgentCaller, JsonFileSink, TriggerContext,
};

#[derive(Parser)]
#[command(name = "blueprint")]
#[command(version, about = "Blueprint automation runner", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a blueprint file
    ///
    /// Examples:
    ///     blueprint run ./notify.yaml
    ///     blueprint run ./notify.yaml --set channel=ops --payload '{"issue": 42}'
    ///     blueprint run ./notify.yaml --credentials creds.yaml --out runs/ --json
    #[command(verbatim_doc_comment)]
    Run {
        /// Path to the blueprint (YAML or JSON)
        #[arg(value_name = "FILE")]
        file: PathBuf,

        /// Automation id used for credential lookup and persistence
        #[arg(long, default_value = "local")]
        automation_id: String,

        /// Set variables (format: key=value), can be repeated
        #[arg(long = "set", value_name = "KEY=VALUE")]
        variables: Vec<String>,

        /// Trigger payload as JSON string
        #[arg(long, value_name = "JSON")]
        payload: Option<String>,

        /// Trigger type: manual, webhook, scheduled, platform
        #[arg(long, default_value = "manual")]
        trigger_type: String,

        /// Who fired the trigger
        #[arg(long, env = "USER", default_value = "cli")]
        triggered_by: String,

        /// Credentials file (YAML or JSON list)
        #[arg(long, env = "BLUEPRINT_CREDENTIALS_FILE")]
        credentials: Option<PathBuf>,

        /// Base URL of the agent service for ai_agent_call steps
        #[arg(long, env = "BLUEPRINT_AGENT_URL")]
        agent_url: Option<String>,

        /// Directory receiving the run result as JSON
        #[arg(long, value_name = "DIR")]
        out: Option<PathBuf>,

        /// Print the run result as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Parse and validate a blueprint without running it
    Validate {
        #[arg(value_name = "FILE")]
        file: PathBuf,
    },
}

struct RunArgs {
    file: PathBuf,
    automation_id: String,
    variables: Vec<String>,
    payload: Option<String>,
    trigger_type: String,
    triggered_by: String,
    credentials: Option<PathBuf>,
    agent_url: Option<String>,
    out: Option<PathBuf>,
    json: bool,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Run {
            file,
            automation_id,
            variables,
            payload,
            trigger_type,
            triggered_by,
            credentials,
            agent_url,
            out,
            json,
        } => {
            run(RunArgs {
                file,
                automation_id,
                variables,
                payload,
                trigger_type,
                triggered_by,
                credentials,
                agent_url,
                out,
                json,
            })
            .await
        }
        Commands::Validate { file } => validate(file),
    }
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,blueprint_engine=debug,blueprint_cli=debug".into());

    tracing_subscriber::registry()
        .with(filter)
        .with(json.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(std::io::stderr)
        }))
        .with((!json).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();
}

async fn run(args: RunArgs) -> Result<ExitCode> {
    let mut blueprint = parse_blueprint_file(&args.file)
        .with_context(|| format!("Failed to load blueprint {}", args.file.display()))?;
    apply_variables(&mut blueprint, &args.variables)?;

    let payload = args
        .payload
        .as_deref()
        .map(serde_json::from_str::<serde_json::Value>)
        .transpose()
        .context("Invalid --payload JSON")?
        .unwrap_or(serde_json::Value::Null);
    let trigger = TriggerContext::new(parse_trigger_type(&args.trigger_type)?, args.triggered_by)
        .with_payload(payload);

    let config = EngineConfig::from_env().context("Invalid BLUEPRINT_* configuration")?;
    tracing::info!(
        action_timeout_secs = config.action_timeout_secs,
        retry_max_retries = config.retry_max_retries,
        "Engine configuration loaded"
    );

    let resolver = credentials::load(args.credentials.as_deref())?;
    let mut engine = BlueprintEngine::new(
        config,
        Arc::new(resolver),
        Arc::new(create_default_registry()),
    );
    if let Some(url) = args.agent_url {
        engine = engine.with_agent_caller(Arc::new(HttpAgentCaller::new(url)));
    }
    if let Some(dir) = args.out {
        engine = engine.with_sink(Arc::new(JsonFileSink::new(dir)));
    }

    let cancel = CancellationToken::new();
    let watcher = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::warn!("Interrupt received, cancelling run");
                cancel.cancel();
            }
        })
    };

    let result = engine
        .execute_with_cancellation(&args.automation_id, &blueprint, trigger, cancel)
        .await?;
    watcher.abort();

    output::print_run(&result, args.json)?;
    Ok(if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(1)
    })
}

fn validate(file: PathBuf) -> Result<ExitCode> {
    let blueprint = parse_blueprint_file(&file)
        .with_context(|| format!("Invalid blueprint {}", file.display()))?;
    println!(
        "{}: valid ({} steps, trigger {})",
        file.display(),
        blueprint.step_count(),
        blueprint.trigger.trigger_type
    );
    Ok(ExitCode::SUCCESS)
}

/// Apply `--set key=value` overrides. Values that parse as JSON keep their type.
fn apply_variables(blueprint: &mut Blueprint, variables: &[String]) -> Result<()> {
    for var in variables {
        let (key, value) = var
            .split_once('=')
            .ok_or_else(|| anyhow::anyhow!("Invalid variable format: {}. Expected key=value", var))?;
        let value = serde_json::from_str(value)
            .unwrap_or_else(|_| serde_json::Value::String(value.to_string()));
        blueprint.variables.insert(key.to_string(), value);
    }
    Ok(())
}

fn parse_trigger_type(value: &str) -> Result<TriggerType> {
    serde_json::from_value(serde_json::Value::String(value.to_ascii_lowercase()))
        .with_context(|| format!("Unknown trigger type: {}", value))
}
