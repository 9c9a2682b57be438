use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use hostlink_api::BridgeClient;
use hostlink_bridge::{BridgeHttpServer, ExecutionBridge, HostChannel, HostThread, OperationRegistry, register_diagnostics, resolve_bind_address};
use hostlink_engine::{BridgeOperationTool, ToolRegistry, WorkflowExecutor, parse_plan_file, preview_plan};
use hostlink_types::{FinalStatus, Settings, WorkflowPlan};
use serde_json::{Map, Value, json};
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Bridge external automation requests onto a single-threaded host.
#[derive(Parser, Debug)]
#[command(name = "hostlink", version, about)]
struct Cli {
    /// Settings file (default: $HOSTLINK_CONFIG_PATH or the user config dir)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Bridge base URL for client commands
    #[arg(long, global = true)]
    url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the bridge, a host thread with the diagnostic operations, and the HTTP front
    Serve {
        /// Loopback address to listen on
        #[arg(long)]
        bind: Option<String>,

        /// Seconds a finished result stays readable
        #[arg(long)]
        retention: Option<u64>,
    },

    /// Submit an operation
    Trigger {
        operation: String,

        /// Operation parameters as a JSON object
        #[arg(long)]
        params: Option<String>,

        /// Poll until the operation finishes
        #[arg(long)]
        wait: bool,

        /// Seconds to wait with --wait
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show the current result for an event id
    Status { event_id: String },

    /// Run or inspect workflow plans
    Workflow {
        #[command(subcommand)]
        command: WorkflowCommands,
    },
}

#[derive(Subcommand, Debug)]
enum WorkflowCommands {
    /// Execute a plan and print the report
    Run {
        /// Path to a YAML or JSON plan
        #[arg(long, short = 'f')]
        file: PathBuf,

        /// Seconds each step may wait for the host
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Show which tools and placeholders a plan uses without running it
    Preview {
        #[arg(long, short = 'f')]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let mut settings = match &cli.config {
        Some(path) => hostlink_util::load_settings_from_path(path)?,
        None => hostlink_util::load_settings()?,
    };
    if let Some(url) = &cli.url {
        settings.poller.base_url = url.clone();
    }

    match cli.command {
        Commands::Serve { bind, retention } => {
            if let Some(bind) = bind {
                settings.bridge.bind_address = bind;
            }
            if let Some(retention) = retention {
                settings.bridge.retention_secs = retention;
            }
            serve(&settings).await
        }
        Commands::Trigger {
            operation,
            params,
            wait,
            timeout,
        } => {
            let params = parse_params(params.as_deref())?;
            let client = BridgeClient::from_settings(&settings.poller)?;
            let event_id = client.trigger(&operation, params).await?;
            if !wait {
                print_json(&json!({ "status": "processing", "event_id": event_id }))?;
                return Ok(());
            }
            let timeout = Duration::from_secs(timeout.unwrap_or(settings.poller.timeout_secs));
            let result = client.await_result(&event_id, timeout).await?;
            print_json(&result)
        }
        Commands::Status { event_id } => {
            let client = BridgeClient::from_settings(&settings.poller)?;
            let result = client.status(&event_id).await?;
            print_json(&serde_json::to_value(&result)?)
        }
        Commands::Workflow { command } => run_workflow_cmd(&settings, command).await,
    }
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_filter())
        .with_writer(std::io::stderr)
        .try_init();
}

/// Log filter from `RUST_LOG`, `info` when unset.
fn tracing_filter() -> EnvFilter {
    let directives = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".into());
    EnvFilter::new(directives)
}

async fn serve(settings: &Settings) -> Result<()> {
    let bind_address = resolve_bind_address(Some(&settings.bridge.bind_address))?;
    let channel = HostChannel::new();
    let bridge = Arc::new(ExecutionBridge::new(Arc::new(channel.signal())).with_retention(Duration::from_secs(settings.bridge.retention_secs)));

    let mut registry = OperationRegistry::<()>::new();
    register_diagnostics(&mut registry);
    info!(operations = ?registry.names(), "registered host operations");
    let host = HostThread::spawn(Arc::clone(&bridge), channel, registry, || ())?;

    let server = BridgeHttpServer::new(bind_address, Arc::clone(&bridge)).start().await?;
    info!(retention_secs = bridge.retention().as_secs(), "bridge ready");
    println!("hostlink bridge listening on {}", server.base_url());

    tokio::signal::ctrl_c().await.context("wait for ctrl-c")?;
    info!("shutting down");
    server.stop().await?;
    host.shutdown()?;
    Ok(())
}

async fn run_workflow_cmd(settings: &Settings, command: WorkflowCommands) -> Result<()> {
    match command {
        WorkflowCommands::Preview { file } => {
            let plan = parse_plan_file(&file)?;
            let client = BridgeClient::from_settings(&settings.poller)?;
            let tools = build_tool_registry(settings, &plan, &client, Duration::from_secs(settings.poller.timeout_secs));
            let previews = preview_plan(&plan, &tools);
            print_json(&json!({
                "user_request": plan.user_request,
                "steps": previews,
            }))
        }
        WorkflowCommands::Run { file, timeout } => {
            let plan = parse_plan_file(&file)?;
            let client = BridgeClient::from_settings(&settings.poller)?;
            let timeout = Duration::from_secs(timeout.unwrap_or(settings.poller.timeout_secs));
            let tools = build_tool_registry(settings, &plan, &client, timeout);
            let report = WorkflowExecutor::new(Arc::new(tools)).execute(&plan).await;
            print_json(&serde_json::to_value(&report)?)?;
            match report.final_status {
                FinalStatus::Success | FinalStatus::Partial => Ok(()),
                FinalStatus::Failed | FinalStatus::Error => Err(anyhow!("{}", report.summary)),
            }
        }
    }
}

/// Configured bindings when present; otherwise each tool in the plan forwards to the
/// host operation of the same name.
fn build_tool_registry(settings: &Settings, plan: &WorkflowPlan, client: &BridgeClient, timeout: Duration) -> ToolRegistry {
    let mut tools = ToolRegistry::new();
    if settings.tools.is_empty() {
        for step in &plan.execution_plan {
            if !step.tool.is_empty() && !tools.contains(&step.tool) {
                tools.register(BridgeOperationTool::new(&step.tool, &step.tool, client.clone(), timeout));
            }
        }
    } else {
        for binding in &settings.tools {
            tools.register(BridgeOperationTool::from_binding(binding, client.clone(), timeout));
        }
    }
    tools
}

fn parse_params(raw: Option<&str>) -> Result<Map<String, Value>> {
    let Some(raw) = raw else {
        return Ok(Map::new());
    };
    match serde_json::from_str::<Value>(raw).context("--params is not valid JSON")? {
        Value::Object(params) => Ok(params),
        _ => Err(anyhow!("--params must be a JSON object")),
    }
}

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use hostlink_types::{ToolBinding, WorkflowStep};

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_nested_workflow_command() {
        let cli = Cli::try_parse_from(["hostlink", "--url", "http://127.0.0.1:9", "workflow", "run", "-f", "plan.yaml"]).unwrap();
        assert_eq!(cli.url.as_deref(), Some("http://127.0.0.1:9"));
        assert!(matches!(cli.command, Commands::Workflow { command: WorkflowCommands::Run { .. } }));
    }

    #[test]
    fn rust_log_controls_the_log_level() {
        use tracing_subscriber::filter::LevelFilter;

        temp_env::with_var("RUST_LOG", Some("debug"), || {
            assert_eq!(tracing_filter().max_level_hint(), Some(LevelFilter::DEBUG));
        });
        temp_env::with_var_unset("RUST_LOG", || {
            assert_eq!(tracing_filter().max_level_hint(), Some(LevelFilter::INFO));
        });
    }

    #[test]
    fn params_must_be_an_object() {
        assert!(parse_params(None).unwrap().is_empty());
        assert_eq!(parse_params(Some(r#"{"millis": 5}"#)).unwrap()["millis"], 5);
        assert!(parse_params(Some("[1]")).is_err());
        assert!(parse_params(Some("{")).is_err());
    }

    #[test]
    fn tools_default_to_same_named_operations() {
        let client = BridgeClient::new("http://127.0.0.1:48884").unwrap();
        let plan = WorkflowPlan {
            user_request: String::new(),
            execution_plan: vec![
                WorkflowStep::new("list_views", Map::new()),
                WorkflowStep::new("list_views", Map::new()),
                WorkflowStep::new("", Map::new()),
            ],
        };

        let implicit = build_tool_registry(&Settings::default(), &plan, &client, Duration::from_secs(1));
        assert_eq!(implicit.names(), vec!["list_views"]);

        let mut settings = Settings::default();
        settings.tools.push(ToolBinding {
            name: "views".into(),
            operation: Some("list_views".into()),
            description: String::new(),
            surfaced_fields: Vec::new(),
        });
        let configured = build_tool_registry(&settings, &plan, &client, Duration::from_secs(1));
        assert_eq!(configured.names(), vec!["views"]);
    }
}
