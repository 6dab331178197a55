use anyhow::Context;
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

mod fixtures;

use callgate_controller::{Controller, ReconcileCoordinator};
use callgate_core::{
    InMemoryEventRecorder, InMemoryStore, ObjectKey, ResourceStore, ToolTarget,
    TracingEventRecorder,
};
use callgate_http::{AppState, RuntimeConfigBuilder, cancel_on_signal, router, serve};
use callgate_observability::init_observability;
use fixtures::Fixtures;
use serde_json::json;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "callgate", version)]
#[command(about = "Callgate - reconciling controller for agent tool calls")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run the controller and the approval callback server
    Serve {
        /// YAML fixtures to seed the in-memory store with
        #[arg(long)]
        fixtures: Option<PathBuf>,
        /// Listen address (overrides CALLGATE_BIND_ADDR)
        #[arg(long)]
        bind: Option<SocketAddr>,
    },
    /// Run reconcile passes for one tool call and print its status
    Reconcile {
        /// YAML fixtures to seed the in-memory store with
        #[arg(long)]
        fixtures: PathBuf,
        /// Tool call name
        #[arg(long)]
        name: String,
        #[arg(long, default_value = "default")]
        namespace: String,
        /// Number of passes to run
        #[arg(long, default_value_t = 2)]
        passes: u32,
    },
    /// Show how a tool name is qualified
    ParseToolName {
        name: String,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { fixtures, bind } => run_serve(fixtures, bind).await,
        Commands::Reconcile {
            fixtures,
            name,
            namespace,
            passes,
        } => {
            init_cli_logging();
            run_reconcile(fixtures, ObjectKey::new(namespace, name), passes).await
        }
        Commands::ParseToolName { name } => {
            print_json(&parse_tool_name(&name))?;
            Ok(())
        }
    }
}

// One-shot commands print JSON on stdout; keep logs on stderr.
fn init_cli_logging() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .try_init();
}

async fn run_serve(fixtures: Option<PathBuf>, bind: Option<SocketAddr>) -> anyhow::Result<()> {
    let mut builder = RuntimeConfigBuilder::from_env()?;
    if let Some(bind) = bind {
        builder = builder.bind_addr(bind);
    }
    let config = builder.build()?;
    let telemetry = init_observability(&config.observability())?;

    let fixtures = match fixtures {
        Some(path) => Fixtures::load(&path)?,
        None => Fixtures::default(),
    };
    let store = InMemoryStore::new();
    fixtures.seed(&store);

    let mut coordinator =
        ReconcileCoordinator::builder(Arc::new(store.clone()), Arc::new(TracingEventRecorder))
            .trace(telemetry.trace_continuity())
            .metrics(telemetry.metrics())
            .remote_call_timeout(config.remote_call_timeout);
    if let Some(manager) = fixtures.capability_manager() {
        coordinator = coordinator.remote_capabilities(Arc::new(manager));
    }
    if let Some(api) = fixtures.external_api() {
        coordinator = coordinator.external_api(Arc::new(api));
    }
    let coordinator = coordinator.build();

    let state = AppState::new(coordinator.callback_service(config.callback_namespace.clone()))
        .with_metrics(telemetry.metrics());
    let app = router(state, &config);

    let shutdown = CancellationToken::new();
    let signals = cancel_on_signal(shutdown.clone());

    let controller = Controller::new(coordinator, config.controller());
    let controller_task = tokio::spawn(controller.run(
        store.watch(),
        store.tool_call_keys(),
        shutdown.clone(),
    ));

    let served = serve(app, config.bind_addr, shutdown.clone()).await;
    shutdown.cancel();

    if let Err(e) = controller_task.await {
        tracing::error!(error = %e, "Controller task failed");
    }
    signals.abort();
    telemetry.shutdown();

    served.with_context(|| format!("callback server on {} failed", config.bind_addr))
}

async fn run_reconcile(fixtures: PathBuf, key: ObjectKey, passes: u32) -> anyhow::Result<()> {
    let fixtures = Fixtures::load(&fixtures)?;
    let store = InMemoryStore::new();
    fixtures.seed(&store);

    let events = InMemoryEventRecorder::new();
    let mut coordinator =
        ReconcileCoordinator::builder(Arc::new(store.clone()), Arc::new(events.clone()));
    if let Some(manager) = fixtures.capability_manager() {
        coordinator = coordinator.remote_capabilities(Arc::new(manager));
    }
    if let Some(api) = fixtures.external_api() {
        coordinator = coordinator.external_api(Arc::new(api));
    }
    let coordinator = coordinator.build();

    let mut outcomes = Vec::new();
    for pass in 1..=passes {
        match coordinator.reconcile(&key).await {
            Ok(outcome) => outcomes.push(json!({ "pass": pass, "outcome": outcome.label() })),
            Err(err) => outcomes.push(json!({
                "pass": pass,
                "error": err.to_string(),
                "retryable": err.is_retryable(),
            })),
        }
    }

    let request = store
        .get_tool_call(&key)
        .await?
        .with_context(|| format!("tool call {key} not found in fixtures"))?;

    let events: Vec<_> = events
        .events_for(&key)
        .into_iter()
        .map(|event| {
            json!({
                "type": event.event_type.to_string(),
                "reason": event.reason,
                "message": event.message,
            })
        })
        .collect();

    print_json(&json!({
        "name": key.name(),
        "namespace": key.namespace(),
        "passes": outcomes,
        "status": request.status,
        "events": events,
    }))
}

fn parse_tool_name(name: &str) -> serde_json::Value {
    match ToolTarget::parse(name) {
        ToolTarget::Remote { server, tool } => json!({
            "name": name,
            "isRemote": true,
            "server": server,
            "tool": tool,
        }),
        ToolTarget::Local(tool) => json!({
            "name": name,
            "isRemote": false,
            "tool": tool,
        }),
    }
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
