//! Relay - agent orchestration CLI
//!
//! The `relay` command routes orchestrator requests through the core with
//! demo echo handlers registered for every agent.
//!
//! ## Commands
//!
//! - `route`: Route one JSON request (file or stdin) and print the envelope
//! - `serve`: Route newline-delimited JSON requests from stdin
//! - `intents`: Show the intent → agent map
//! - `runs`: List recorded runs for a tenant

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use clap::{Parser, Subcommand, ValueEnum};
use relay_core::{
    execute_tool, AgentFault, AgentHandler, AgentId, AgentRegistry, Bootstrap, BootstrapError,
    IntentResolver, MetricsSink, Orchestrator, OrchestratorConfig, OrchestratorMetrics,
    OrchestratorRequest, OrchestratorResponse, RegistrationMeta,
};
use relay_state::{MemoryStore, OrchestratorStore, RunStore, SurrealStore, TenantId};
use serde_json::json;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{info, Level};

#[derive(Parser)]
#[command(name = "relay")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Relay agent orchestrator", long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    /// Orchestrator config file (JSON); RELAY_* variables still apply on top
    #[arg(long, global = true, env = "RELAY_CONFIG")]
    config: Option<PathBuf>,

    /// Where agent and run records are kept
    #[arg(long, global = true, value_enum, default_value_t = StoreKind::Memory)]
    store: StoreKind,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StoreKind {
    /// In-process store, discarded on exit
    Memory,
    /// SurrealDB (SURREALDB_* / SURREALDB_URL, else .relay/db)
    Surreal,
}

#[derive(Subcommand)]
enum Commands {
    /// Route a single request and print the response envelope
    Route {
        /// Request JSON file, or `-` for stdin
        #[arg(short, long, default_value = "-")]
        request: String,
    },

    /// Read one JSON request per line from stdin, write one envelope per line
    Serve,

    /// Show the intent → agent map
    Intents,

    /// List recorded runs for a tenant (newest first)
    Runs {
        /// Tenant (organization) id
        #[arg(short, long)]
        tenant: String,

        /// Maximum number of runs to show
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
}

/// Demo handler: echoes the request back, timing the render as a tool call.
struct EchoHandler {
    agent: AgentId,
    metrics: Arc<dyn MetricsSink>,
}

#[async_trait]
impl AgentHandler for EchoHandler {
    async fn handle(
        &self,
        request: &OrchestratorRequest,
    ) -> std::result::Result<OrchestratorResponse, AgentFault> {
        let report = execute_tool(self.metrics.as_ref(), "echo.render", async {
            serde_json::to_value(&request.payload)
                .map_err(|e| AgentFault::caused_by("render failed", &e))
        })
        .await;
        let run_id = report.telemetry.run_id.clone();
        let payload = report.into_result()?;

        Ok(OrchestratorResponse::success(json!({
            "agent": self.agent.as_str(),
            "intent": request.intent,
            "echo": payload,
            "runId": run_id,
        })))
    }
}

/// Registers an [`EchoHandler`] for every known agent.
struct EchoBootstrap {
    metrics: Arc<dyn MetricsSink>,
}

#[async_trait]
impl Bootstrap for EchoBootstrap {
    async fn bootstrap(&self, registry: &AgentRegistry) -> std::result::Result<(), BootstrapError> {
        for agent in AgentId::ALL {
            registry.register(
                agent,
                Arc::new(EchoHandler {
                    agent,
                    metrics: self.metrics.clone(),
                }),
                RegistrationMeta::new(env!("CARGO_PKG_VERSION")).with_capability("echo"),
            );
        }
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Setup logging
    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    relay_core::init_tracing(cli.json, level);

    let config = load_config(cli.config.as_deref())?;
    let metrics = Arc::new(OrchestratorMetrics::new());

    let result = match cli.command {
        Commands::Intents => cmd_intents(&IntentResolver::standard(), &mut std::io::stdout()),
        Commands::Runs { tenant, limit } => {
            let store = open_store(cli.store).await?;
            cmd_runs(store.as_ref(), &tenant, limit, &mut std::io::stdout()).await
        }
        Commands::Route { request } => {
            let store = open_store(cli.store).await?;
            let orchestrator = build_orchestrator(config, store, metrics.clone());
            let raw = read_request(&request)?;
            cmd_route(&orchestrator, &raw, &mut std::io::stdout()).await
        }
        Commands::Serve => {
            let store = open_store(cli.store).await?;
            let orchestrator = build_orchestrator(config, store, metrics.clone());
            let stdin = BufReader::new(tokio::io::stdin());
            cmd_serve(&orchestrator, stdin, &mut std::io::stdout()).await
        }
    };

    metrics.flush();
    result
}

fn load_config(path: Option<&Path>) -> Result<OrchestratorConfig> {
    let mut config = match path {
        Some(path) => OrchestratorConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    config
        .apply_env_with(|key| std::env::var(key).ok())
        .context("Invalid RELAY_* environment override")?;
    Ok(config)
}

async fn open_store(kind: StoreKind) -> Result<Arc<dyn OrchestratorStore>> {
    match kind {
        StoreKind::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreKind::Surreal => {
            let store = SurrealStore::from_env()
                .await
                .context("Failed to connect to Relay database")?;
            Ok(Arc::new(store))
        }
    }
}

fn build_orchestrator(
    config: OrchestratorConfig,
    store: Arc<dyn OrchestratorStore>,
    metrics: Arc<OrchestratorMetrics>,
) -> Orchestrator {
    Orchestrator::builder()
        .config(config)
        .store(store)
        .metrics(metrics.clone())
        .bootstrap(Arc::new(EchoBootstrap { metrics }))
        .build()
}

fn read_request(source: &str) -> Result<String> {
    if source == "-" {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("Failed to read request from stdin")?;
        Ok(raw)
    } else {
        std::fs::read_to_string(source).with_context(|| format!("Failed to read {source}"))
    }
}

async fn cmd_route(orchestrator: &Orchestrator, raw: &str, out: &mut impl Write) -> Result<()> {
    let request: OrchestratorRequest =
        serde_json::from_str(raw).context("Request is not a valid orchestrator request")?;
    let envelope = orchestrator.route_envelope(&request).await;
    info!(status = envelope.http_status(), success = envelope.success, "request routed");
    writeln!(out, "{}", serde_json::to_string_pretty(&envelope)?)?;
    Ok(())
}

async fn cmd_serve<R>(orchestrator: &Orchestrator, input: R, out: &mut impl Write) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = input.lines();
    let mut served = 0usize;
    while let Some(line) = lines.next_line().await.context("Failed to read stdin")? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let response = match serde_json::from_str::<OrchestratorRequest>(line) {
            Ok(request) => orchestrator.route_envelope(&request).await,
            Err(e) => OrchestratorResponse::failure(
                relay_core::ErrorCode::ValidationFailed,
                format!("invalid request: {e}"),
            )
            .into_envelope(),
        };
        writeln!(out, "{}", serde_json::to_string(&response)?)?;
        out.flush()?;
        served += 1;
    }
    info!(served, "input closed");
    Ok(())
}

fn cmd_intents(resolver: &IntentResolver, out: &mut impl Write) -> Result<()> {
    for (intent, agent) in resolver.mappings() {
        writeln!(out, "{intent:<20} {agent}")?;
    }
    Ok(())
}

async fn cmd_runs(
    store: &dyn OrchestratorStore,
    tenant: &str,
    limit: usize,
    out: &mut impl Write,
) -> Result<()> {
    let tenant = TenantId::parse(tenant).context("Invalid tenant id")?;
    let runs = store
        .list_runs(&tenant, None)
        .await
        .context("Failed to list runs")?;

    if runs.is_empty() {
        writeln!(out, "No runs found for tenant '{tenant}'")?;
        return Ok(());
    }
    for run in runs.into_iter().take(limit) {
        writeln!(
            out,
            "{}  {:<8} {}  agent={}",
            run.run_id,
            run.status.as_str(),
            run.started_at.format("%Y-%m-%d %H:%M:%S"),
            run.agent_id,
        )?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::ResponseEnvelope;

    fn orchestrator(store: Arc<dyn OrchestratorStore>) -> Orchestrator {
        build_orchestrator(
            OrchestratorConfig::default(),
            store,
            Arc::new(OrchestratorMetrics::new()),
        )
    }

    #[tokio::test]
    async fn test_route_prints_completed_envelope() {
        let orchestrator = orchestrator(Arc::new(MemoryStore::new()));
        let raw = r#"{"intent":"summarize","payload":{"text":"long"},"context":{"userId":"u1","organizationId":"org1"}}"#;
        let mut out = Vec::new();
        cmd_route(&orchestrator, raw, &mut out).await.unwrap();

        let envelope: ResponseEnvelope = serde_json::from_slice(&out).unwrap();
        assert!(envelope.success);
        assert_eq!(envelope.agent.as_deref(), Some("ContentAgent"));
        let data = envelope.data.unwrap();
        assert_eq!(data["echo"], json!({ "text": "long" }));
        assert_eq!(data["runId"].as_str(), envelope.run_id.as_deref());
    }

    #[tokio::test]
    async fn test_route_rejects_malformed_json() {
        let orchestrator = orchestrator(Arc::new(MemoryStore::new()));
        let mut out = Vec::new();
        assert!(cmd_route(&orchestrator, "{not json", &mut out).await.is_err());
        assert!(out.is_empty());
    }

    #[tokio::test]
    async fn test_serve_writes_one_envelope_per_line() {
        let orchestrator = orchestrator(Arc::new(MemoryStore::new()));
        let input = concat!(
            r#"{"intent":"seo-audit","context":{"userId":"u1"}}"#,
            "\n\n",
            "garbage\n",
            r#"{"intent":"plan-launch","context":{"userId":"u1"}}"#,
            "\n",
        );
        let mut out = Vec::new();
        cmd_serve(&orchestrator, input.as_bytes(), &mut out).await.unwrap();

        let envelopes: Vec<ResponseEnvelope> = String::from_utf8(out)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(envelopes.len(), 3);
        assert!(envelopes[0].success);
        assert_eq!(envelopes[1].error.as_ref().unwrap().code.as_str(), "VALIDATION_FAILED");
        assert_eq!(envelopes[2].error.as_ref().unwrap().code.as_str(), "AGENT_REQUIRED");
    }

    #[test]
    fn test_intents_lists_standard_map() {
        let mut out = Vec::new();
        cmd_intents(&IntentResolver::standard(), &mut out).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert!(text
            .lines()
            .any(|l| l.starts_with("generate-draft") && l.ends_with("ContentAgent")));
        assert_eq!(text.lines().count(), relay_core::STANDARD_INTENTS.len());
    }

    #[tokio::test]
    async fn test_runs_lists_tenant_runs() {
        let store: Arc<dyn OrchestratorStore> = Arc::new(MemoryStore::new());
        let orchestrator = orchestrator(store.clone());
        let request = OrchestratorRequest::new("triage")
            .with_user("u1")
            .with_organization("org-cli");
        orchestrator.route(&request).await;
        orchestrator.route(&request).await;

        let mut out = Vec::new();
        cmd_runs(store.as_ref(), "org-cli", 1, &mut out).await.unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 1);
        assert!(text.contains("success"));

        let mut out = Vec::new();
        cmd_runs(store.as_ref(), "org-empty", 10, &mut out).await.unwrap();
        assert!(String::from_utf8(out).unwrap().contains("No runs found"));
    }

    #[test]
    fn test_config_defaults_without_file() {
        let config = load_config(None).unwrap();
        assert!(config.validate().is_ok());
    }
}
