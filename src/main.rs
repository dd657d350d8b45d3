//! Coordination Analysis Engine service binary
//!
//! Runs one analysis over a batch file and prints the result as JSON:
//!
//! ```text
//! coordination-engine <batch.json> [minimal|standard|deep|forensic]
//! ```
//!
//! The batch file holds either a bare array of attack sessions or an object
//! `{"attack_sessions": [...], "analysis_depth": "...", "callback_url": "..."}`.
//! Enrichment tools are registered for every collaborator URL present in
//! the environment; in-flight sessions left behind by a previous process
//! are resumed before the new batch runs.

use anyhow::Context;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use coordination_engine::tools::clients::HttpToolClient;
use coordination_engine::{
    AnalysisDepth, AnalysisEngine, AttackSession, EngineConfig, FileStateStore, ToolKind,
};

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum BatchFile {
    Bare(Vec<AttackSession>),
    Wrapped {
        attack_sessions: Vec<AttackSession>,
        #[serde(default)]
        analysis_depth: Option<AnalysisDepth>,
        #[serde(default)]
        callback_url: Option<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coordination_engine=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    dotenvy::dotenv().ok();
    let config = EngineConfig::from_env();

    let mut args = std::env::args().skip(1);
    let batch_path = args
        .next()
        .context("usage: coordination-engine <batch.json> [depth]")?;
    let depth_arg: Option<AnalysisDepth> = match args.next() {
        Some(raw) => Some(raw.parse().map_err(|e| anyhow::anyhow!("{}", e))?),
        None => None,
    };

    let (attack_sessions, file_depth, callback_url) = load_batch(Path::new(&batch_path))?;
    let depth = depth_arg.or(file_depth).unwrap_or_default();

    let state_dir = std::env::var("STATE_DIR").unwrap_or_else(|_| "./state".to_string());
    let store = Arc::new(
        FileStateStore::new(Path::new(&state_dir))
            .map_err(|e| anyhow::anyhow!("cannot open state store: {}", e))?,
    );

    let mut engine = AnalysisEngine::new(config.clone(), store);
    register_tools(&mut engine, &config);
    if config.inference_enabled {
        engine.enable_inference();
    }
    let engine = Arc::new(engine);

    let resumed = engine
        .clone()
        .recover()
        .map_err(|e| anyhow::anyhow!("recovery scan failed: {}", e))?;
    if !resumed.is_empty() {
        tracing::info!(count = resumed.len(), "resumed in-flight sessions");
    }

    tracing::info!(
        sessions = attack_sessions.len(),
        depth = depth.as_str(),
        "starting coordination analysis"
    );

    let (session_id, result) = engine
        .analyze(attack_sessions, depth, callback_url)
        .await
        .map_err(|e| anyhow::anyhow!("analysis failed ({}): {}", e.kind(), e))?;

    let record = engine
        .status(session_id)
        .map_err(|e| anyhow::anyhow!("status read failed: {}", e))?;
    let output = serde_json::json!({
        "analysis_id": session_id,
        "status": record.session.status,
        "result": result,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);

    Ok(())
}

fn load_batch(
    path: &Path,
) -> anyhow::Result<(Vec<AttackSession>, Option<AnalysisDepth>, Option<String>)> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("cannot read batch file {}", path.display()))?;
    let batch: BatchFile = serde_json::from_str(&content)
        .with_context(|| format!("cannot parse batch file {}", path.display()))?;

    Ok(match batch {
        BatchFile::Bare(sessions) => (sessions, None, None),
        BatchFile::Wrapped {
            attack_sessions,
            analysis_depth,
            callback_url,
        } => (attack_sessions, analysis_depth, callback_url),
    })
}

fn register_tools(engine: &mut AnalysisEngine, config: &EngineConfig) {
    let timeout = config.tool_call_timeout();
    let services = [
        (ToolKind::Asn, config.asn_service_url.as_ref()),
        (ToolKind::Geolocation, config.geo_service_url.as_ref()),
        (ToolKind::ThreatIntel, config.threat_intel_service_url.as_ref()),
    ];

    for (kind, url) in services {
        match url {
            Some(url) => {
                tracing::info!(tool = %kind, %url, "enrichment tool registered");
                engine.register_tool(Arc::new(HttpToolClient::new(kind, url, timeout)));
            }
            None => {
                tracing::warn!(tool = %kind, "no service URL configured, tool disabled");
            }
        }
    }
}
