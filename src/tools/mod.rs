//! Tool coordination
//!
//! Fans out to external enrichment collaborators (BGP/ASN, geolocation,
//! threat intel) concurrently. Every call runs under its own timeout and the
//! whole fan-out under an aggregate deadline; a hung collaborator can never
//! stall an analysis past that deadline. Failures become evidence gaps, not
//! errors: the coordinator always returns a report.

pub mod clients;
pub mod types;

use std::collections::BTreeSet;
use std::future::Future;
use std::net::IpAddr;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinSet;

use crate::config::EngineConfig;
pub use types::{ToolData, ToolError, ToolFanoutReport, ToolKind};

pub type LookupFuture<'a> = Pin<Box<dyn Future<Output = Result<ToolData, ToolError>> + Send + 'a>>;

/// One external enrichment source. Implementations must be cancel-safe:
/// the coordinator aborts outstanding lookups when the aggregate deadline
/// passes or the session is cancelled.
pub trait ToolLookup: Send + Sync {
    fn kind(&self) -> ToolKind;
    fn lookup(&self, indicators: Vec<IpAddr>) -> LookupFuture<'_>;
}

pub struct ToolCoordinator {
    tools: Vec<Arc<dyn ToolLookup>>,
    call_timeout: Duration,
    fanout_timeout: Duration,
    retry_attempts: u32,
    retry_backoff: Duration,
}

impl ToolCoordinator {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            tools: Vec::new(),
            call_timeout: config.tool_call_timeout(),
            fanout_timeout: config.tool_fanout_timeout(),
            retry_attempts: config.tool_retry_attempts,
            retry_backoff: Duration::from_millis(config.tool_retry_backoff_ms),
        }
    }

    pub fn register(&mut self, tool: Arc<dyn ToolLookup>) {
        self.tools.push(tool);
    }

    fn find(&self, kind: ToolKind) -> Option<Arc<dyn ToolLookup>> {
        self.tools.iter().find(|t| t.kind() == kind).cloned()
    }

    /// Run every required lookup concurrently and merge what came back in
    /// time. Tools that errored, timed out, or have no registered client
    /// are recorded as unavailable.
    pub async fn run(
        &self,
        required: &[ToolKind],
        indicators: &BTreeSet<IpAddr>,
    ) -> ToolFanoutReport {
        let mut report = ToolFanoutReport::default();
        if required.is_empty() {
            return report;
        }

        let indicators: Vec<IpAddr> = indicators.iter().copied().collect();
        let mut set: JoinSet<(ToolKind, Result<ToolData, ToolError>)> = JoinSet::new();
        let mut pending: BTreeSet<ToolKind> = BTreeSet::new();

        for kind in required {
            let kind = *kind;
            match self.find(kind) {
                Some(tool) => {
                    let ips = indicators.clone();
                    let call_timeout = self.call_timeout;
                    let attempts = self.retry_attempts;
                    let backoff = self.retry_backoff;
                    pending.insert(kind);
                    set.spawn(async move {
                        let result =
                            call_with_retry(tool, ips, call_timeout, attempts, backoff).await;
                        (kind, result)
                    });
                }
                None => {
                    tracing::warn!(tool = %kind, "no client registered for required tool");
                    report.mark_unavailable(kind);
                }
            }
        }

        let deadline = tokio::time::Instant::now() + self.fanout_timeout;
        loop {
            match tokio::time::timeout_at(deadline, set.join_next()).await {
                Ok(Some(Ok((kind, Ok(data))))) => {
                    pending.remove(&kind);
                    tracing::debug!(tool = %kind, "enrichment lookup completed");
                    report.merge(data);
                }
                Ok(Some(Ok((kind, Err(err))))) => {
                    pending.remove(&kind);
                    tracing::warn!(tool = %kind, error = %err, "enrichment lookup unavailable");
                    report.mark_unavailable(kind);
                }
                Ok(Some(Err(join_err))) => {
                    tracing::error!(error = %join_err, "enrichment task aborted");
                }
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!(
                        timeout = ?self.fanout_timeout,
                        "aggregate enrichment deadline reached, cancelling pending lookups"
                    );
                    set.abort_all();
                    break;
                }
            }
        }
        // Anything still pending was cancelled or crashed
        for kind in pending {
            report.mark_unavailable(kind);
        }

        report
    }
}

/// One lookup with per-attempt timeout and exponential backoff on transient
/// failures. Retry policy for enrichment lives here, not in the
/// orchestrator.
async fn call_with_retry(
    tool: Arc<dyn ToolLookup>,
    indicators: Vec<IpAddr>,
    call_timeout: Duration,
    retry_attempts: u32,
    backoff: Duration,
) -> Result<ToolData, ToolError> {
    let mut attempt = 0u32;
    loop {
        let result = match tokio::time::timeout(call_timeout, tool.lookup(indicators.clone())).await
        {
            Ok(res) => res,
            Err(_) => Err(ToolError::Timeout(call_timeout)),
        };

        match result {
            Ok(data) => return Ok(data),
            Err(err) if err.is_transient() && attempt < retry_attempts => {
                tracing::debug!(
                    tool = %tool.kind(),
                    attempt = attempt + 1,
                    error = %err,
                    "transient lookup failure, backing off"
                );
                tokio::time::sleep(backoff * 2u32.pow(attempt)).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
