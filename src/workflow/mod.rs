//! Workflow orchestration
//!
//! The engine's top-level state machine. Each analysis session moves
//! strictly forward through the pipeline, persisting its record on every
//! transition and a cumulative checkpoint after every completed stage, so a
//! restarted process resumes from the next stage instead of starting over.
//!
//! ```text
//! QUEUED -> VALIDATING -> EXTRACTING_EVIDENCE -> COORDINATING_TOOLS
//!        -> SCORING -> (INFERRING) -> COMPLETED
//! ```
//!
//! `FAILED` and `CANCELLED` are reachable from every non-terminal state.
//! Tool problems never fail a session; they become evidence gaps. The only
//! fatal stage errors are validation, insufficient evidence, persistence
//! failures and the overall deadline.

pub mod checkpoint;
pub mod store;

use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult, ErrorDetail};
use crate::evidence::{self, infrastructure, EvidenceFactors, FactorScore};
use crate::inference::{is_ambiguous, session_summaries, InferenceAdapter, InferenceJudgement};
use crate::notify::{CompletionPayload, Notifier};
use crate::scoring::{Assessment, ConfidenceScorer, CoordinationResult};
use crate::session::{validate_batch, AnalysisDepth, AnalysisSession, AnalysisStatus, AttackSession};
use crate::tools::{ToolCoordinator, ToolFanoutReport, ToolKind, ToolLookup};

pub use checkpoint::{StagePayload, WorkflowCheckpoint};
pub use store::{FileStateStore, MemoryStateStore, SessionRecord, StateStore};

pub struct AnalysisEngine {
    config: EngineConfig,
    store: Arc<dyn StateStore>,
    coordinator: ToolCoordinator,
    scorer: ConfidenceScorer,
    inference: Option<InferenceAdapter>,
    notifier: Notifier,
    /// Caps concurrently running analyses to the configured capacity
    admission: Arc<Semaphore>,
    /// One lease per in-flight session id; the sender doubles as the
    /// cooperative cancellation signal
    leases: Mutex<HashMap<Uuid, watch::Sender<bool>>>,
}

impl AnalysisEngine {
    pub fn new(config: EngineConfig, store: Arc<dyn StateStore>) -> Self {
        let coordinator = ToolCoordinator::new(&config);
        let scorer = ConfidenceScorer::new(config.weights.clone(), config.confidence_threshold);
        let admission = Arc::new(Semaphore::new(config.max_concurrent_analyses.max(1)));

        Self {
            config,
            store,
            coordinator,
            scorer,
            inference: None,
            notifier: Notifier::new(),
            admission,
            leases: Mutex::new(HashMap::new()),
        }
    }

    /// Register an enrichment client. Call before the engine is shared.
    pub fn register_tool(&mut self, tool: Arc<dyn ToolLookup>) {
        self.coordinator.register(tool);
    }

    /// Enable the inference refinement stage for deep/forensic analyses.
    pub fn enable_inference(&mut self) {
        self.inference = Some(InferenceAdapter::from_config(&self.config));
    }

    /// Accept a batch for analysis. The batch is validated up front:
    /// malformed submissions are rejected here and nothing is persisted.
    pub fn submit(
        &self,
        attack_sessions: Vec<AttackSession>,
        depth: AnalysisDepth,
        priority: u8,
        callback_url: Option<String>,
    ) -> EngineResult<Uuid> {
        validate_batch(&attack_sessions, self.config.max_sessions)?;

        let session = AnalysisSession::new(attack_sessions, depth, priority, callback_url);
        let session_id = session.id;
        self.store.put_record(&SessionRecord::new(session))?;

        tracing::info!(
            %session_id,
            depth = depth.as_str(),
            "analysis session queued"
        );
        Ok(session_id)
    }

    /// Drive one session to a terminal state and return its result.
    ///
    /// Re-running a `Completed` session returns the stored result; a second
    /// concurrent run of the same id is rejected with `DuplicateSession`.
    pub async fn run(&self, session_id: Uuid) -> EngineResult<CoordinationResult> {
        let record = self
            .store
            .get_record(session_id)?
            .ok_or(EngineError::UnknownSession(session_id))?;

        match record.session.status {
            AnalysisStatus::Completed => {
                return record.result.ok_or_else(|| {
                    EngineError::Persistence("completed session has no stored result".to_string())
                });
            }
            AnalysisStatus::Cancelled => return Err(EngineError::Cancelled),
            AnalysisStatus::Failed => {
                return Err(record
                    .error
                    .as_ref()
                    .map(ErrorDetail::to_engine_error)
                    .unwrap_or_else(|| {
                        EngineError::Persistence(
                            "failed session has no stored error detail".to_string(),
                        )
                    }));
            }
            _ => {}
        }

        let cancel_rx = self.acquire_lease(session_id)?;
        let outcome = self.run_under_lease(record, cancel_rx).await;
        self.release_lease(session_id);
        outcome
    }

    /// Submit-and-run convenience for embedders.
    pub async fn analyze(
        &self,
        attack_sessions: Vec<AttackSession>,
        depth: AnalysisDepth,
        callback_url: Option<String>,
    ) -> EngineResult<(Uuid, CoordinationResult)> {
        let session_id = self.submit(attack_sessions, depth, 5, callback_url)?;
        let result = self.run(session_id).await?;
        Ok((session_id, result))
    }

    /// Run a session on a background task.
    pub fn spawn(self: Arc<Self>, session_id: Uuid) -> JoinHandle<EngineResult<CoordinationResult>> {
        tokio::spawn(async move { self.run(session_id).await })
    }

    /// Cooperative cancellation. In-flight sessions are signalled and wind
    /// down at the next stage boundary (or mid fan-out); queued sessions
    /// are terminalized directly. Partial checkpoints remain for audit.
    pub fn cancel(&self, session_id: Uuid) -> EngineResult<()> {
        if let Some(sender) = self.leases.lock().get(&session_id) {
            let _ = sender.send(true);
            tracing::info!(%session_id, "cancellation requested");
            return Ok(());
        }

        let mut record = self
            .store
            .get_record(session_id)?
            .ok_or(EngineError::UnknownSession(session_id))?;
        if record.session.status.is_terminal() {
            return Ok(());
        }
        record.session.transition(AnalysisStatus::Cancelled)?;
        self.store.put_record(&record)?;
        tracing::info!(%session_id, "queued session cancelled");
        Ok(())
    }

    /// Idempotent status read: current status plus, when terminal, the
    /// result or error detail.
    pub fn status(&self, session_id: Uuid) -> EngineResult<SessionRecord> {
        self.store
            .get_record(session_id)?
            .ok_or(EngineError::UnknownSession(session_id))
    }

    /// Resume every persisted in-flight session from its last checkpoint.
    /// Must be called from within a tokio runtime.
    pub fn recover(self: Arc<Self>) -> EngineResult<Vec<Uuid>> {
        let ids = self.store.in_flight()?;
        for session_id in &ids {
            tracing::info!(%session_id, "resuming in-flight session");
            Arc::clone(&self).spawn(*session_id);
        }
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Pipeline internals
    // ------------------------------------------------------------------

    async fn run_under_lease(
        &self,
        record: SessionRecord,
        cancel_rx: watch::Receiver<bool>,
    ) -> EngineResult<CoordinationResult> {
        // Admission control: bounded by external inference/tool capacity
        let _permit = self
            .admission
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| EngineError::Cancelled)?;

        let session_id = record.session.id;
        let deadline = self.config.analysis_timeout();

        let outcome = match tokio::time::timeout(deadline, self.drive(record, cancel_rx)).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::DeadlineExceeded(
                self.config.analysis_timeout_seconds,
            )),
        };

        if let Err(err) = &outcome {
            self.finalize_failure(session_id, err);
        }
        outcome
    }

    async fn drive(
        &self,
        mut record: SessionRecord,
        mut cancel_rx: watch::Receiver<bool>,
    ) -> EngineResult<CoordinationResult> {
        let session_id = record.session.id;

        // Rehydrate cumulative state when resuming after a restart
        let mut partial = StagePayload::default();
        let mut seq = 0u32;
        if let Some(last) = self.store.checkpoints(session_id)?.last() {
            partial = last.payload.clone();
            seq = last.seq + 1;
            tracing::info!(
                %session_id,
                resumed_after = last.stage.as_str(),
                "rehydrated state from checkpoint"
            );
        }

        loop {
            if *cancel_rx.borrow() {
                return Err(EngineError::Cancelled);
            }

            match record.session.status {
                AnalysisStatus::Queued => {
                    self.advance(&mut record, AnalysisStatus::Validating)?;
                }

                AnalysisStatus::Validating => {
                    validate_batch(&record.session.attack_sessions, self.config.max_sessions)?;
                    self.checkpoint(&mut seq, &record, AnalysisStatus::Validating, &partial)?;
                    self.advance(&mut record, AnalysisStatus::ExtractingEvidence)?;
                }

                AnalysisStatus::ExtractingEvidence => {
                    partial.evidence = Some(self.extract_local_evidence(&record.session));
                    self.checkpoint(
                        &mut seq,
                        &record,
                        AnalysisStatus::ExtractingEvidence,
                        &partial,
                    )?;
                    self.advance(&mut record, AnalysisStatus::CoordinatingTools)?;
                }

                AnalysisStatus::CoordinatingTools => {
                    let required = ToolKind::required_for(record.session.depth);
                    let indicators =
                        infrastructure::unique_sources(&record.session.attack_sessions);

                    let report = tokio::select! {
                        report = self.coordinator.run(required, &indicators) => report,
                        _ = cancelled(&mut cancel_rx) => return Err(EngineError::Cancelled),
                    };

                    let mut factors = partial.evidence.clone().unwrap_or_default();
                    apply_tool_evidence(&mut factors, &record.session.attack_sessions, &report);
                    partial.evidence = Some(factors);
                    partial.tool_report = Some(report);

                    self.checkpoint(
                        &mut seq,
                        &record,
                        AnalysisStatus::CoordinatingTools,
                        &partial,
                    )?;
                    self.advance(&mut record, AnalysisStatus::Scoring)?;
                }

                AnalysisStatus::Scoring => {
                    let factors = partial.evidence.clone().unwrap_or_default();
                    let unavailable = partial
                        .tool_report
                        .as_ref()
                        .map(|r| r.unavailable.clone())
                        .unwrap_or_default();

                    let result = self.scorer.score(&factors, &unavailable)?;
                    let refine = record.session.depth.runs_inference()
                        && self.inference.is_some()
                        && is_ambiguous(
                            result.confidence,
                            self.config.confidence_threshold,
                            self.config.inference_ambiguity_band,
                        );

                    partial.result = Some(result);
                    self.checkpoint(&mut seq, &record, AnalysisStatus::Scoring, &partial)?;

                    if refine {
                        self.advance(&mut record, AnalysisStatus::Inferring)?;
                    } else {
                        let result = partial.result.take().ok_or_else(|| {
                            EngineError::Persistence("scoring checkpoint lost its result".to_string())
                        })?;
                        return self.finalize_success(&mut record, result);
                    }
                }

                AnalysisStatus::Inferring => {
                    let mut result = partial.result.clone().ok_or_else(|| {
                        EngineError::Persistence(
                            "inferring stage reached without a scored result".to_string(),
                        )
                    })?;

                    if let Some(adapter) = &self.inference {
                        let summaries = session_summaries(&record.session.attack_sessions);
                        let judgement = tokio::select! {
                            judgement = adapter.corroborate(&result.evidence, &summaries) => judgement,
                            _ = cancelled(&mut cancel_rx) => return Err(EngineError::Cancelled),
                        };
                        if let Some(judgement) = judgement {
                            apply_judgement(
                                &mut result,
                                &judgement,
                                self.config.confidence_threshold,
                            );
                        }
                    }

                    partial.result = Some(result.clone());
                    self.checkpoint(&mut seq, &record, AnalysisStatus::Inferring, &partial)?;
                    return self.finalize_success(&mut record, result);
                }

                // Terminal states are handled before drive() is entered
                AnalysisStatus::Completed | AnalysisStatus::Failed | AnalysisStatus::Cancelled => {
                    return Err(EngineError::Persistence(format!(
                        "session {} re-entered pipeline in terminal state {}",
                        session_id,
                        record.session.status.as_str()
                    )));
                }
            }
        }
    }

    /// Temporal and behavioral dimensions come from pure extraction; the
    /// tool-backed dimensions stay unavailable until enrichment runs.
    fn extract_local_evidence(&self, session: &AnalysisSession) -> EvidenceFactors {
        let window = std::time::Duration::from_secs(self.config.temporal_window_seconds);
        let temporal =
            evidence::temporal::correlation_score(&session.attack_sessions, window);
        let behavioral = evidence::behavioral::similarity_score(
            &session.attack_sessions,
            self.config.behavioral_top_fraction,
        );

        tracing::debug!(
            session_id = %session.id,
            temporal,
            behavioral,
            "local evidence extracted"
        );

        EvidenceFactors {
            temporal_correlation: FactorScore::available(temporal),
            behavioral_similarity: FactorScore::available(behavioral),
            ..EvidenceFactors::default()
        }
    }

    fn advance(&self, record: &mut SessionRecord, next: AnalysisStatus) -> EngineResult<()> {
        record.session.transition(next)?;
        self.store.put_record(record)?;
        tracing::debug!(
            session_id = %record.session.id,
            stage = next.as_str(),
            "stage entered"
        );
        Ok(())
    }

    /// Durably record stage completion. The next stage must not start
    /// before this returns.
    fn checkpoint(
        &self,
        seq: &mut u32,
        record: &SessionRecord,
        stage: AnalysisStatus,
        partial: &StagePayload,
    ) -> EngineResult<()> {
        let checkpoint =
            WorkflowCheckpoint::new(record.session.id, stage, *seq, partial.clone());
        self.store.append_checkpoint(&checkpoint)?;
        *seq += 1;
        Ok(())
    }

    fn finalize_success(
        &self,
        record: &mut SessionRecord,
        result: CoordinationResult,
    ) -> EngineResult<CoordinationResult> {
        record.session.transition(AnalysisStatus::Completed)?;
        record.result = Some(result.clone());
        self.store.put_record(record)?;

        tracing::info!(
            session_id = %record.session.id,
            confidence = result.confidence,
            is_coordinated = result.is_coordinated,
            assessment = result.assessment.as_str(),
            "analysis completed"
        );

        if let Some(callback_url) = record.session.callback_url.clone() {
            self.notifier.notify(
                callback_url,
                CompletionPayload {
                    analysis_id: record.session.id,
                    status: record.session.status,
                    result: Some(result.clone()),
                },
            );
        }

        Ok(result)
    }

    /// Terminalize a failed or cancelled session, best-effort. The record
    /// keeps its checkpoints so an external caller can inspect or resubmit.
    fn finalize_failure(&self, session_id: Uuid, err: &EngineError) {
        let loaded = match self.store.get_record(session_id) {
            Ok(Some(record)) => record,
            Ok(None) => return,
            Err(store_err) => {
                tracing::error!(%session_id, error = %store_err, "failed to load record during failure handling");
                return;
            }
        };

        let mut record = loaded;
        if record.session.status.is_terminal() {
            return;
        }

        let terminal = if matches!(err, EngineError::Cancelled) {
            AnalysisStatus::Cancelled
        } else {
            record.error = Some(ErrorDetail::from(err));
            AnalysisStatus::Failed
        };

        if let Err(transition_err) = record.session.transition(terminal) {
            tracing::error!(%session_id, error = %transition_err, "illegal terminal transition");
            return;
        }
        if let Err(store_err) = self.store.put_record(&record) {
            tracing::error!(%session_id, error = %store_err, "failed to persist terminal state");
            return;
        }

        tracing::warn!(
            %session_id,
            status = terminal.as_str(),
            error = %err,
            "analysis terminalized"
        );
    }

    fn acquire_lease(&self, session_id: Uuid) -> EngineResult<watch::Receiver<bool>> {
        let mut leases = self.leases.lock();
        if leases.contains_key(&session_id) {
            return Err(EngineError::DuplicateSession(session_id));
        }
        let (sender, receiver) = watch::channel(false);
        leases.insert(session_id, sender);
        Ok(receiver)
    }

    fn release_lease(&self, session_id: Uuid) {
        self.leases.lock().remove(&session_id);
    }
}

/// Resolves only when cancellation is actually signalled.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow() {
            return;
        }
        if rx.changed().await.is_err() {
            // Sender gone without signalling: never resolves
            std::future::pending::<()>().await;
        }
    }
}

/// Fill the tool-backed evidence dimensions from whatever enrichment data
/// actually arrived. Missing data leaves a dimension unavailable.
fn apply_tool_evidence(
    factors: &mut EvidenceFactors,
    sessions: &[AttackSession],
    report: &ToolFanoutReport,
) {
    if let Some(asn) = &report.asn {
        factors.infrastructure_correlation =
            FactorScore::available(infrastructure::infrastructure_score(sessions, asn));
    }
    if let Some(geo) = &report.geolocation {
        factors.geographic_distribution =
            FactorScore::available(infrastructure::geographic_score(sessions, geo));
    }
    if let Some(intel) = &report.threat_intel {
        factors.threat_intel_correlation =
            FactorScore::available(infrastructure::threat_intel_score(sessions, intel));
    }
}

/// Blend a corroborating model estimate into a borderline heuristic score.
fn apply_judgement(result: &mut CoordinationResult, judgement: &InferenceJudgement, threshold: f64) {
    let refined = ((result.confidence + judgement.confidence) / 2.0).clamp(0.0, 1.0);
    result.confidence = refined;
    result.is_coordinated = refined >= threshold;
    result.assessment = Assessment::from_confidence(refined);
    result.reasoning.push_str(&format!(
        " Model corroboration ({}): {:.2} - {}",
        judgement.model, judgement.confidence, judgement.rationale
    ));
}
