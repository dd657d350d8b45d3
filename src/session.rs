//! Analysis session types
//!
//! Attack-session input records, the per-analysis session wrapper and its
//! status state machine, and batch validation.

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Maximum accepted payload size per attack session
pub const MAX_PAYLOAD_BYTES: usize = 10_240;

/// Clock-skew tolerance when rejecting future timestamps
const TIMESTAMP_SKEW_SECONDS: i64 = 5;

/// A single captured attack session. Immutable once ingested.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttackSession {
    pub source_ip: IpAddr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination_ip: Option<IpAddr>,
    pub timestamp: DateTime<Utc>,
    pub payload: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_port: Option<u16>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub protocol: Option<String>,
}

/// Client-selected analysis thoroughness tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisDepth {
    Minimal,
    Standard,
    Deep,
    Forensic,
}

impl Default for AnalysisDepth {
    fn default() -> Self {
        AnalysisDepth::Standard
    }
}

impl AnalysisDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisDepth::Minimal => "minimal",
            AnalysisDepth::Standard => "standard",
            AnalysisDepth::Deep => "deep",
            AnalysisDepth::Forensic => "forensic",
        }
    }

    /// Whether the inference refinement stage is eligible at this depth
    pub fn runs_inference(&self) -> bool {
        matches!(self, AnalysisDepth::Deep | AnalysisDepth::Forensic)
    }
}

impl std::str::FromStr for AnalysisDepth {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "minimal" => Ok(AnalysisDepth::Minimal),
            "standard" => Ok(AnalysisDepth::Standard),
            "deep" => Ok(AnalysisDepth::Deep),
            "forensic" => Ok(AnalysisDepth::Forensic),
            other => Err(EngineError::Validation(format!(
                "unknown analysis depth '{}'",
                other
            ))),
        }
    }
}

/// Workflow status of an analysis session.
///
/// Transitions are strictly forward through the pipeline; `Failed` and
/// `Cancelled` are reachable from any non-terminal state and absorb.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Queued,
    Validating,
    ExtractingEvidence,
    CoordinatingTools,
    Scoring,
    Inferring,
    Completed,
    Failed,
    Cancelled,
}

impl AnalysisStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AnalysisStatus::Queued => "queued",
            AnalysisStatus::Validating => "validating",
            AnalysisStatus::ExtractingEvidence => "extracting_evidence",
            AnalysisStatus::CoordinatingTools => "coordinating_tools",
            AnalysisStatus::Scoring => "scoring",
            AnalysisStatus::Inferring => "inferring",
            AnalysisStatus::Completed => "completed",
            AnalysisStatus::Failed => "failed",
            AnalysisStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            AnalysisStatus::Completed | AnalysisStatus::Failed | AnalysisStatus::Cancelled
        )
    }

    /// Position in the pipeline; used to enforce monotone transitions
    fn rank(&self) -> u8 {
        match self {
            AnalysisStatus::Queued => 0,
            AnalysisStatus::Validating => 1,
            AnalysisStatus::ExtractingEvidence => 2,
            AnalysisStatus::CoordinatingTools => 3,
            AnalysisStatus::Scoring => 4,
            AnalysisStatus::Inferring => 5,
            AnalysisStatus::Completed => 6,
            AnalysisStatus::Failed => 7,
            AnalysisStatus::Cancelled => 7,
        }
    }

    /// Whether `next` is a legal transition from this state
    pub fn can_transition_to(&self, next: AnalysisStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if matches!(next, AnalysisStatus::Failed | AnalysisStatus::Cancelled) {
            return true;
        }
        next.rank() > self.rank()
    }
}

/// One analysis request: owns its attack sessions for its whole lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisSession {
    pub id: Uuid,
    pub status: AnalysisStatus,
    pub depth: AnalysisDepth,
    /// Scheduling hint recorded for external queue consumers, 1-10
    pub priority: u8,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub callback_url: Option<String>,
    pub attack_sessions: Vec<AttackSession>,
}

impl AnalysisSession {
    pub fn new(
        attack_sessions: Vec<AttackSession>,
        depth: AnalysisDepth,
        priority: u8,
        callback_url: Option<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            status: AnalysisStatus::Queued,
            depth,
            priority: priority.clamp(1, 10),
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            callback_url,
            attack_sessions,
        }
    }

    /// Move the session to `next`, enforcing the transition table.
    pub fn transition(&mut self, next: AnalysisStatus) -> EngineResult<()> {
        if !self.status.can_transition_to(next) {
            return Err(EngineError::Validation(format!(
                "illegal status transition {} -> {}",
                self.status.as_str(),
                next.as_str()
            )));
        }
        if next == AnalysisStatus::Validating && self.started_at.is_none() {
            self.started_at = Some(Utc::now());
        }
        if next.is_terminal() {
            self.completed_at = Some(Utc::now());
        }
        self.status = next;
        Ok(())
    }
}

/// Validate a submitted batch. Runs before anything is persisted and again
/// as the pipeline's validating stage; failures are fatal and never retried.
pub fn validate_batch(sessions: &[AttackSession], max_sessions: usize) -> EngineResult<()> {
    if sessions.len() < 2 {
        return Err(EngineError::Validation(format!(
            "coordination analysis requires at least 2 attack sessions, got {}",
            sessions.len()
        )));
    }
    if sessions.len() > max_sessions {
        return Err(EngineError::Validation(format!(
            "batch of {} exceeds the maximum of {} attack sessions",
            sessions.len(),
            max_sessions
        )));
    }

    let horizon = Utc::now() + ChronoDuration::seconds(TIMESTAMP_SKEW_SECONDS);
    for (idx, session) in sessions.iter().enumerate() {
        if session.payload.is_empty() {
            return Err(EngineError::Validation(format!(
                "attack session {} has an empty payload",
                idx
            )));
        }
        if session.payload.len() > MAX_PAYLOAD_BYTES {
            return Err(EngineError::Validation(format!(
                "attack session {} payload of {} bytes exceeds the {} byte limit",
                idx,
                session.payload.len(),
                MAX_PAYLOAD_BYTES
            )));
        }
        if session.target_port == Some(0) {
            return Err(EngineError::Validation(format!(
                "attack session {} has target port 0",
                idx
            )));
        }
        if session.timestamp > horizon {
            return Err(EngineError::Validation(format!(
                "attack session {} timestamp is in the future",
                idx
            )));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample(ip: &str, secs: i64) -> AttackSession {
        AttackSession {
            source_ip: ip.parse().unwrap(),
            destination_ip: None,
            timestamp: Utc.timestamp_opt(1_700_000_000 + secs, 0).unwrap(),
            payload: "GET /admin HTTP/1.1".to_string(),
            target_port: Some(80),
            protocol: Some("HTTP".to_string()),
        }
    }

    #[test]
    fn test_single_session_fails_validation() {
        let batch = vec![sample("192.0.2.1", 0)];
        assert!(validate_batch(&batch, 1000).is_err());
    }

    #[test]
    fn test_oversized_payload_rejected() {
        let mut batch = vec![sample("192.0.2.1", 0), sample("192.0.2.2", 5)];
        batch[1].payload = "A".repeat(MAX_PAYLOAD_BYTES + 1);
        let err = validate_batch(&batch, 1000).unwrap_err();
        assert_eq!(err.kind(), "validation_error");
    }

    #[test]
    fn test_future_timestamp_rejected() {
        let mut batch = vec![sample("192.0.2.1", 0), sample("192.0.2.2", 5)];
        batch[0].timestamp = Utc::now() + ChronoDuration::hours(1);
        assert!(validate_batch(&batch, 1000).is_err());
    }

    #[test]
    fn test_status_transitions_are_monotone() {
        assert!(AnalysisStatus::Queued.can_transition_to(AnalysisStatus::Validating));
        assert!(AnalysisStatus::Validating.can_transition_to(AnalysisStatus::ExtractingEvidence));
        assert!(AnalysisStatus::Scoring.can_transition_to(AnalysisStatus::Completed));
        // No backward moves
        assert!(!AnalysisStatus::Scoring.can_transition_to(AnalysisStatus::Validating));
        // Failure reachable from any non-terminal state
        assert!(AnalysisStatus::CoordinatingTools.can_transition_to(AnalysisStatus::Failed));
        assert!(AnalysisStatus::Queued.can_transition_to(AnalysisStatus::Cancelled));
        // Terminal states absorb
        assert!(!AnalysisStatus::Completed.can_transition_to(AnalysisStatus::Failed));
        assert!(!AnalysisStatus::Failed.can_transition_to(AnalysisStatus::Scoring));
    }

    #[test]
    fn test_transition_stamps_lifecycle_times() {
        let mut session = AnalysisSession::new(
            vec![sample("192.0.2.1", 0), sample("192.0.2.2", 5)],
            AnalysisDepth::Standard,
            5,
            None,
        );
        assert!(session.started_at.is_none());

        session.transition(AnalysisStatus::Validating).unwrap();
        assert!(session.started_at.is_some());
        assert!(session.completed_at.is_none());

        session.transition(AnalysisStatus::Failed).unwrap();
        assert!(session.completed_at.is_some());
        assert!(session.transition(AnalysisStatus::Scoring).is_err());
    }
}
