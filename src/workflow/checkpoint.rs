//! Workflow checkpoints
//!
//! Durable, append-only progress records. One checkpoint is written after
//! every completed stage; the latest one carries the cumulative partial
//! state needed to resume from the following stage after a restart.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::evidence::EvidenceFactors;
use crate::scoring::CoordinationResult;
use crate::session::AnalysisStatus;
use crate::tools::ToolFanoutReport;

/// Cumulative intermediate state carried across stages.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StagePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub evidence: Option<EvidenceFactors>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_report: Option<ToolFanoutReport>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<CoordinationResult>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowCheckpoint {
    pub session_id: Uuid,
    /// The stage that just completed
    pub stage: AnalysisStatus,
    /// Monotonically increasing per session
    pub seq: u32,
    pub timestamp: DateTime<Utc>,
    pub payload: StagePayload,
}

impl WorkflowCheckpoint {
    pub fn new(session_id: Uuid, stage: AnalysisStatus, seq: u32, payload: StagePayload) -> Self {
        Self {
            session_id,
            stage,
            seq,
            timestamp: Utc::now(),
            payload,
        }
    }
}
