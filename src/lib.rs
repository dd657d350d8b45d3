//! Coordination Analysis Engine
//!
//! Analyzes batches of honeypot attack sessions to decide whether they
//! represent a coordinated campaign or coincidental independent activity,
//! producing a confidence score with a full evidence breakdown.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                     ANALYSIS ENGINE                            │
//! ├────────────────────────────────────────────────────────────────┤
//! │  ┌────────────┐   ┌─────────────┐   ┌───────────────────────┐  │
//! │  │ Evidence   │   │ Tool        │   │ Inference             │  │
//! │  │ Extractors │   │ Coordinator │   │ Adapter (optional)    │  │
//! │  │ (pure)     │   │ (fan-out)   │   │ (local model chain)   │  │
//! │  └─────┬──────┘   └──────┬──────┘   └───────────┬───────────┘  │
//! │        └─────────────────┼──────────────────────┘              │
//! │                          ▼                                     │
//! │              ┌─────────────────────┐                           │
//! │              │ Workflow            │    ┌──────────────┐       │
//! │              │ Orchestrator        │───▶│ State Store  │       │
//! │              │ (stage machine)     │    │ (checkpoints)│       │
//! │              └──────────┬──────────┘    └──────────────┘       │
//! │                         ▼                                      │
//! │              ┌─────────────────────┐                           │
//! │              │ Confidence Scorer   │                           │
//! │              └─────────────────────┘                           │
//! └────────────────────────────────────────────────────────────────┘
//! ```

pub mod config;
pub mod error;
pub mod evidence;
pub mod inference;
pub mod notify;
pub mod scoring;
pub mod session;
pub mod tools;
pub mod workflow;

pub use config::EngineConfig;
pub use error::{EngineError, EngineResult, ErrorDetail};
pub use evidence::{EvidenceFactors, FactorScore};
pub use scoring::{Assessment, ConfidenceScorer, CoordinationResult, ScoringWeights};
pub use session::{AnalysisDepth, AnalysisSession, AnalysisStatus, AttackSession};
pub use tools::{ToolCoordinator, ToolFanoutReport, ToolKind, ToolLookup};
pub use workflow::{
    AnalysisEngine, FileStateStore, MemoryStateStore, SessionRecord, StateStore,
    WorkflowCheckpoint,
};
