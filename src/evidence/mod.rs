//! Evidence extraction
//!
//! Pure, deterministic correlation scoring over a batch of attack sessions.
//! Each extractor computes one evidence dimension; none of them performs IO
//! or suspends. Identical input always yields identical output.

pub mod behavioral;
pub mod infrastructure;
pub mod temporal;

use serde::{Deserialize, Serialize};

// Dimension names as they appear in evidence breakdowns and checkpoints
pub const TEMPORAL_CORRELATION: &str = "temporal_correlation";
pub const BEHAVIORAL_SIMILARITY: &str = "behavioral_similarity";
pub const INFRASTRUCTURE_CORRELATION: &str = "infrastructure_correlation";
pub const GEOGRAPHIC_DISTRIBUTION: &str = "geographic_distribution";
pub const THREAT_INTEL_CORRELATION: &str = "threat_intel_correlation";

/// One evidence dimension: a score in [0,1] plus whether the data behind it
/// was actually obtainable. Unavailable dimensions keep score 0.0 and are
/// excluded from aggregation rather than dragging the confidence down.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FactorScore {
    pub score: f64,
    pub available: bool,
}

impl FactorScore {
    pub fn available(score: f64) -> Self {
        Self {
            score: score.clamp(0.0, 1.0),
            available: true,
        }
    }

    pub fn unavailable() -> Self {
        Self {
            score: 0.0,
            available: false,
        }
    }
}

impl Default for FactorScore {
    fn default() -> Self {
        Self::unavailable()
    }
}

/// The full evidence breakdown for one analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EvidenceFactors {
    pub temporal_correlation: FactorScore,
    pub behavioral_similarity: FactorScore,
    pub infrastructure_correlation: FactorScore,
    pub geographic_distribution: FactorScore,
    pub threat_intel_correlation: FactorScore,
}

impl EvidenceFactors {
    /// Dimensions in their fixed aggregation order
    pub fn entries(&self) -> [(&'static str, FactorScore); 5] {
        [
            (TEMPORAL_CORRELATION, self.temporal_correlation),
            (BEHAVIORAL_SIMILARITY, self.behavioral_similarity),
            (INFRASTRUCTURE_CORRELATION, self.infrastructure_correlation),
            (GEOGRAPHIC_DISTRIBUTION, self.geographic_distribution),
            (THREAT_INTEL_CORRELATION, self.threat_intel_correlation),
        ]
    }

    pub fn available_count(&self) -> usize {
        self.entries().iter().filter(|(_, f)| f.available).count()
    }
}
