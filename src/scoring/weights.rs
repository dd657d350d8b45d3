//! Evidence weighting
//!
//! Default weights for combining evidence dimensions into one confidence
//! value. The defaults are a documented starting point, not ground truth:
//! every weight is runtime-configurable and the scorer treats the whole set
//! as a parameter.

use serde::{Deserialize, Serialize};

use crate::config::env_parse;

// ============================================================================
// DEFAULT WEIGHTS
// ============================================================================

/// Weight of temporal correlation (25%)
pub const TEMPORAL_WEIGHT: f64 = 0.25;

/// Weight of behavioral similarity (25%)
pub const BEHAVIORAL_WEIGHT: f64 = 0.25;

/// Weight of infrastructure correlation (20%)
pub const INFRASTRUCTURE_WEIGHT: f64 = 0.20;

/// Weight of geographic distribution (15%)
pub const GEOGRAPHIC_WEIGHT: f64 = 0.15;

/// Weight of threat-intel correlation (15%)
pub const THREAT_INTEL_WEIGHT: f64 = 0.15;

/// Scoring refuses to produce a confidence from fewer available dimensions
pub const MIN_AVAILABLE_DIMENSIONS: usize = 2;

// ============================================================================
// CONFIGURABLE WEIGHTS
// ============================================================================

/// Per-dimension weights (configurable)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    pub temporal: f64,
    pub behavioral: f64,
    pub infrastructure: f64,
    pub geographic: f64,
    pub threat_intel: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            temporal: TEMPORAL_WEIGHT,
            behavioral: BEHAVIORAL_WEIGHT,
            infrastructure: INFRASTRUCTURE_WEIGHT,
            geographic: GEOGRAPHIC_WEIGHT,
            threat_intel: THREAT_INTEL_WEIGHT,
        }
    }
}

impl ScoringWeights {
    /// Load weight overrides from the environment
    pub fn from_env() -> Self {
        Self {
            temporal: env_parse("WEIGHT_TEMPORAL_CORRELATION", TEMPORAL_WEIGHT),
            behavioral: env_parse("WEIGHT_BEHAVIORAL_SIMILARITY", BEHAVIORAL_WEIGHT),
            infrastructure: env_parse("WEIGHT_INFRASTRUCTURE_CORRELATION", INFRASTRUCTURE_WEIGHT),
            geographic: env_parse("WEIGHT_GEOGRAPHIC_DISTRIBUTION", GEOGRAPHIC_WEIGHT),
            threat_intel: env_parse("WEIGHT_THREAT_INTEL_CORRELATION", THREAT_INTEL_WEIGHT),
        }
    }

    pub fn for_dimension(&self, dimension: &str) -> f64 {
        match dimension {
            crate::evidence::TEMPORAL_CORRELATION => self.temporal,
            crate::evidence::BEHAVIORAL_SIMILARITY => self.behavioral,
            crate::evidence::INFRASTRUCTURE_CORRELATION => self.infrastructure,
            crate::evidence::GEOGRAPHIC_DISTRIBUTION => self.geographic,
            crate::evidence::THREAT_INTEL_CORRELATION => self.threat_intel,
            _ => 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_weights_sum_to_one() {
        let w = ScoringWeights::default();
        let total = w.temporal + w.behavioral + w.infrastructure + w.geographic + w.threat_intel;
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_unknown_dimension_has_no_weight() {
        assert_eq!(ScoringWeights::default().for_dimension("payload_entropy"), 0.0);
    }
}
