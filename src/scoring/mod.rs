//! Confidence scoring
//!
//! Combines the available evidence dimensions into one weighted confidence
//! value with an explicit breakdown. Unavailable dimensions surrender their
//! weight proportionally to the rest, so a tool outage degrades precision
//! without zeroing the result. Too few dimensions and the scorer refuses to
//! answer rather than report a misleadingly precise number.

pub mod weights;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::error::{EngineError, EngineResult};
use crate::evidence::EvidenceFactors;
pub use weights::ScoringWeights;

/// Human-oriented banding of the confidence value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Assessment {
    HighlyCoordinated,
    LikelyCoordinated,
    PossiblyCoordinated,
    LikelyCoincidental,
    Coincidental,
}

impl Assessment {
    pub fn from_confidence(confidence: f64) -> Self {
        if confidence >= 0.8 {
            Assessment::HighlyCoordinated
        } else if confidence >= 0.6 {
            Assessment::LikelyCoordinated
        } else if confidence >= 0.4 {
            Assessment::PossiblyCoordinated
        } else if confidence >= 0.2 {
            Assessment::LikelyCoincidental
        } else {
            Assessment::Coincidental
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Assessment::HighlyCoordinated => "highly_coordinated",
            Assessment::LikelyCoordinated => "likely_coordinated",
            Assessment::PossiblyCoordinated => "possibly_coordinated",
            Assessment::LikelyCoincidental => "likely_coincidental",
            Assessment::Coincidental => "coincidental",
        }
    }
}

/// Final product of one analysis. The confidence is always derivable from
/// the evidence breakdown it ships with.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinationResult {
    pub confidence: f64,
    pub is_coordinated: bool,
    pub evidence: EvidenceFactors,
    pub tools_unavailable: BTreeSet<String>,
    pub assessment: Assessment,
    pub reasoning: String,
    pub generated_at: DateTime<Utc>,
}

pub struct ConfidenceScorer {
    weights: ScoringWeights,
    threshold: f64,
}

impl ConfidenceScorer {
    pub fn new(weights: ScoringWeights, threshold: f64) -> Self {
        Self { weights, threshold }
    }

    /// Aggregate the evidence into a confidence value.
    ///
    /// Fails with `InsufficientEvidence` when fewer than
    /// [`weights::MIN_AVAILABLE_DIMENSIONS`] dimensions are available.
    pub fn score(
        &self,
        evidence: &EvidenceFactors,
        tools_unavailable: &BTreeSet<String>,
    ) -> EngineResult<CoordinationResult> {
        let available = evidence.available_count();
        if available < weights::MIN_AVAILABLE_DIMENSIONS {
            return Err(EngineError::InsufficientEvidence {
                available,
                required: weights::MIN_AVAILABLE_DIMENSIONS,
            });
        }

        let mut weighted_sum = 0.0;
        let mut total_weight = 0.0;
        for (dimension, factor) in evidence.entries() {
            if !factor.available {
                continue;
            }
            let weight = self.weights.for_dimension(dimension);
            weighted_sum += factor.score * weight;
            total_weight += weight;
        }

        if total_weight <= 0.0 {
            return Err(EngineError::InsufficientEvidence {
                available,
                required: weights::MIN_AVAILABLE_DIMENSIONS,
            });
        }

        let confidence = (weighted_sum / total_weight).clamp(0.0, 1.0);
        let assessment = Assessment::from_confidence(confidence);

        Ok(CoordinationResult {
            confidence,
            is_coordinated: confidence >= self.threshold,
            evidence: evidence.clone(),
            tools_unavailable: tools_unavailable.clone(),
            assessment,
            reasoning: build_reasoning(evidence, confidence, assessment),
            generated_at: Utc::now(),
        })
    }
}

/// Reasoning sentence listing the strongest and weakest available
/// dimensions and anything that could not be measured.
fn build_reasoning(evidence: &EvidenceFactors, confidence: f64, assessment: Assessment) -> String {
    let mut strong = Vec::new();
    let mut weak = Vec::new();
    let mut missing = Vec::new();
    for (dimension, factor) in evidence.entries() {
        if !factor.available {
            missing.push(dimension);
        } else if factor.score > 0.7 {
            strong.push(dimension);
        } else if factor.score < 0.3 {
            weak.push(dimension);
        }
    }

    let mut reasoning = format!("Confidence score: {:.2}. ", confidence);
    if !strong.is_empty() {
        reasoning.push_str(&format!("Strong evidence in: {}. ", strong.join(", ")));
    }
    if !weak.is_empty() {
        reasoning.push_str(&format!("Weak evidence in: {}. ", weak.join(", ")));
    }
    if !missing.is_empty() {
        reasoning.push_str(&format!("Evidence unavailable: {}. ", missing.join(", ")));
    }
    reasoning.push_str(&format!("Assessment: {}.", assessment.as_str()));
    reasoning
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evidence::FactorScore;

    fn full_evidence() -> EvidenceFactors {
        EvidenceFactors {
            temporal_correlation: FactorScore::available(0.9),
            behavioral_similarity: FactorScore::available(0.8),
            infrastructure_correlation: FactorScore::available(0.7),
            geographic_distribution: FactorScore::available(0.6),
            threat_intel_correlation: FactorScore::available(0.5),
        }
    }

    #[test]
    fn test_confidence_in_range_and_threshold_applied() {
        let scorer = ConfidenceScorer::new(ScoringWeights::default(), 0.7);
        let result = scorer.score(&full_evidence(), &BTreeSet::new()).unwrap();

        assert!(result.confidence >= 0.0 && result.confidence <= 1.0);
        assert_eq!(result.is_coordinated, result.confidence >= 0.7);
        // 0.9*0.25 + 0.8*0.25 + 0.7*0.2 + 0.6*0.15 + 0.5*0.15 = 0.73
        assert!((result.confidence - 0.73).abs() < 1e-9);
        assert!(result.is_coordinated);
    }

    #[test]
    fn test_unavailable_weight_redistributed() {
        let mut evidence = full_evidence();
        evidence.infrastructure_correlation = FactorScore::unavailable();

        let scorer = ConfidenceScorer::new(ScoringWeights::default(), 0.7);
        let result = scorer.score(&evidence, &BTreeSet::new()).unwrap();

        // (0.9*0.25 + 0.8*0.25 + 0.6*0.15 + 0.5*0.15) / 0.80
        let expected = (0.9 * 0.25 + 0.8 * 0.25 + 0.6 * 0.15 + 0.5 * 0.15) / 0.80;
        assert!((result.confidence - expected).abs() < 1e-9);
        assert!(result.reasoning.contains("infrastructure_correlation"));
    }

    #[test]
    fn test_too_few_dimensions_is_an_error() {
        let evidence = EvidenceFactors {
            temporal_correlation: FactorScore::available(0.9),
            ..EvidenceFactors::default()
        };
        let scorer = ConfidenceScorer::new(ScoringWeights::default(), 0.7);
        let err = scorer.score(&evidence, &BTreeSet::new()).unwrap_err();
        assert_eq!(err.kind(), "insufficient_evidence");
    }

    #[test]
    fn test_weights_are_a_parameter_not_a_truth() {
        // The same evidence scores differently under different weightings
        let evidence = EvidenceFactors {
            temporal_correlation: FactorScore::available(1.0),
            behavioral_similarity: FactorScore::available(0.0),
            ..EvidenceFactors::default()
        };

        let temporal_heavy = ConfidenceScorer::new(
            ScoringWeights {
                temporal: 0.9,
                behavioral: 0.1,
                infrastructure: 0.0,
                geographic: 0.0,
                threat_intel: 0.0,
            },
            0.7,
        );
        let behavioral_heavy = ConfidenceScorer::new(
            ScoringWeights {
                temporal: 0.1,
                behavioral: 0.9,
                infrastructure: 0.0,
                geographic: 0.0,
                threat_intel: 0.0,
            },
            0.7,
        );

        let high = temporal_heavy.score(&evidence, &BTreeSet::new()).unwrap();
        let low = behavioral_heavy.score(&evidence, &BTreeSet::new()).unwrap();
        assert!(high.confidence > 0.8);
        assert!(low.confidence < 0.2);
    }

    #[test]
    fn test_assessment_banding() {
        assert_eq!(
            Assessment::from_confidence(0.85),
            Assessment::HighlyCoordinated
        );
        assert_eq!(
            Assessment::from_confidence(0.65),
            Assessment::LikelyCoordinated
        );
        assert_eq!(
            Assessment::from_confidence(0.45),
            Assessment::PossiblyCoordinated
        );
        assert_eq!(
            Assessment::from_confidence(0.25),
            Assessment::LikelyCoincidental
        );
        assert_eq!(Assessment::from_confidence(0.05), Assessment::Coincidental);
    }
}
