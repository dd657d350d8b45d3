//! Configuration module

use std::env;
use std::str::FromStr;
use std::time::Duration;

use crate::scoring::weights::ScoringWeights;

/// Engine configuration
///
/// Loaded once at startup from environment variables. Every field has a
/// documented default so the engine runs out of the box against local
/// collaborators.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Maximum attack sessions accepted per batch
    pub max_sessions: usize,

    /// Overall per-analysis deadline in seconds
    pub analysis_timeout_seconds: u64,

    /// Confidence at or above this is reported as coordinated
    pub confidence_threshold: f64,

    /// Sliding window width for temporal clustering, in seconds
    pub temporal_window_seconds: u64,

    /// Fraction of top pairwise similarities averaged by the behavioral
    /// extractor (guards against one identical pair dominating a batch)
    pub behavioral_top_fraction: f64,

    /// Per-tool-call timeout in seconds
    pub tool_call_timeout_seconds: u64,

    /// Aggregate timeout for the whole tool fan-out, in seconds
    pub tool_fanout_timeout_seconds: u64,

    /// Transient-failure retries per tool call (beyond the first attempt)
    pub tool_retry_attempts: u32,

    /// Initial retry backoff in milliseconds, doubled per attempt
    pub tool_retry_backoff_ms: u64,

    /// Admission-control limit on concurrently running analyses
    pub max_concurrent_analyses: usize,

    /// Half-width of the band around the threshold in which the heuristic
    /// score counts as ambiguous and inference may refine it
    pub inference_ambiguity_band: f64,

    /// Whether the inference refinement stage is wired up at all
    pub inference_enabled: bool,

    /// Local model service (Ollama-compatible) base URL
    pub llm_service_url: String,

    /// Primary inference model
    pub llm_model: String,

    /// Fallback inference model tried when the primary fails
    pub llm_fallback_model: String,

    /// Per-inference-call timeout in seconds
    pub llm_timeout_seconds: u64,

    /// Enrichment collaborator base URLs; a tool is only registered when
    /// its URL is configured
    pub asn_service_url: Option<String>,
    pub geo_service_url: Option<String>,
    pub threat_intel_service_url: Option<String>,

    /// Evidence dimension weights
    pub weights: ScoringWeights,
}

impl EngineConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        Self {
            max_sessions: env_parse("ANALYSIS_MAX_SESSIONS", 1000),
            analysis_timeout_seconds: env_parse("ANALYSIS_TIMEOUT_SECONDS", 300),
            confidence_threshold: env_parse("ANALYSIS_CONFIDENCE_THRESHOLD", 0.7),
            temporal_window_seconds: env_parse("ANALYSIS_TEMPORAL_WINDOW_SECONDS", 300),
            behavioral_top_fraction: env_parse("ANALYSIS_BEHAVIORAL_TOP_FRACTION", 0.5),
            tool_call_timeout_seconds: env_parse("TOOL_CALL_TIMEOUT_SECONDS", 10),
            tool_fanout_timeout_seconds: env_parse("TOOL_FANOUT_TIMEOUT_SECONDS", 60),
            tool_retry_attempts: env_parse("TOOL_RETRY_ATTEMPTS", 2),
            tool_retry_backoff_ms: env_parse("TOOL_RETRY_BACKOFF_MS", 250),
            max_concurrent_analyses: env_parse("MAX_CONCURRENT_ANALYSES", 4),
            inference_ambiguity_band: env_parse("INFERENCE_AMBIGUITY_BAND", 0.1),
            inference_enabled: env_parse("INFERENCE_ENABLED", true),
            llm_service_url: env::var("LLM_SERVICE_URL")
                .unwrap_or_else(|_| "http://localhost:11434".to_string()),
            llm_model: env::var("LLM_MODEL")
                .unwrap_or_else(|_| "llama-3.1-8b-instruct".to_string()),
            llm_fallback_model: env::var("LLM_FALLBACK_MODEL")
                .unwrap_or_else(|_| "mistral-7b-instruct".to_string()),
            llm_timeout_seconds: env_parse("LLM_TIMEOUT_SECONDS", 30),
            asn_service_url: env::var("ASN_SERVICE_URL").ok(),
            geo_service_url: env::var("GEO_SERVICE_URL").ok(),
            threat_intel_service_url: env::var("THREAT_INTEL_SERVICE_URL").ok(),
            weights: ScoringWeights::from_env(),
        }
    }

    pub fn tool_call_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_call_timeout_seconds)
    }

    pub fn tool_fanout_timeout(&self) -> Duration {
        Duration::from_secs(self.tool_fanout_timeout_seconds)
    }

    pub fn analysis_timeout(&self) -> Duration {
        Duration::from_secs(self.analysis_timeout_seconds)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_sessions: 1000,
            analysis_timeout_seconds: 300,
            confidence_threshold: 0.7,
            temporal_window_seconds: 300,
            behavioral_top_fraction: 0.5,
            tool_call_timeout_seconds: 10,
            tool_fanout_timeout_seconds: 60,
            tool_retry_attempts: 2,
            tool_retry_backoff_ms: 250,
            max_concurrent_analyses: 4,
            inference_ambiguity_band: 0.1,
            inference_enabled: true,
            llm_service_url: "http://localhost:11434".to_string(),
            llm_model: "llama-3.1-8b-instruct".to_string(),
            llm_fallback_model: "mistral-7b-instruct".to_string(),
            llm_timeout_seconds: 30,
            asn_service_url: None,
            geo_service_url: None,
            threat_intel_service_url: None,
            weights: ScoringWeights::default(),
        }
    }
}

/// Parse an environment variable, falling back to a default
pub(crate) fn env_parse<T: FromStr + Copy>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
