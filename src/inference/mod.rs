//! Inference refinement
//!
//! Optional corroboration of a borderline heuristic score by a local model
//! service (Ollama-compatible). Strategies are tried in order, each under
//! its own timeout; when every model fails or answers garbage the adapter
//! steps aside and the heuristic score stands. It is never a hard
//! dependency for producing a result.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::evidence::EvidenceFactors;
use crate::session::AttackSession;

/// One model strategy in the fallback chain
#[derive(Debug, Clone)]
pub struct ModelSpec {
    pub model: String,
    pub timeout: Duration,
}

/// Corroborating judgement from a model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InferenceJudgement {
    pub confidence: f64,
    pub rationale: String,
    pub model: String,
}

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Debug, Serialize)]
struct GenerateOptions {
    temperature: f64,
    num_predict: u32,
}

#[derive(Debug, Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

pub struct InferenceAdapter {
    base_url: String,
    strategies: Vec<ModelSpec>,
    http: reqwest::Client,
}

impl InferenceAdapter {
    pub fn from_config(config: &EngineConfig) -> Self {
        let timeout = Duration::from_secs(config.llm_timeout_seconds);
        let strategies = vec![
            ModelSpec {
                model: config.llm_model.clone(),
                timeout,
            },
            ModelSpec {
                model: config.llm_fallback_model.clone(),
                timeout,
            },
        ];

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");

        Self {
            base_url: config.llm_service_url.trim_end_matches('/').to_string(),
            strategies,
            http,
        }
    }

    /// Ask the model chain for a corroborating estimate. `None` means every
    /// strategy failed and the caller keeps the heuristic score unchanged.
    pub async fn corroborate(
        &self,
        evidence: &EvidenceFactors,
        summaries: &[String],
    ) -> Option<InferenceJudgement> {
        let prompt = build_prompt(evidence, summaries);

        for strategy in &self.strategies {
            match tokio::time::timeout(strategy.timeout, self.generate(strategy, &prompt)).await {
                Ok(Ok(text)) => {
                    if let Some((confidence, rationale)) = parse_judgement(&text) {
                        tracing::info!(
                            model = %strategy.model,
                            confidence,
                            "inference corroboration obtained"
                        );
                        return Some(InferenceJudgement {
                            confidence,
                            rationale,
                            model: strategy.model.clone(),
                        });
                    }
                    tracing::warn!(model = %strategy.model, "malformed inference response, trying next strategy");
                }
                Ok(Err(err)) => {
                    tracing::warn!(model = %strategy.model, error = %err, "inference call failed, trying next strategy");
                }
                Err(_) => {
                    tracing::warn!(model = %strategy.model, "inference call timed out, trying next strategy");
                }
            }
        }

        tracing::info!("all inference strategies exhausted, keeping heuristic score");
        None
    }

    async fn generate(&self, spec: &ModelSpec, prompt: &str) -> Result<String, reqwest::Error> {
        let request = GenerateRequest {
            model: &spec.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: 0.1,
                num_predict: 512,
            },
        };

        let response: GenerateResponse = self
            .http
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response.response)
    }
}

/// Whether a heuristic score sits close enough to the decision threshold to
/// warrant corroboration.
pub fn is_ambiguous(confidence: f64, threshold: f64, band: f64) -> bool {
    (confidence - threshold).abs() <= band
}

/// Compact one-line summaries of the batch for the prompt.
pub fn session_summaries(sessions: &[AttackSession]) -> Vec<String> {
    sessions
        .iter()
        .map(|s| {
            let port = s
                .target_port
                .map(|p| p.to_string())
                .unwrap_or_else(|| "?".to_string());
            let protocol = s.protocol.as_deref().unwrap_or("unknown");
            format!(
                "{} -> port {} ({}) at {}, {} byte payload",
                s.source_ip,
                port,
                protocol,
                s.timestamp.to_rfc3339(),
                s.payload.len()
            )
        })
        .collect()
}

fn build_prompt(evidence: &EvidenceFactors, summaries: &[String]) -> String {
    let mut prompt = String::from(
        "You are assessing whether a batch of honeypot attack sessions was \
         coordinated. Heuristic evidence breakdown (0..1, 'n/a' when the \
         dimension could not be measured):\n",
    );
    for (dimension, factor) in evidence.entries() {
        if factor.available {
            prompt.push_str(&format!("- {}: {:.3}\n", dimension, factor.score));
        } else {
            prompt.push_str(&format!("- {}: n/a\n", dimension));
        }
    }
    prompt.push_str("\nSessions:\n");
    for summary in summaries {
        prompt.push_str(&format!("- {}\n", summary));
    }
    prompt.push_str(
        "\nAnswer with a single JSON object: \
         {\"confidence\": <float 0..1>, \"rationale\": \"<one sentence>\"}",
    );
    prompt
}

/// Extract the first JSON object from model output and validate it.
fn parse_judgement(text: &str) -> Option<(f64, String)> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    if end <= start {
        return None;
    }

    let value: serde_json::Value = serde_json::from_str(&text[start..=end]).ok()?;
    let confidence = value.get("confidence")?.as_f64()?;
    if !(0.0..=1.0).contains(&confidence) {
        return None;
    }
    let rationale = value.get("rationale")?.as_str()?.trim().to_string();
    if rationale.is_empty() {
        return None;
    }
    Some((confidence, rationale))
}
