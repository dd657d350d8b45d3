//! Completion callbacks
//!
//! Fire-and-forget delivery of terminal results to a caller-supplied
//! webhook. Delivery failure never affects session state.

use serde::Serialize;
use std::time::Duration;
use uuid::Uuid;

use crate::scoring::CoordinationResult;
use crate::session::AnalysisStatus;

#[derive(Debug, Clone, Serialize)]
pub struct CompletionPayload {
    pub analysis_id: Uuid,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<CoordinationResult>,
}

#[derive(Clone)]
pub struct Notifier {
    http: reqwest::Client,
}

impl Notifier {
    pub fn new() -> Self {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("Failed to create HTTP client");
        Self { http }
    }

    /// Deliver the payload in the background; best-effort only.
    pub fn notify(&self, callback_url: String, payload: CompletionPayload) {
        let http = self.http.clone();
        tokio::spawn(async move {
            let analysis_id = payload.analysis_id;
            match http.post(&callback_url).json(&payload).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::debug!(%analysis_id, "completion callback delivered");
                }
                Ok(response) => {
                    tracing::warn!(
                        %analysis_id,
                        status = %response.status(),
                        "completion callback rejected"
                    );
                }
                Err(err) => {
                    tracing::warn!(%analysis_id, error = %err, "completion callback failed");
                }
            }
        });
    }
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new()
    }
}
