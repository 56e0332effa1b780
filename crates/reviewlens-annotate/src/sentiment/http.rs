//! Hosted text-classification backend.
//!
//! Talks to an inference endpoint serving a binary sentiment model (for
//! example `distilbert-base-uncased-finetuned-sst-2-english`). The request
//! body is `{"inputs": [...]}`; the response is one list of
//! `{"label", "score"}` entries per input. Response parsing is always
//! compiled so it can be tested without the network stack; the client
//! itself is behind the `http` feature.

use serde::Deserialize;

use crate::error::ModelError;
use crate::record::{ClassScores, SentimentLabel};

/// Environment variable holding a bearer token for the endpoint.
pub const TOKEN_ENV: &str = "REVIEWLENS_API_TOKEN";

#[derive(Debug, Deserialize)]
struct LabelScore {
    label: String,
    score: f64,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ClassificationResponse {
    Batch(Vec<Vec<LabelScore>>),
    Single(Vec<LabelScore>),
    Error {
        error: String,
        #[serde(default)]
        estimated_time: Option<f64>,
    },
}

/// Map a backend label onto the binary label set.
pub fn normalize_label(label: &str) -> Option<SentimentLabel> {
    let upper = label.trim().to_ascii_uppercase();
    match upper.as_str() {
        "LABEL_0" => Some(SentimentLabel::Negative),
        "LABEL_1" => Some(SentimentLabel::Positive),
        _ if upper.contains("POS") => Some(SentimentLabel::Positive),
        _ if upper.contains("NEG") => Some(SentimentLabel::Negative),
        _ => None,
    }
}

/// Parse an endpoint response for `expected` inputs.
///
/// When an entry lists only the winning label, the other class gets the
/// complement of its score.
pub fn parse_classification_response(body: &str, expected: usize) -> Result<Vec<ClassScores>, ModelError> {
    let parsed: ClassificationResponse = serde_json::from_str(body)
        .map_err(|e| ModelError::InvalidResponse(format!("cannot decode response: {e}")))?;

    let entries = match parsed {
        ClassificationResponse::Batch(entries) => entries,
        ClassificationResponse::Single(entry) if expected == 1 => vec![entry],
        ClassificationResponse::Single(_) => {
            return Err(ModelError::InvalidResponse(format!(
                "flat response for a batch of {expected}"
            )))
        }
        // The hosted API answers with an error object while the model is
        // still warming up; that is worth retrying.
        ClassificationResponse::Error {
            error,
            estimated_time: Some(eta),
        } => {
            return Err(ModelError::Transient(format!("{error} (ready in ~{eta:.0}s)")));
        }
        ClassificationResponse::Error { error, .. } => return Err(ModelError::Fatal(error)),
    };

    entries.iter().map(|entry| scores_from_entry(entry)).collect()
}

fn scores_from_entry(entry: &[LabelScore]) -> Result<ClassScores, ModelError> {
    let mut positive = None;
    let mut negative = None;
    for item in entry {
        match normalize_label(&item.label) {
            Some(SentimentLabel::Positive) => positive = Some(item.score),
            Some(SentimentLabel::Negative) => negative = Some(item.score),
            None => {
                return Err(ModelError::InvalidResponse(format!(
                    "unrecognized label '{}'",
                    item.label
                )))
            }
        }
    }
    match (negative, positive) {
        (Some(negative), Some(positive)) => Ok(ClassScores { negative, positive }),
        (Some(negative), None) => Ok(ClassScores {
            negative,
            positive: 1.0 - negative,
        }),
        (None, Some(positive)) => Ok(ClassScores {
            negative: 1.0 - positive,
            positive,
        }),
        (None, None) => Err(ModelError::InvalidResponse("empty label list".to_string())),
    }
}

#[cfg(feature = "http")]
pub use client::{HttpLoader, HttpModel};

#[cfg(feature = "http")]
mod client {
    use std::sync::Arc;
    use std::time::Duration;

    use reqwest::blocking::Client;
    use reqwest::StatusCode;

    use super::parse_classification_response;
    use crate::error::ModelError;
    use crate::record::ClassScores;
    use crate::sentiment::{ModelLoader, SentimentModel};

    pub struct HttpModel {
        client: Client,
        endpoint: String,
        token: Option<String>,
    }

    impl HttpModel {
        pub fn new(endpoint: String, token: Option<String>, timeout: Duration) -> Result<Self, ModelError> {
            let client = Client::builder()
                .timeout(timeout)
                .build()
                .map_err(|e| ModelError::Fatal(format!("failed to build http client: {e}")))?;
            Ok(Self {
                client,
                endpoint,
                token,
            })
        }
    }

    impl SentimentModel for HttpModel {
        fn name(&self) -> &str {
            &self.endpoint
        }

        fn predict_batch(&self, texts: &[String]) -> Result<Vec<ClassScores>, ModelError> {
            let payload = serde_json::json!({
                "inputs": texts,
                "parameters": { "top_k": null },
                "options": { "wait_for_model": true },
            });
            let mut request = self.client.post(&self.endpoint).json(&payload);
            if let Some(token) = &self.token {
                request = request.bearer_auth(token);
            }

            let response = request.send().map_err(|e| {
                if e.is_timeout() || e.is_connect() {
                    ModelError::Transient(format!("request to {} failed: {e}", self.endpoint))
                } else {
                    ModelError::Fatal(format!("request to {} failed: {e}", self.endpoint))
                }
            })?;

            let status = response.status();
            let body = response
                .text()
                .map_err(|e| ModelError::Transient(format!("reading response body: {e}")))?;
            if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
                return Err(ModelError::Transient(format!("http {status}: {body}")));
            }
            if !status.is_success() {
                return Err(ModelError::Fatal(format!("http {status}: {body}")));
            }
            parse_classification_response(&body, texts.len())
        }
    }

    pub struct HttpLoader {
        pub endpoint: String,
        pub token: Option<String>,
        pub request_timeout: Duration,
    }

    impl ModelLoader for HttpLoader {
        fn describe(&self) -> String {
            format!("http ({})", self.endpoint)
        }

        fn load(&self) -> Result<Arc<dyn SentimentModel>, ModelError> {
            let model = HttpModel::new(self.endpoint.clone(), self.token.clone(), self.request_timeout)?;
            Ok(Arc::new(model))
        }
    }
}
