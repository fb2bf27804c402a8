//! Mureka adapter.
//!
//! Talks to the Mureka song API: `POST /v1/song/generate` to queue a
//! job and `GET /v1/song/query/{id}` to poll; the webhook payload is
//! the same task object the query endpoint returns. Mureka has shipped
//! three render-array field names over its API generations (`choices`,
//! `clips`, `data`) and reports durations in milliseconds — all of that
//! is absorbed here.

use serde::Serialize;
use serde_json::Value;
use tuneforge_core::types::Provider;

use crate::adapter::{
    with_retries, CallbackEnvelope, GenerationRequest, NormalizedResult, ProviderAdapter,
    RenderedVariant, SubmittedJob, REQUEST_TIMEOUT,
};
use crate::error::ProviderError;

const PROVIDER_NAME: &str = "mureka";

/// Statuses meaning the task is still being worked on.
const RUNNING_STATUSES: &[&str] = &[
    "pending",
    "processing",
    "preparing",
    "queued",
    "running",
    "streaming",
];

/// Statuses meaning the task will never produce output.
const FAILED_STATUSES: &[&str] = &["failed", "timeouted", "cancelled"];

/// Connection settings for the Mureka API.
#[derive(Debug, Clone)]
pub struct MurekaConfig {
    /// Base URL, e.g. `https://api.mureka.ai`.
    pub base_url: String,
    pub api_key: String,
    /// Model sent when the track does not pin one (e.g. `auto`).
    pub default_model: String,
}

impl MurekaConfig {
    /// Load from `MUREKA_*` environment variables. Returns `None` when
    /// no API key is configured.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("MUREKA_API_KEY").ok()?;
        Some(Self {
            base_url: std::env::var("MUREKA_API_URL")
                .unwrap_or_else(|_| "https://api.mureka.ai".into()),
            api_key,
            default_model: std::env::var("MUREKA_DEFAULT_MODEL")
                .unwrap_or_else(|_| "auto".into()),
        })
    }
}

/// Adapter for the Mureka music-generation API.
pub struct MurekaAdapter {
    client: reqwest::Client,
    config: MurekaConfig,
}

#[derive(Serialize)]
struct MurekaGeneratePayload<'a> {
    lyrics: &'a str,
    prompt: &'a str,
    model: &'a str,
}

impl MurekaAdapter {
    pub fn new(config: MurekaConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client, config }
    }

    /// Create an adapter reusing an existing [`reqwest::Client`].
    pub fn with_client(client: reqwest::Client, config: MurekaConfig) -> Self {
        Self { client, config }
    }

    async fn send_json(&self, request: reqwest::RequestBuilder) -> Result<Value, ProviderError> {
        let response = request
            .bearer_auth(&self.config.api_key)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            return Err(ProviderError::Api {
                provider: PROVIDER_NAME,
                status: status.as_u16(),
                body,
            });
        }

        Ok(response.json::<Value>().await?)
    }

    /// Map a task object (query response or webhook body) to a
    /// [`NormalizedResult`].
    fn interpret_task(task: &Value) -> Result<NormalizedResult, ProviderError> {
        // Webhook bodies wrap the task in { data: {...} }; query
        // responses are the bare task object.
        let task = task.get("data").filter(|d| d.is_object()).unwrap_or(task);

        let status = task
            .get("status")
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Payload {
                provider: PROVIDER_NAME,
                detail: "task has no status".into(),
            })?;

        if status == "succeeded" || status == "completed" {
            let variants: Vec<RenderedVariant> = Self::renders(task)
                .iter()
                .map(Self::variant_from_render)
                .collect();
            if variants.iter().all(|v| v.audio_url.is_none()) {
                return Ok(NormalizedResult::Failed {
                    reason: "Mureka reports success but no audio URL".into(),
                });
            }
            return Ok(NormalizedResult::Completed { variants });
        }

        if FAILED_STATUSES.contains(&status) {
            let reason = task
                .get("failed_reason")
                .and_then(Value::as_str)
                .filter(|r| !r.is_empty())
                .map(String::from)
                .unwrap_or_else(|| format!("Mureka generation {status}"));
            return Ok(NormalizedResult::Failed { reason });
        }

        if RUNNING_STATUSES.contains(&status) {
            return Ok(NormalizedResult::InProgress {
                stage: Some(status.to_string()),
            });
        }

        // An unknown status is treated as still running rather than
        // failing the track on vocabulary drift.
        tracing::warn!(status, "Unknown Mureka task status, treating as in-progress");
        Ok(NormalizedResult::InProgress {
            stage: Some(status.to_string()),
        })
    }

    /// The render array under whichever field name this API generation
    /// uses.
    fn renders(task: &Value) -> Vec<Value> {
        for key in ["choices", "clips", "data"] {
            if let Some(renders) = task.get(key).and_then(Value::as_array) {
                return renders.clone();
            }
        }
        Vec::new()
    }

    fn variant_from_render(render: &Value) -> RenderedVariant {
        let audio_url = ["url", "audio_url", "flac_url"]
            .iter()
            .filter_map(|k| render.get(k).and_then(Value::as_str))
            .map(String::from)
            .next();
        let cover_url = ["image_url", "cover_url"]
            .iter()
            .filter_map(|k| render.get(k).and_then(Value::as_str))
            .map(String::from)
            .next();
        // Mureka durations are milliseconds.
        let duration_secs = render
            .get("duration")
            .and_then(Value::as_f64)
            .map(|ms| (ms / 1000.0).round() as i32);
        let title = ["title", "name"]
            .iter()
            .filter_map(|k| render.get(k).and_then(Value::as_str))
            .map(String::from)
            .next();
        let tags = render
            .get("tags")
            .and_then(Value::as_array)
            .map(|tags| {
                tags.iter()
                    .filter_map(Value::as_str)
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        RenderedVariant {
            provider_version_id: id_as_string(render.get("id")),
            audio_url,
            video_url: render
                .get("video_url")
                .and_then(Value::as_str)
                .map(String::from),
            cover_url,
            duration_secs,
            title,
            lyrics: render
                .get("lyrics")
                .and_then(Value::as_str)
                .map(String::from),
            style_tags: tags,
        }
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for MurekaAdapter {
    fn provider(&self) -> Provider {
        Provider::Mureka
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<SubmittedJob, ProviderError> {
        let model = request
            .model_version
            .as_deref()
            .unwrap_or(&self.config.default_model);
        let payload = MurekaGeneratePayload {
            lyrics: request.lyrics.as_deref().unwrap_or(""),
            prompt: &request.prompt,
            model,
        };
        let url = format!("{}/v1/song/generate", self.config.base_url);

        let body = with_retries("mureka.submit", || {
            self.send_json(self.client.post(&url).json(&payload))
        })
        .await?;

        let task_id = id_as_string(body.get("id").or_else(|| body.get("task_id")))
            .ok_or_else(|| ProviderError::Payload {
                provider: PROVIDER_NAME,
                detail: "generate response has no task id".into(),
            })?;

        tracing::info!(task_id, "Mureka generation queued");

        Ok(SubmittedJob {
            provider_task_id: task_id,
        })
    }

    fn interpret_callback(
        &self,
        payload: &Value,
    ) -> Result<CallbackEnvelope, ProviderError> {
        let task = payload
            .get("data")
            .filter(|d| d.is_object())
            .unwrap_or(payload);
        let task_id = id_as_string(task.get("task_id").or_else(|| task.get("id")))
            .ok_or_else(|| ProviderError::Payload {
                provider: PROVIDER_NAME,
                detail: "webhook has no task id".into(),
            })?;

        let result = Self::interpret_task(payload)?;
        Ok(CallbackEnvelope { task_id, result })
    }

    async fn poll_status(&self, task_id: &str) -> Result<NormalizedResult, ProviderError> {
        let url = format!("{}/v1/song/query/{}", self.config.base_url, task_id);

        let body = with_retries("mureka.poll_status", || {
            self.send_json(self.client.get(&url))
        })
        .await?;

        Self::interpret_task(&body)
    }

    async fn submit_stem(
        &self,
        request: &crate::adapter::StemRequest,
    ) -> Result<SubmittedJob, ProviderError> {
        let url = format!("{}/v1/song/stem", self.config.base_url);
        let payload = serde_json::json!({ "url": request.audio_url });

        let body = with_retries("mureka.submit_stem", || {
            self.send_json(self.client.post(&url).json(&payload))
        })
        .await?;

        let task_id = id_as_string(body.get("id").or_else(|| body.get("task_id")))
            .ok_or_else(|| ProviderError::Payload {
                provider: PROVIDER_NAME,
                detail: "stem response has no task id".into(),
            })?;

        tracing::info!(task_id, "Mureka stem separation queued");

        Ok(SubmittedJob {
            provider_task_id: task_id,
        })
    }
}

/// Mureka task ids arrive as strings or numbers depending on endpoint.
fn id_as_string(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
