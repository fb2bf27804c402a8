//! Suno adapter.
//!
//! Talks to the Suno HTTP API: `POST /api/v1/generate` to queue a job,
//! `GET /api/v1/generate/record-info?taskId=` to poll, and interprets
//! the webhook callbacks Suno posts back (`text` → `first` → `complete`
//! stages, or `error`). Suno mixes camelCase and snake_case field names
//! across payload generations, so extraction tolerates both.

use serde::Serialize;
use serde_json::Value;
use tuneforge_core::types::Provider;

use crate::adapter::{
    with_retries, CallbackEnvelope, GenerationRequest, LyricsOption, NormalizedResult,
    ProviderAdapter, RenderedVariant, SubmittedJob, UserInputKind, REQUEST_TIMEOUT,
};
use crate::error::ProviderError;

const PROVIDER_NAME: &str = "suno";

/// Task statuses that mean the provider gave up.
const FAILED_STATUSES: &[&str] = &[
    "CREATE_TASK_FAILED",
    "GENERATE_AUDIO_FAILED",
    "CALLBACK_EXCEPTION",
    "SENSITIVE_WORD_ERROR",
];

/// Connection settings for the Suno API.
#[derive(Debug, Clone)]
pub struct SunoConfig {
    /// Base URL, e.g. `https://api.sunoapi.org`.
    pub base_url: String,
    pub api_key: String,
    /// Public URL Suno should post callbacks to.
    pub callback_url: String,
    /// Model sent when the track does not pin one (e.g. `V4`).
    pub default_model: String,
}

impl SunoConfig {
    /// Load from `SUNO_*` environment variables. Returns `None` when no
    /// API key is configured — the adapter is simply not registered.
    pub fn from_env() -> Option<Self> {
        let api_key = std::env::var("SUNO_API_KEY").ok()?;
        Some(Self {
            base_url: std::env::var("SUNO_API_URL")
                .unwrap_or_else(|_| "https://api.sunoapi.org".into()),
            api_key,
            callback_url: std::env::var("SUNO_CALLBACK_URL")
                .unwrap_or_else(|_| "http://localhost:3000/api/v1/callbacks/suno".into()),
            default_model: std::env::var("SUNO_DEFAULT_MODEL").unwrap_or_else(|_| "V4".into()),
        })
    }
}

/// Adapter for the Suno music-generation API.
pub struct SunoAdapter {
    client: reqwest::Client,
    config: SunoConfig,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SunoGeneratePayload<'a> {
    prompt: &'a str,
    style: String,
    title: &'a str,
    custom_mode: bool,
    instrumental: bool,
    model: &'a str,
    call_back_url: &'a str,
}

impl SunoAdapter {
    pub fn new(config: SunoConfig) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .expect("Failed to build reqwest HTTP client");
        Self { client, config }
    }

    /// Create an adapter reusing an existing [`reqwest::Client`]
    /// (useful for connection pooling across adapters).
    pub fn with_client(client: reqwest::Client, config: SunoConfig) -> Self {
        Self { client, config }
    }

    /// Execute a request and surface non-2xx responses as
    /// [`ProviderError::Api`] with the raw body preserved.
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

    /// Map a `record-info` response body to a [`NormalizedResult`].
    fn interpret_record(body: &Value) -> Result<NormalizedResult, ProviderError> {
        // Suno wraps everything in { code, msg, data }.
        let code = body.get("code").and_then(Value::as_i64).unwrap_or(200);
        if code >= 400 {
            return Ok(NormalizedResult::Failed {
                reason: str_field(body, &["msg"])
                    .unwrap_or_else(|| format!("Suno query failed with code {code}")),
            });
        }

        let data = body.get("data").unwrap_or(&Value::Null);
        let status = str_field(data, &["status"]).ok_or_else(|| ProviderError::Payload {
            provider: PROVIDER_NAME,
            detail: "record-info response has no status".into(),
        })?;

        if status == "SUCCESS" {
            let clips = data
                .pointer("/response/sunoData")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let variants: Vec<RenderedVariant> =
                clips.iter().map(Self::variant_from_clip).collect();

            if variants.iter().all(|v| v.audio_url.is_none()) {
                // Success without any playable render is a failure: the
                // track must never complete with zero audio.
                return Ok(NormalizedResult::Failed {
                    reason: "Suno reports success but no audio URL".into(),
                });
            }
            return Ok(NormalizedResult::Completed { variants });
        }

        if FAILED_STATUSES.contains(&status.as_str()) {
            let reason = str_field(data, &["errorMessage", "error_message"])
                .filter(|m| !m.is_empty())
                .unwrap_or_else(|| format!("Suno generation failed ({status})"));
            return Ok(NormalizedResult::Failed { reason });
        }

        // PENDING / TEXT_SUCCESS / FIRST_SUCCESS, plus anything Suno
        // invents later, counts as still running.
        Ok(NormalizedResult::InProgress {
            stage: Some(status.to_ascii_lowercase()),
        })
    }

    /// Normalize one clip object. Handles both the camelCase
    /// record-info shape and the snake_case callback shape.
    fn variant_from_clip(clip: &Value) -> RenderedVariant {
        let audio_url = str_field(clip, &["audioUrl", "audio_url"])
            .or_else(|| str_field(clip, &["streamAudioUrl", "stream_audio_url"]));
        let video_url = str_field(clip, &["videoUrl", "video_url"]);
        let cover_url = str_field(clip, &["imageUrl", "image_url"]);
        let duration_secs = clip
            .get("duration")
            .and_then(Value::as_f64)
            .map(|d| d.round() as i32);
        let tags = str_field(clip, &["tags"])
            .map(|raw| {
                raw.split([',', ';'])
                    .map(str::trim)
                    .filter(|t| !t.is_empty())
                    .map(String::from)
                    .collect()
            })
            .unwrap_or_default();

        RenderedVariant {
            provider_version_id: str_field(clip, &["id"]),
            audio_url,
            video_url,
            cover_url,
            duration_secs,
            title: str_field(clip, &["title"]),
            // Suno returns the sung text in the clip's `prompt` field.
            lyrics: str_field(clip, &["prompt"]),
            style_tags: tags,
        }
    }

    /// Extract the clip array from a callback payload. Suno has shipped
    /// `{ data: { data: [...] } }`, `{ data: [...] }`, and a bare
    /// single-clip object over time.
    fn callback_clips(payload: &Value) -> Vec<Value> {
        if let Some(clips) = payload.pointer("/data/data").and_then(Value::as_array) {
            return clips.clone();
        }
        if let Some(clips) = payload.get("data").and_then(Value::as_array) {
            return clips.clone();
        }
        if str_field(payload, &["audioUrl", "audio_url"]).is_some() {
            return vec![payload.clone()];
        }
        Vec::new()
    }

    /// Extract the lyric drafts from a lyrics-task callback, if present.
    fn callback_lyrics_options(payload: &Value) -> Vec<LyricsOption> {
        let Some(entries) = payload
            .pointer("/data/lyricsData")
            .or_else(|| payload.pointer("/data/lyrics_data"))
            .and_then(Value::as_array)
        else {
            return Vec::new();
        };

        entries
            .iter()
            .filter_map(|entry| {
                let text = str_field(entry, &["text", "lyrics"])?;
                Some(LyricsOption {
                    title: str_field(entry, &["title"]),
                    text,
                })
            })
            .collect()
    }
}

#[async_trait::async_trait]
impl ProviderAdapter for SunoAdapter {
    fn provider(&self) -> Provider {
        Provider::Suno
    }

    async fn submit(&self, request: &GenerationRequest) -> Result<SubmittedJob, ProviderError> {
        let model = request
            .model_version
            .as_deref()
            .unwrap_or(&self.config.default_model);
        let payload = SunoGeneratePayload {
            prompt: request.lyrics.as_deref().unwrap_or(&request.prompt),
            style: request.style_tags.join(", "),
            title: &request.title,
            custom_mode: request.lyrics.is_some(),
            instrumental: !request.has_vocals,
            model,
            call_back_url: &self.config.callback_url,
        };
        let url = format!("{}/api/v1/generate", self.config.base_url);

        let body = with_retries("suno.submit", || {
            self.send_json(self.client.post(&url).json(&payload))
        })
        .await?;

        // Success envelope: { code: 200, msg, data: { taskId } }.
        let code = body.get("code").and_then(Value::as_i64).unwrap_or(200);
        if code != 200 {
            return Err(ProviderError::Api {
                provider: PROVIDER_NAME,
                status: code as u16,
                body: str_field(&body, &["msg"]).unwrap_or_default(),
            });
        }

        let task_id = body
            .pointer("/data/taskId")
            .or_else(|| body.pointer("/data/task_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Payload {
                provider: PROVIDER_NAME,
                detail: "generate response has no taskId".into(),
            })?;

        tracing::info!(task_id, "Suno generation queued");

        Ok(SubmittedJob {
            provider_task_id: task_id.to_string(),
        })
    }

    fn interpret_callback(
        &self,
        payload: &Value,
    ) -> Result<CallbackEnvelope, ProviderError> {
        let task_id = str_field_at(payload, &["/data/task_id", "/data/taskId", "/task_id", "/taskId"])
            .ok_or_else(|| ProviderError::Payload {
                provider: PROVIDER_NAME,
                detail: "callback has no task id".into(),
            })?;

        let code = payload.get("code").and_then(Value::as_i64).unwrap_or(200);
        let stage = str_field_at(payload, &["/data/callbackType", "/data/callback_type"])
            .unwrap_or_else(|| "complete".to_string());

        let result = if code >= 400 || stage == "error" {
            NormalizedResult::Failed {
                reason: str_field(payload, &["msg"])
                    .filter(|m| !m.is_empty())
                    .unwrap_or_else(|| format!("Suno callback error (stage {stage}, code {code})")),
            }
        } else {
            let lyrics_options = Self::callback_lyrics_options(payload);
            if !lyrics_options.is_empty() {
                // A lyrics task paused for a human choice among drafts.
                NormalizedResult::RequiresUserInput {
                    kind: UserInputKind::LyricsSelection,
                    job_id: task_id.clone(),
                    options: lyrics_options,
                }
            } else if stage == "complete" {
                let variants: Vec<RenderedVariant> = Self::callback_clips(payload)
                    .iter()
                    .map(Self::variant_from_clip)
                    .collect();
                if variants.iter().all(|v| v.audio_url.is_none()) {
                    NormalizedResult::Failed {
                        reason: "Suno callback complete but no audio URL".into(),
                    }
                } else {
                    NormalizedResult::Completed { variants }
                }
            } else {
                // `text` and `first` stages arrive before the final
                // render set; treat them as progress hints.
                NormalizedResult::InProgress { stage: Some(stage) }
            }
        };

        Ok(CallbackEnvelope { task_id, result })
    }

    async fn poll_status(&self, task_id: &str) -> Result<NormalizedResult, ProviderError> {
        let url = format!(
            "{}/api/v1/generate/record-info?taskId={}",
            self.config.base_url, task_id
        );

        let body = with_retries("suno.poll_status", || {
            self.send_json(self.client.get(&url))
        })
        .await?;

        Self::interpret_record(&body)
    }

    async fn cancel(&self, task_id: &str) -> Result<(), ProviderError> {
        // Suno has no cancellation endpoint; local state is
        // authoritative, so this is a logged no-op.
        tracing::info!(task_id, "Suno has no remote cancel; marking locally only");
        Ok(())
    }

    async fn submit_stem(
        &self,
        request: &crate::adapter::StemRequest,
    ) -> Result<SubmittedJob, ProviderError> {
        let url = format!("{}/api/v1/vocal-removal/generate", self.config.base_url);
        let payload = serde_json::json!({
            "audioUrl": request.audio_url,
            "type": request.separation_mode,
            "callBackUrl": self.config.callback_url,
        });

        let body = with_retries("suno.submit_stem", || {
            self.send_json(self.client.post(&url).json(&payload))
        })
        .await?;

        let task_id = body
            .pointer("/data/taskId")
            .or_else(|| body.pointer("/data/task_id"))
            .and_then(Value::as_str)
            .ok_or_else(|| ProviderError::Payload {
                provider: PROVIDER_NAME,
                detail: "vocal-removal response has no taskId".into(),
            })?;

        tracing::info!(task_id, mode = %request.separation_mode, "Suno stem separation queued");

        Ok(SubmittedJob {
            provider_task_id: task_id.to_string(),
        })
    }
}

// ---------------------------------------------------------------------------
// Tolerant field extraction
// ---------------------------------------------------------------------------

/// First non-empty string among the given keys of a JSON object.
fn str_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| value.get(k).and_then(Value::as_str))
        .map(str::to_string)
        .next()
}

/// First string among the given JSON pointers.
fn str_field_at(value: &Value, pointers: &[&str]) -> Option<String> {
    pointers
        .iter()
        .filter_map(|p| value.pointer(p).and_then(Value::as_str))
        .map(str::to_string)
        .next()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;
    use serde_json::json;

    fn adapter() -> SunoAdapter {
        SunoAdapter::new(SunoConfig {
            base_url: "https://api.example.test".into(),
            api_key: "key".into(),
            callback_url: "https://studio.example.test/callbacks/suno".into(),
            default_model: "V4".into(),
        })
    }

    #[test]
    fn record_success_yields_all_variants() {
        let body = json!({
            "code": 200,
            "data": {
                "taskId": "t-1",
                "status": "SUCCESS",
                "response": {
                    "sunoData": [
                        {"id": "clip-a", "audioUrl": "https://cdn/a.mp3", "imageUrl": "https://cdn/a.jpg",
                         "title": "Take A", "duration": 61.4, "tags": "ambient, pad"},
                        {"id": "clip-b", "audioUrl": "https://cdn/b.mp3", "duration": 58.7},
                    ],
                },
            },
        });

        let result = SunoAdapter::interpret_record(&body).unwrap();
        assert_matches!(result, NormalizedResult::Completed { variants } => {
            assert_eq!(variants.len(), 2);
            assert_eq!(variants[0].provider_version_id.as_deref(), Some("clip-a"));
            assert_eq!(variants[0].duration_secs, Some(61));
            assert_eq!(variants[0].style_tags, vec!["ambient", "pad"]);
            assert_eq!(variants[1].audio_url.as_deref(), Some("https://cdn/b.mp3"));
        });
    }

    #[test]
    fn record_success_without_audio_is_failure() {
        let body = json!({
            "code": 200,
            "data": {"status": "SUCCESS", "response": {"sunoData": [{"id": "x"}]}},
        });
        let result = SunoAdapter::interpret_record(&body).unwrap();
        assert_matches!(result, NormalizedResult::Failed { reason } => {
            assert!(reason.contains("no audio URL"));
        });
    }

    #[test]
    fn record_failure_preserves_provider_reason() {
        let body = json!({
            "code": 200,
            "data": {"status": "GENERATE_AUDIO_FAILED", "errorMessage": "content policy"},
        });
        let result = SunoAdapter::interpret_record(&body).unwrap();
        assert_matches!(result, NormalizedResult::Failed { reason } => {
            assert_eq!(reason, "content policy");
        });
    }

    #[test]
    fn record_intermediate_statuses_are_in_progress() {
        for status in ["PENDING", "TEXT_SUCCESS", "FIRST_SUCCESS"] {
            let body = json!({"code": 200, "data": {"status": status}});
            let result = SunoAdapter::interpret_record(&body).unwrap();
            assert_matches!(result, NormalizedResult::InProgress { stage: Some(s) } => {
                assert_eq!(s, status.to_ascii_lowercase());
            });
        }
    }

    #[test]
    fn record_without_status_is_payload_error() {
        let body = json!({"code": 200, "data": {}});
        assert_matches!(
            SunoAdapter::interpret_record(&body),
            Err(ProviderError::Payload { .. })
        );
    }

    #[test]
    fn callback_complete_maps_to_completed() {
        let payload = json!({
            "code": 200,
            "data": {
                "callbackType": "complete",
                "task_id": "t-9",
                "data": [
                    {"id": "c1", "audio_url": "https://cdn/1.mp3", "image_url": "https://cdn/1.webp",
                     "prompt": "la la la", "duration": 60.2},
                    {"id": "c2", "stream_audio_url": "https://cdn/2-stream.mp3"},
                ],
            },
        });

        let envelope = adapter().interpret_callback(&payload).unwrap();
        assert_eq!(envelope.task_id, "t-9");
        assert_matches!(envelope.result, NormalizedResult::Completed { variants } => {
            assert_eq!(variants.len(), 2);
            assert_eq!(variants[0].lyrics.as_deref(), Some("la la la"));
            // Stream URL is an acceptable audio fallback.
            assert_eq!(variants[1].audio_url.as_deref(), Some("https://cdn/2-stream.mp3"));
        });
    }

    #[test]
    fn callback_error_code_maps_to_failed() {
        let payload = json!({
            "code": 451,
            "msg": "flagged content",
            "data": {"callbackType": "text", "task_id": "t-9"},
        });
        let envelope = adapter().interpret_callback(&payload).unwrap();
        assert_matches!(envelope.result, NormalizedResult::Failed { reason } => {
            assert_eq!(reason, "flagged content");
        });
    }

    #[test]
    fn callback_early_stage_is_in_progress() {
        let payload = json!({
            "code": 200,
            "data": {"callbackType": "first", "task_id": "t-9", "data": []},
        });
        let envelope = adapter().interpret_callback(&payload).unwrap();
        assert_matches!(envelope.result, NormalizedResult::InProgress { stage: Some(s) } => {
            assert_eq!(s, "first");
        });
    }

    #[test]
    fn callback_without_task_id_is_rejected() {
        let payload = json!({"code": 200, "data": {"callbackType": "complete"}});
        assert_matches!(
            adapter().interpret_callback(&payload),
            Err(ProviderError::Payload { .. })
        );
    }

    #[test]
    fn callback_lyrics_drafts_require_user_input() {
        let payload = json!({
            "code": 200,
            "data": {
                "callbackType": "text",
                "task_id": "lyr-1",
                "lyricsData": [
                    {"title": "Draft 1", "text": "verse one"},
                    {"title": "Draft 2", "text": "verse two"},
                ],
            },
        });
        let envelope = adapter().interpret_callback(&payload).unwrap();
        assert_matches!(envelope.result, NormalizedResult::RequiresUserInput { kind, job_id, options } => {
            assert_eq!(kind, UserInputKind::LyricsSelection);
            assert_eq!(job_id, "lyr-1");
            assert_eq!(options.len(), 2);
            assert_eq!(options[0].text, "verse one");
        });
    }

    #[test]
    fn callback_tolerates_bare_single_clip_payload() {
        let payload = json!({
            "task_id": "t-3",
            "audio_url": "https://cdn/only.mp3",
        });
        let clips = SunoAdapter::callback_clips(&payload);
        assert_eq!(clips.len(), 1);
    }
}
