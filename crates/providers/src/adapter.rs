//! The provider adapter seam: one uniform capability interface over
//! heterogeneous generation APIs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tuneforge_core::retry::{retry_with_backoff, RetryConfig};
use tuneforge_core::types::{DbId, Provider};

use crate::error::ProviderError;

/// Timeout for a single provider HTTP attempt, independent of the
/// retry executor's overall budget. A hung connection must not stall a
/// worker past this bound.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

// ---------------------------------------------------------------------------
// Request / result types
// ---------------------------------------------------------------------------

/// A provider-agnostic generation request, already sanitized.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The track this request belongs to (used for callback correlation).
    pub track_id: DbId,
    pub title: String,
    pub prompt: String,
    pub lyrics: Option<String>,
    pub style_tags: Vec<String>,
    pub has_vocals: bool,
    pub model_version: Option<String>,
}

/// The provider's acknowledgment of a queued generation.
#[derive(Debug, Clone)]
pub struct SubmittedJob {
    /// Provider-assigned task id; every later callback and poll carries it.
    pub provider_task_id: String,
}

/// A derived stem-separation request.
#[derive(Debug, Clone)]
pub struct StemRequest {
    /// Source audio to separate (the preferred version's render).
    pub audio_url: String,
    /// e.g. "vocals", "drums".
    pub stem_type: String,
    /// Provider separation mode (e.g. "split_stem").
    pub separation_mode: String,
}

/// One rendered output as reported by a provider, normalized.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RenderedVariant {
    pub provider_version_id: Option<String>,
    pub audio_url: Option<String>,
    pub video_url: Option<String>,
    pub cover_url: Option<String>,
    pub duration_secs: Option<i32>,
    pub title: Option<String>,
    pub lyrics: Option<String>,
    pub style_tags: Vec<String>,
}

/// A lyrics draft offered to the user when a provider pauses for a
/// human choice.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LyricsOption {
    pub title: Option<String>,
    pub text: String,
}

/// Why a provider paused and what it needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum UserInputKind {
    /// The provider generated several lyric drafts and awaits a choice.
    LyricsSelection,
}

/// Provider-neutral interpretation of a callback payload or a poll
/// response. This is the only vocabulary the orchestration core speaks.
#[derive(Debug, Clone)]
pub enum NormalizedResult {
    /// Generation finished; one or more renders are available.
    Completed { variants: Vec<RenderedVariant> },
    /// Generation failed; `reason` is the provider's text, verbatim.
    Failed { reason: String },
    /// Still running; `stage` is a provider-reported progress hint.
    InProgress { stage: Option<String> },
    /// Paused awaiting a human decision (e.g. picking lyrics).
    RequiresUserInput {
        kind: UserInputKind,
        job_id: String,
        options: Vec<LyricsOption>,
    },
}

/// A callback payload decoded far enough to route: which task it is
/// about, and what it means.
#[derive(Debug, Clone)]
pub struct CallbackEnvelope {
    pub task_id: String,
    pub result: NormalizedResult,
}

// ---------------------------------------------------------------------------
// Adapter trait
// ---------------------------------------------------------------------------

/// Uniform capability interface implemented once per provider.
///
/// Implementations absorb all provider quirks — field names,
/// multi-result shapes, error taxonomies — and run their own transport
/// retries (transient failures only) under the per-attempt
/// [`REQUEST_TIMEOUT`].
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    /// Which provider this adapter talks to.
    fn provider(&self) -> Provider;

    /// Submit a generation job. Returns the provider-assigned task id
    /// or a synchronous error.
    async fn submit(&self, request: &GenerationRequest) -> Result<SubmittedJob, ProviderError>;

    /// Interpret a webhook callback body. Pure — no I/O.
    fn interpret_callback(
        &self,
        payload: &serde_json::Value,
    ) -> Result<CallbackEnvelope, ProviderError>;

    /// Query the provider for the current state of a task.
    async fn poll_status(&self, task_id: &str) -> Result<NormalizedResult, ProviderError>;

    /// Ask the provider to stop a task. Advisory: local state is
    /// authoritative regardless of whether the remote job actually
    /// stops, so the default implementation is a no-op.
    async fn cancel(&self, _task_id: &str) -> Result<(), ProviderError> {
        Ok(())
    }

    /// Queue a derived stem-separation job. Providers without a stem
    /// endpoint reject the request.
    async fn submit_stem(&self, _request: &StemRequest) -> Result<SubmittedJob, ProviderError> {
        Err(ProviderError::Payload {
            provider: self.provider().as_str(),
            detail: "stem separation not supported by this provider".into(),
        })
    }
}

/// Run one provider call with the standard transport-retry policy.
pub(crate) async fn with_retries<T, F, Fut>(
    context: &'static str,
    operation: F,
) -> Result<T, ProviderError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, ProviderError>>,
{
    retry_with_backoff(
        operation,
        &RetryConfig::provider_api(),
        ProviderError::is_transient,
        |error, attempt| {
            tracing::warn!(context, attempt, error = %error, "Provider call failed, retrying");
        },
    )
    .await
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

/// Adapter lookup: the single place where a provider name turns into a
/// concrete adapter instance.
pub struct ProviderRegistry {
    adapters: HashMap<Provider, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self {
            adapters: HashMap::new(),
        }
    }

    /// Register an adapter, replacing any previous one for the same
    /// provider.
    pub fn register(&mut self, adapter: Arc<dyn ProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    /// Look up the adapter for a provider, if configured.
    pub fn get(&self, provider: Provider) -> Option<Arc<dyn ProviderAdapter>> {
        self.adapters.get(&provider).cloned()
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}
