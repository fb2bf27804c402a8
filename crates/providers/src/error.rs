//! Provider-facing error type and transient/fatal classification.

/// Errors from the provider adapter layer.
///
/// Provider-originated failures are data, not programming errors: the
/// raw status and body are preserved verbatim so they can be recorded
/// on the track for support diagnosis.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    /// The HTTP request itself failed (network, DNS, TLS, timeout).
    #[error("HTTP request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider returned a non-success status code.
    #[error("{provider} API error ({status}): {body}")]
    Api {
        provider: &'static str,
        /// HTTP status code.
        status: u16,
        /// Raw response body for debugging.
        body: String,
    },

    /// The provider returned a body we could not interpret.
    #[error("Unexpected {provider} payload: {detail}")]
    Payload {
        provider: &'static str,
        detail: String,
    },
}

impl ProviderError {
    /// Whether retrying could plausibly succeed.
    ///
    /// Transient: timeouts, connection failures, 429, and 5xx. Fatal:
    /// every other 4xx (bad request, unauthorized, payment required)
    /// and payload-shape mismatches — retrying those only burns budget.
    pub fn is_transient(&self) -> bool {
        match self {
            ProviderError::Request(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.status().is_some_and(|s| {
                        s.as_u16() == 429 || s.is_server_error()
                    })
            }
            ProviderError::Api { status, .. } => *status == 429 || *status >= 500,
            ProviderError::Payload { .. } => false,
        }
    }
}
