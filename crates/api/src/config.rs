//! Server configuration loaded from environment variables.
//!
//! All fields have sensible defaults suitable for local development.
//! In production, override via environment variables. Malformed values
//! fail fast at startup — a misconfigured limit must never reach
//! request time.

use std::time::Duration;

use tuneforge_core::rate_limit::{quotas, RateLimitQuota};
use tuneforge_providers::{MurekaConfig, SunoConfig};

/// Top-level server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `0.0.0.0`).
    pub host: String,
    /// Bind port (default: `3000`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`).
    pub request_timeout_secs: u64,
    /// Seconds between stuck-track reconciliation sweeps (default: `60`).
    pub stuck_scan_interval_secs: u64,
    /// Per-operation request quotas.
    pub rate_limits: RateLimitSettings,
    /// Provider connection settings (absent adapters are simply not
    /// registered).
    pub providers: ProviderSettings,
}

/// Request quotas per operation class. Defaults match the product
/// presets; each is overridable via `RATE_LIMIT_<CLASS>` env vars.
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    pub music_generation: RateLimitQuota,
    pub prompt_improvement: RateLimitQuota,
    pub lyrics_generation: RateLimitQuota,
    pub stem_separation: RateLimitQuota,
    pub general_api: RateLimitQuota,
}

/// Optional provider credentials.
#[derive(Debug, Clone)]
pub struct ProviderSettings {
    pub suno: Option<SunoConfig>,
    pub mureka: Option<MurekaConfig>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                 |
    /// |--------------------------------|-------------------------|
    /// | `HOST`                         | `0.0.0.0`               |
    /// | `PORT`                         | `3000`                  |
    /// | `CORS_ORIGINS`                 | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`         | `30`                    |
    /// | `STUCK_SCAN_INTERVAL_SECS`     | `60`                    |
    /// | `RATE_LIMIT_MUSIC_GENERATION`  | `10` per 60 s           |
    /// | `RATE_LIMIT_STEM_SEPARATION`   | `5` per 60 s            |
    /// | `SUNO_API_URL` / `SUNO_API_KEY` / `SUNO_CALLBACK_URL`    | — |
    /// | `MUREKA_API_URL` / `MUREKA_API_KEY`                      | — |
    pub fn from_env() -> Self {
        let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".into());

        let port: u16 = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".into())
            .parse()
            .expect("PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("CORS_ORIGINS")
            .unwrap_or_else(|_| "http://localhost:5173".into())
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("REQUEST_TIMEOUT_SECS must be a valid u64");

        let stuck_scan_interval_secs: u64 = std::env::var("STUCK_SCAN_INTERVAL_SECS")
            .unwrap_or_else(|_| "60".into())
            .parse()
            .expect("STUCK_SCAN_INTERVAL_SECS must be a valid u64");

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            stuck_scan_interval_secs,
            rate_limits: RateLimitSettings::from_env(),
            providers: ProviderSettings::from_env(),
        }
    }
}

impl RateLimitSettings {
    /// Load quotas, falling back to the product presets. Panics at
    /// startup on a zero limit — this is the configuration-load
    /// validation the limiter itself relies on.
    pub fn from_env() -> Self {
        Self {
            music_generation: quota_from_env("RATE_LIMIT_MUSIC_GENERATION", quotas::music_generation()),
            prompt_improvement: quota_from_env("RATE_LIMIT_PROMPT_IMPROVEMENT", quotas::prompt_improvement()),
            lyrics_generation: quota_from_env("RATE_LIMIT_LYRICS_GENERATION", quotas::lyrics_generation()),
            stem_separation: quota_from_env("RATE_LIMIT_STEM_SEPARATION", quotas::stem_separation()),
            general_api: quota_from_env("RATE_LIMIT_GENERAL_API", quotas::general_api()),
        }
    }
}

/// Read `<var>` as a max-requests override on a 60-second window.
fn quota_from_env(var: &str, default: RateLimitQuota) -> RateLimitQuota {
    match std::env::var(var) {
        Ok(raw) => {
            let max: u32 = raw
                .parse()
                .unwrap_or_else(|_| panic!("{var} must be a positive integer"));
            RateLimitQuota::new(max, Duration::from_secs(60))
                .unwrap_or_else(|e| panic!("{var} is invalid: {e}"))
        }
        Err(_) => default,
    }
}

impl ProviderSettings {
    /// Load provider credentials. A provider with no API key is left
    /// unconfigured; submissions naming it get `PROVIDER_UNAVAILABLE`.
    pub fn from_env() -> Self {
        Self {
            suno: SunoConfig::from_env(),
            mureka: MurekaConfig::from_env(),
        }
    }
}
