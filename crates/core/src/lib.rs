//! TuneForge domain core.
//!
//! Pure building blocks shared by every other crate in the workspace:
//!
//! - [`types`] — common id/time aliases and the [`Provider`](types::Provider) enum.
//! - [`error`] — the [`CoreError`](error::CoreError) domain error type.
//! - [`sanitize`] — input sanitization for free-text and numeric fields.
//! - [`rate_limit`] — in-memory fixed-window request admission control.
//! - [`retry`] — bounded exponential-backoff execution of fallible
//!   async operations.
//!
//! This crate has zero internal dependencies so it can be used by the
//! API server, the worker binary, and any future CLI tooling alike.

pub mod error;
pub mod idempotency;
pub mod rate_limit;
pub mod retry;
pub mod sanitize;
pub mod types;
