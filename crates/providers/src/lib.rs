//! Provider adapters for external music-generation APIs.
//!
//! [`ProviderAdapter`](adapter::ProviderAdapter) is the single seam
//! between the orchestration core and the heterogeneous provider HTTP
//! APIs. Each concrete adapter ([`suno::SunoAdapter`],
//! [`mureka::MurekaAdapter`]) absorbs its provider's request shapes,
//! status vocabulary, and callback quirks entirely; nothing above this
//! crate branches on provider identity except to pick an adapter from
//! the [`ProviderRegistry`](adapter::ProviderRegistry).

pub mod adapter;
pub mod error;
pub mod mureka;
pub mod suno;

pub use adapter::{
    CallbackEnvelope, GenerationRequest, LyricsOption, NormalizedResult, ProviderAdapter,
    ProviderRegistry, RenderedVariant, StemRequest, SubmittedJob, UserInputKind,
};
pub use error::ProviderError;
pub use mureka::{MurekaAdapter, MurekaConfig};
pub use suno::{SunoAdapter, SunoConfig};
