//! Swappable text-generation capability.
//!
//! - `TextGenerator`: backend trait
//! - `CapabilityHandle`: shared owner of the active backend, switched atomically
//! - `CapabilityLease`: backend pinned for one command
//! - `HttpGenerator`: Anthropic and OpenAI-compatible HTTP backend

mod generator;
mod handle;
mod http;

pub use generator::{GenerationRequest, TextGenerator};
pub use handle::{CapabilityHandle, CapabilityLease, CapabilityState};
pub use http::{ApiFormat, HttpGenerator};
