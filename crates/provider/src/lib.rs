//! The streaming completion contract consumed by the turn engine.
//!
//! Vendor adapters live outside this repository; the engine only sees the
//! [`Provider`] trait. The [`scripted`] module ships a deterministic
//! implementation used by the integration tests.

pub mod scripted;
pub mod traits;

pub use scripted::ScriptedProvider;
pub use traits::{BoxStream, CompletionRequest, Provider, ProviderEvent};
