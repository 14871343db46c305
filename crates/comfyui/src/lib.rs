//! ComfyUI REST client library.
//!
//! Provides the HTTP API wrapper used as the service's compute backend
//! and the typed view of ComfyUI's prompt history documents.

pub mod api;
pub mod history;

pub use api::{ComfyUIApi, Timeouts};
