//! Domain types and pure logic for the image generation service.
//!
//! - [`generation`] - requests, job records and the job state machine.
//! - [`workflow`] - templates and request-to-workflow translation.
//! - [`backend`] - the [`backend::ComputeBackend`] seam and its status type.
//! - [`models`] - model catalog built from backend capabilities.

pub mod backend;
pub mod error;
pub mod generation;
pub mod models;
pub mod types;
pub mod workflow;
