//! Request handlers.
//!
//! Handlers stay thin: they extract inputs, call the [`JobOrchestrator`]
//! and shape its results into response bodies. Errors map through
//! [`AppError`].
//!
//! [`JobOrchestrator`]: imagegen_pipeline::JobOrchestrator
//! [`AppError`]: crate::error::AppError

pub mod generation;
pub mod models;
