//! Generation job orchestration.
//!
//! - [`orchestrator::JobOrchestrator`] - submit / poll / fetch-result.
//! - [`store::StatusStore`] - in-memory job table with per-job locking.
//! - [`retention`] - background eviction of stale records.

pub mod orchestrator;
pub mod retention;
pub mod store;

pub use orchestrator::{Artifact, JobOrchestrator};
pub use store::{RetentionPolicy, StatusStore};
