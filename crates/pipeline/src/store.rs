//! Process-local job status table.
//!
//! The outer [`RwLock`] guards only the id -> record map and is held for
//! lookups, inserts and sweeps. Each record sits behind its own [`Mutex`],
//! so a read-modify-write of one job serializes against other writers of
//! the same job without touching any other id. Neither lock is ever held
//! across a backend call.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Duration;
use imagegen_core::generation::JobRecord;
use imagegen_core::types::{JobId, Timestamp};
use tokio::sync::{Mutex, RwLock};

/// Shared handle to a single job's record.
pub type JobHandle = Arc<Mutex<JobRecord>>;

/// How long records are kept before a sweep removes them.
#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Age (since last update) after which a terminal record is dropped.
    pub terminal_ttl: Duration,
    /// Age (since last update) after which any record is dropped, even if
    /// the client stopped polling before the job finished.
    pub orphan_ttl: Duration,
}

impl RetentionPolicy {
    /// Terminal records live `ttl`; unfinished ones three times as long.
    pub fn from_ttl(ttl: Duration) -> Self {
        Self {
            terminal_ttl: ttl,
            orphan_ttl: ttl * 3,
        }
    }

    fn expired(&self, record: &JobRecord, now: Timestamp) -> bool {
        let age = now - record.updated_at;
        if record.state.is_terminal() {
            age >= self.terminal_ttl
        } else {
            age >= self.orphan_ttl
        }
    }
}

/// In-memory mapping from job id to job record. Not durable.
#[derive(Debug, Default)]
pub struct StatusStore {
    jobs: RwLock<HashMap<JobId, JobHandle>>,
}

impl StatusStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert (or replace) a record and return a snapshot of it.
    pub async fn insert(&self, record: JobRecord) -> JobRecord {
        let snapshot = record.clone();
        self.jobs
            .write()
            .await
            .insert(record.id.clone(), Arc::new(Mutex::new(record)));
        snapshot
    }

    /// Handle for per-id read-modify-write.
    pub async fn handle(&self, id: &str) -> Option<JobHandle> {
        self.jobs.read().await.get(id).cloned()
    }

    /// Snapshot of a record.
    pub async fn get(&self, id: &str) -> Option<JobRecord> {
        let handle = self.handle(id).await?;
        let record = handle.lock().await;
        Some(record.clone())
    }

    pub async fn len(&self) -> usize {
        self.jobs.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remove records the policy considers expired. Returns how many.
    ///
    /// Records that are being updated at the moment of the sweep are kept
    /// and reconsidered on the next one.
    pub async fn evict_expired(&self, policy: &RetentionPolicy, now: Timestamp) -> usize {
        let mut jobs = self.jobs.write().await;
        let before = jobs.len();
        jobs.retain(|_, handle| match handle.try_lock() {
            Ok(record) => !policy.expired(&record, now),
            Err(_) => true,
        });
        before - jobs.len()
    }
}
