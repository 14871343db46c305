/// Backend-assigned job identifier (ComfyUI `prompt_id`).
pub type JobId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
