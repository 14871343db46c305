//! Generation request, job record and job state machine.
//!
//! A [`GenerationRequest`] is what the client submits. Once the backend
//! accepts the job a [`JobRecord`] is created in [`JobState::Queued`] and
//! is moved forward by [`JobRecord::observe`] each time the backend is
//! polled. Terminal states never change again.

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::types::{JobId, Timestamp};

// ---------------------------------------------------------------------------
// Defaults and limits
// ---------------------------------------------------------------------------

/// Seed value meaning "assign a random seed at submission time".
pub const RANDOM_SEED: i64 = -1;

/// Default sampler step count.
pub const DEFAULT_STEPS: u32 = 20;

/// Default classifier-free guidance scale.
pub const DEFAULT_CFG: f64 = 7.0;

/// Default output edge length in pixels.
pub const DEFAULT_DIMENSION: u32 = 1024;

/// Negative prompt used when the request does not carry one.
pub const DEFAULT_NEGATIVE_PROMPT: &str = "blurry, low quality";

/// Maximum sampler step count accepted.
pub const MAX_STEPS: u32 = 150;

/// Maximum guidance scale accepted.
pub const MAX_CFG: f64 = 30.0;

/// Smallest accepted width/height.
pub const MIN_DIMENSION: u32 = 64;

/// Largest accepted width/height.
pub const MAX_DIMENSION: u32 = 4096;

/// Diagnostic attached to a completed job whose outputs name no artifact.
pub const MISSING_ARTIFACT_DIAGNOSTIC: &str = "generated but filename missing";

fn default_steps() -> u32 {
    DEFAULT_STEPS
}

fn default_cfg() -> f64 {
    DEFAULT_CFG
}

fn default_seed() -> i64 {
    RANDOM_SEED
}

// ---------------------------------------------------------------------------
// Request
// ---------------------------------------------------------------------------

/// Output image dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            width: DEFAULT_DIMENSION,
            height: DEFAULT_DIMENSION,
        }
    }
}

/// A single text-to-image request as submitted by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt: String,
    /// Checkpoint filename as known to the backend.
    pub model: String,
    #[serde(default = "default_steps")]
    pub steps: u32,
    /// Guidance scale.
    #[serde(default = "default_cfg")]
    pub cfg: f64,
    /// `-1` asks for a random seed; anything else is used verbatim.
    #[serde(default = "default_seed")]
    pub seed: i64,
    #[serde(default)]
    pub resolution: Resolution,
    #[serde(default)]
    pub negative_prompt: Option<String>,
}

impl GenerationRequest {
    /// Build a request with default sampler settings.
    pub fn new(prompt: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            prompt: prompt.into(),
            model: model.into(),
            steps: DEFAULT_STEPS,
            cfg: DEFAULT_CFG,
            seed: RANDOM_SEED,
            resolution: Resolution::default(),
            negative_prompt: None,
        }
    }

    /// Set an explicit seed (or [`RANDOM_SEED`]).
    pub fn with_seed(mut self, seed: i64) -> Self {
        self.seed = seed;
        self
    }

    /// Negative prompt text, falling back to [`DEFAULT_NEGATIVE_PROMPT`].
    pub fn negative_prompt_or_default(&self) -> &str {
        self.negative_prompt
            .as_deref()
            .unwrap_or(DEFAULT_NEGATIVE_PROMPT)
    }

    /// Whether the seed still has to be drawn.
    pub fn wants_random_seed(&self) -> bool {
        self.seed == RANDOM_SEED
    }

    /// Check required fields and numeric ranges.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.prompt.trim().is_empty() {
            return Err(CoreError::InvalidRequest(
                "prompt: must not be empty".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(CoreError::InvalidRequest(
                "model: must not be empty".to_string(),
            ));
        }
        if self.steps == 0 || self.steps > MAX_STEPS {
            return Err(CoreError::InvalidRequest(format!(
                "steps: must be between 1 and {MAX_STEPS}, got {}",
                self.steps
            )));
        }
        if !self.cfg.is_finite() || self.cfg <= 0.0 || self.cfg > MAX_CFG {
            return Err(CoreError::InvalidRequest(format!(
                "cfg: must be greater than 0 and at most {MAX_CFG}, got {}",
                self.cfg
            )));
        }
        if self.seed != RANDOM_SEED && !(0..=i64::from(u32::MAX)).contains(&self.seed) {
            return Err(CoreError::InvalidRequest(format!(
                "seed: must be -1 or between 0 and {}, got {}",
                u32::MAX,
                self.seed
            )));
        }
        for (name, value) in [
            ("width", self.resolution.width),
            ("height", self.resolution.height),
        ] {
            if !(MIN_DIMENSION..=MAX_DIMENSION).contains(&value) {
                return Err(CoreError::InvalidRequest(format!(
                    "resolution.{name}: must be between {MIN_DIMENSION} and {MAX_DIMENSION}, got {value}"
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Job state machine
// ---------------------------------------------------------------------------

/// Lifecycle state of a submitted job.
///
/// `Queued -> Processing -> Complete | Failed`. The backend never reports
/// "processing" explicitly; it is inferred when a poll finds neither a
/// completion nor an error marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Queued,
    Processing,
    Complete,
    Failed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Processing => "processing",
            Self::Complete => "complete",
            Self::Failed => "failed",
        }
    }
}

/// What a single poll of the backend revealed about a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobOutcome {
    /// Neither completed nor errored yet.
    Pending,
    /// Completed; `artifact` is the first output filename, if any.
    Completed { artifact: Option<String> },
    /// The backend reported an execution error.
    Failed { error: String },
}

/// Process-local record of one submitted job.
#[derive(Debug, Clone, Serialize)]
pub struct JobRecord {
    pub id: JobId,
    pub state: JobState,
    /// The original request with its seed already resolved.
    pub request: GenerationRequest,
    /// Artifact filename; set only in `Complete`.
    pub result_locator: Option<String>,
    /// Set on a completion that produced no artifact name.
    pub diagnostic: Option<String>,
    /// Backend error text; set only in `Failed`.
    pub error: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl JobRecord {
    /// Create the record for a freshly submitted job.
    pub fn queued(id: impl Into<JobId>, request: GenerationRequest, now: Timestamp) -> Self {
        Self {
            id: id.into(),
            state: JobState::Queued,
            request,
            result_locator: None,
            diagnostic: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Apply a poll outcome. Returns `true` if the state changed.
    ///
    /// Terminal records are left untouched.
    pub fn observe(&mut self, outcome: JobOutcome, now: Timestamp) -> bool {
        if self.state.is_terminal() {
            return false;
        }
        let previous = self.state;
        match outcome {
            JobOutcome::Pending => {
                self.state = JobState::Processing;
            }
            JobOutcome::Completed { artifact } => {
                self.state = JobState::Complete;
                match artifact.filter(|name| !name.is_empty()) {
                    Some(name) => self.result_locator = Some(name),
                    None => {
                        self.result_locator = None;
                        self.diagnostic = Some(MISSING_ARTIFACT_DIAGNOSTIC.to_string());
                    }
                }
            }
            JobOutcome::Failed { error } => {
                self.state = JobState::Failed;
                self.error = Some(error);
            }
        }
        self.updated_at = now;
        previous != self.state
    }

    /// Artifact filename, if the job completed with one.
    pub fn artifact(&self) -> Option<&str> {
        match self.state {
            JobState::Complete => self.result_locator.as_deref().filter(|s| !s.is_empty()),
            _ => None,
        }
    }
}
