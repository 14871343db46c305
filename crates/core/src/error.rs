/// Domain errors shared by the workflow builder, the backend client and
/// the job orchestrator.
///
/// Every backend transport failure is normalized into one of these
/// variants before it leaves the client crate. A job that the backend
/// reports as failed is *not* an error; it is a terminal `Failed` record.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Caller error: a required field is missing or out of range.
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The compute backend is unreachable, timed out, or answered 5xx.
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    /// No workflow template is registered for the requested kind, or the
    /// template does not contain a node the bindings refer to.
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// The backend answered the submission without a usable job id.
    #[error("Submission rejected: {0}")]
    SubmissionRejected(String),

    /// The job id is unknown to the status store or to the backend.
    #[error("Job {0} not found")]
    JobNotFound(String),

    /// The caller asked for a result before the job completed with one.
    #[error("Result not ready: {0}")]
    ResultNotReady(String),

    /// The backend lost, or never produced, the named artifact.
    #[error("Artifact {0} not found")]
    ArtifactNotFound(String),
}
