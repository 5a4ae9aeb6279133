use thiserror::Error;

/// Failures of the generation flow, normalized so `Display` is the exact
/// user-facing message.
#[derive(Debug, Error)]
pub enum FlowError {
    /// Transport failure or non-2xx response. Carries the response body text,
    /// or "HTTP {status}" when the body was empty.
    #[error("{0}")]
    Http(String),

    /// A 2xx response whose payload did not match the expected shape.
    #[error("{0}")]
    Decode(String),

    /// The backend reported the generation job as failed.
    #[error("{0}")]
    JobFailed(String),

    /// Polling exhausted (or the create response carried no reference) without
    /// ever producing a story id.
    #[error("Story ID missing")]
    StoryIdMissing,

    /// The poll task was cancelled by `reset` or a newer `start`.
    #[error("Generation cancelled")]
    Cancelled,
}
