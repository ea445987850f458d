/// Failure taxonomy for the recommendation pipeline.
///
/// Recoverable failures (`RetrievalError`) are absorbed by the pipeline and
/// surfaced as warnings on a successful result. Fatal failures reach the
/// caller as a single tagged `FailureReason`, never as a raw transport error.

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Invalid(String),
}

/// The document store could not be reached or refused the request.
/// Always recoverable: the pipeline degrades to generation without context.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("search transport failed: {0}")]
    Transport(String),

    #[error("search credentials rejected: {0}")]
    Auth(String),
}

/// The fixed prompt skeleton alone exceeds the configured budget. This is a
/// configuration bug, not a runtime condition, and is never truncated around.
#[derive(Debug, thiserror::Error)]
#[error("composed prompt needs {required} chars but the budget is {budget}")]
pub struct PromptTooLargeError {
    pub budget: usize,
    pub required: usize,
}

#[derive(Debug, thiserror::Error)]
pub enum GenerationError {
    /// HTTP 429 from the model API. Retryable.
    #[error("generation rate limited")]
    RateLimited,

    /// The request did not complete within the timeout. Retryable.
    #[error("generation timed out")]
    Timeout,

    /// The service refused or failed the request. Not retryable: these do not
    /// self-resolve on the timescale of a single request.
    #[error("generation service unavailable: {0}")]
    Unavailable(String),

    /// The call succeeded at the transport level but the payload was
    /// undecodable or carried no completion. Not retryable.
    #[error("generation response unusable: {0}")]
    InvalidResponse(String),
}

/// Raised only when a non-empty generation yields zero valid entries.
/// An empty generation is not a parse error; it short-circuits to an empty
/// set with a warning.
#[derive(Debug, thiserror::Error)]
#[error("no valid recommendation extracted from generation ({entries_seen} entries seen)")]
pub struct ParseError {
    pub entries_seen: usize,
}

/// Terminal failure of one pipeline run.
#[derive(Debug, thiserror::Error)]
pub enum FailureReason {
    #[error("prompt too large: {0}")]
    PromptTooLarge(#[from] PromptTooLargeError),

    #[error("generation retries exhausted: {last}")]
    GenerationExhausted { last: GenerationError },

    #[error("no usable output: {0}")]
    NoUsableOutput(#[from] ParseError),

    #[error("request cancelled")]
    Cancelled,
}
