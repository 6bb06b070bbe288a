use thiserror::Error;

/// Errors surfaced by the sanitization engine.
///
/// Propagation policy: the engine never retries or recovers internally —
/// every fault bubbles to the caller, which decides whether to abort or
/// (for a multi-holder coordinator) notify connected contributors.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("malformed input: {0}")]
    MalformedInput(String),

    #[error("invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("engine invariant violated: {0}")]
    InvariantViolation(String),
}
