//! The orchestrator's public error boundary (SPEC_FULL.md §7 expansion).

use conduit_exec::PolicyError;
use conduit_providers::ProviderError;

/// Everything that can make [`crate::orchestrator::run_turn`] return early
/// without completing the turn. Transient/api-limit failures are retried
/// internally and never surface here; only a fatal provider error, an
/// exhausted context-overflow retry, or an explicit cancellation do.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("fatal provider error: {0}")]
    Fatal(String),
    #[error("context window overflowed twice in a row after compaction")]
    CompactionExhausted,
    #[error("turn cancelled")]
    Cancelled,
    #[error("exec policy error: {0}")]
    Policy(#[from] PolicyError),
}

impl EngineError {
    #[must_use]
    pub fn from_provider_fatal(err: &ProviderError) -> Self {
        Self::Fatal(err.to_string())
    }
}
