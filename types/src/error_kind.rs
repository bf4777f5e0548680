//! Error kinds exported to the host.

use serde::{Deserialize, Serialize};

/// The taxonomy a provider adapter classifies errors into, and the host
/// surfaces to a user or logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Not retryable; the turn terminates and surfaces to the user.
    Fatal,
    /// Retryable with bounded exponential backoff.
    Transient,
    /// Retryable with backoff; rate-limited.
    ApiLimit,
    /// Triggers compaction, then one retry.
    ContextOverflow,
    /// Bad argument shape; surfaced to the LLM as a tool error, not fatal.
    Validation,
    /// A handler ran and reported failure; recorded in history.
    ToolError,
}

impl ErrorKind {
    /// Whether the orchestrator's retry loop (the relevant sectiona) should retry
    /// automatically rather than surface the error immediately.
    #[must_use]
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::Transient | Self::ApiLimit)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_and_api_limit_are_retryable() {
        assert!(ErrorKind::Transient.is_retryable());
        assert!(ErrorKind::ApiLimit.is_retryable());
    }

    #[test]
    fn fatal_and_context_overflow_are_not_auto_retried() {
        assert!(!ErrorKind::Fatal.is_retryable());
        assert!(!ErrorKind::ContextOverflow.is_retryable());
    }
}
