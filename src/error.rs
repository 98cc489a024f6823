// src/error.rs
//! Error kinds surfaced by adapters, the history store and the orchestrator.
//!
//! Every kind maps to its own HTTP status in `api`; nothing in the pipeline
//! collapses them into a generic failure.

use thiserror::Error;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PipelineError {
    /// Network failure or timeout talking to a third party. Transient.
    #[error("upstream unavailable: {0}")]
    UpstreamUnavailable(String),
    /// Upstream answered, but not in the shape we expect.
    #[error("upstream format error: {0}")]
    UpstreamFormatError(String),
    /// Scraped document lost the structure we parse.
    #[error("parse error: {0}")]
    ParseError(String),
    /// Valid request, but upstream has no such symbol/city.
    #[error("not found: {0}")]
    NotFound(String),
    /// Local history write failed; the observation was not stored.
    #[error("persistence error: {0}")]
    PersistenceError(String),
    /// Malformed query parameters, rejected before any I/O.
    #[error("validation error: {0}")]
    ValidationError(String),
}

impl PipelineError {
    /// Stable kind name used in response bodies and metric labels.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpstreamUnavailable(_) => "UpstreamUnavailable",
            Self::UpstreamFormatError(_) => "UpstreamFormatError",
            Self::ParseError(_) => "ParseError",
            Self::NotFound(_) => "NotFound",
            Self::PersistenceError(_) => "PersistenceError",
            Self::ValidationError(_) => "ValidationError",
        }
    }

    pub fn message(&self) -> &str {
        match self {
            Self::UpstreamUnavailable(m)
            | Self::UpstreamFormatError(m)
            | Self::ParseError(m)
            | Self::NotFound(m)
            | Self::PersistenceError(m)
            | Self::ValidationError(m) => m,
        }
    }

    /// Only network-level failures are worth retrying.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::UpstreamUnavailable(_))
    }

    /// Contract drift on the upstream side; logged louder than plain outages.
    pub fn is_source_rot(&self) -> bool {
        matches!(self, Self::UpstreamFormatError(_) | Self::ParseError(_))
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_network_failures_are_retryable() {
        assert!(PipelineError::UpstreamUnavailable("timeout".into()).is_retryable());
        assert!(!PipelineError::ParseError("no channel".into()).is_retryable());
        assert!(!PipelineError::UpstreamFormatError("bad json".into()).is_retryable());
        assert!(!PipelineError::NotFound("xyz".into()).is_retryable());
    }

    #[test]
    fn kind_and_message_round_out_the_display() {
        let e = PipelineError::NotFound("symbol 'zzz'".into());
        assert_eq!(e.kind(), "NotFound");
        assert_eq!(e.message(), "symbol 'zzz'");
        assert_eq!(e.to_string(), "not found: symbol 'zzz'");
    }
}
