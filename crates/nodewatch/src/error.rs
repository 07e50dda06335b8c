use std::time::Duration;

use thiserror::Error;

use crate::timeout::Bounded;

/// Failure of a call to the coordinator.
///
/// None of these are fatal: callers log them and carry on until the next
/// tick.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ReportError {
    #[error("no credential available")]
    NoCredential,
    #[error("coordinator unreachable: {0}")]
    Transport(String),
    #[error("coordinator rejected credential (HTTP {0})")]
    Auth(u16),
    #[error("coordinator answered HTTP {0}")]
    Status(u16),
    #[error("malformed coordinator response: {0}")]
    MalformedResponse(String),
    #[error("coordinator call timed out after {0:?}")]
    TimedOut(Duration),
}

impl ReportError {
    /// Everything except missing or rejected credentials is a transport
    /// failure; a malformed payload is treated like an unreachable backend.
    pub fn is_transport(&self) -> bool {
        !matches!(self, ReportError::NoCredential | ReportError::Auth(_))
    }

    /// Whether trying the same call again could succeed. A coordinator
    /// that answered with a body it cannot parse will answer the same way.
    pub fn is_retryable(&self) -> bool {
        self.is_transport() && !matches!(self, ReportError::MalformedResponse(_))
    }
}

impl From<reqwest::Error> for ReportError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_decode() {
            ReportError::MalformedResponse(error.to_string())
        } else if let Some(status) = error.status() {
            ReportError::Status(status.as_u16())
        } else {
            ReportError::Transport(error.to_string())
        }
    }
}

impl From<Bounded<reqwest::Error>> for ReportError {
    fn from(error: Bounded<reqwest::Error>) -> Self {
        match error {
            Bounded::TimedOut(limit) => ReportError::TimedOut(limit),
            Bounded::Failed(error) => ReportError::from(error),
        }
    }
}

/// Failure to read or write the uptime ledger or the outcome history.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("ledger I/O failed for {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("ledger serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// The only failure that aborts a whole probe round.
#[derive(Debug, Error)]
pub enum RoundError {
    #[error("failed to fetch node list: {0}")]
    NodeList(#[source] ReportError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transport_classification() {
        assert!(ReportError::Transport("refused".into()).is_transport());
        assert!(ReportError::MalformedResponse("eof".into()).is_transport());
        assert!(ReportError::Status(502).is_transport());
        assert!(ReportError::TimedOut(Duration::from_secs(1)).is_transport());
        assert!(!ReportError::NoCredential.is_transport());
        assert!(!ReportError::Auth(401).is_transport());
    }

    #[test]
    fn test_credential_failures_are_not_retryable() {
        assert!(!ReportError::NoCredential.is_retryable());
        assert!(!ReportError::Auth(403).is_retryable());
        assert!(ReportError::Status(503).is_retryable());
        assert!(ReportError::TimedOut(Duration::from_secs(1)).is_retryable());
    }

    #[test]
    fn test_malformed_response_is_transport_but_not_retryable() {
        let error = ReportError::MalformedResponse("expected value".into());
        assert!(error.is_transport());
        assert!(!error.is_retryable());
    }
}
