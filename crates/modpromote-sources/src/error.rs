//! Error types for modpromote-sources

use thiserror::Error;

/// Errors raised by registry and version-control collaborators.
///
/// Variants carry only strings so that fakes can replay the same failure
/// more than once.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// The requested resource does not exist
    #[error("not found: {resource}")]
    NotFound { resource: String },

    /// Credentials were rejected
    #[error("access denied for {resource} (HTTP {status})")]
    Unauthorized { resource: String, status: u16 },

    /// Any other non-success HTTP status
    #[error("unexpected HTTP {status} from {resource}")]
    Status { resource: String, status: u16 },

    /// Connection-level failure
    #[error("transport error: {0}")]
    Transport(String),

    /// The call did not complete in time
    #[error("request to {resource} timed out after {after_secs}s")]
    Timeout { resource: String, after_secs: u64 },

    /// The response body could not be decoded
    #[error("failed to decode response: {0}")]
    Decode(String),
}

impl SourceError {
    /// Whether retrying the same call may succeed.
    ///
    /// Connection failures, timeouts, throttling and 5xx responses are
    /// transient. Missing resources, rejected credentials and undecodable
    /// bodies are not.
    pub fn is_transient(&self) -> bool {
        match self {
            SourceError::Transport(_) | SourceError::Timeout { .. } => true,
            SourceError::Status { status, .. } => *status == 429 || *status >= 500,
            SourceError::NotFound { .. }
            | SourceError::Unauthorized { .. }
            | SourceError::Decode(_) => false,
        }
    }
}

impl From<reqwest::Error> for SourceError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            SourceError::Decode(err.to_string())
        } else if err.is_timeout() {
            SourceError::Timeout {
                resource: err
                    .url()
                    .map(|u| u.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                after_secs: 0,
            }
        } else {
            SourceError::Transport(err.to_string())
        }
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Decode(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transient_classification() {
        assert!(SourceError::Transport("reset".to_string()).is_transient());
        assert!(SourceError::Timeout {
            resource: "registry".to_string(),
            after_secs: 30
        }
        .is_transient());
        assert!(SourceError::Status {
            resource: "registry".to_string(),
            status: 503
        }
        .is_transient());
        assert!(SourceError::Status {
            resource: "registry".to_string(),
            status: 429
        }
        .is_transient());

        assert!(!SourceError::Status {
            resource: "registry".to_string(),
            status: 400
        }
        .is_transient());
        assert!(!SourceError::NotFound {
            resource: "lambda".to_string()
        }
        .is_transient());
        assert!(!SourceError::Unauthorized {
            resource: "lambda".to_string(),
            status: 401
        }
        .is_transient());
        assert!(!SourceError::Decode("bad json".to_string()).is_transient());
    }

    #[test]
    fn test_error_display_names_resource() {
        let err = SourceError::Timeout {
            resource: "repos/modules-len/terraform-aws-lambda".to_string(),
            after_secs: 30,
        };
        let msg = err.to_string();
        assert!(msg.contains("terraform-aws-lambda"));
        assert!(msg.contains("30s"));
    }
}
