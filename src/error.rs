// src/error.rs

use crate::types::Arn;

/// Result type used throughout the monitor
pub type MonitorResult<T> = Result<T, MonitorError>;

/// Closed classification of every failure the monitor can see.
///
/// Callers branch on this instead of matching on upstream error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Recoverable; serve cached state and keep going
    Throttled,
    /// The resource no longer exists; skip it
    NotFound,
    /// Bad input or configuration; abort before mutating anything
    Invalid,
    /// Anything else from a collaborator; propagate
    Upstream,
}

/// All possible errors that can occur in the monitor
#[derive(thiserror::Error, Debug)]
pub enum MonitorError {
    /// The upstream API rejected the call because of rate limiting
    #[error("Throttled while calling '{operation}': {message}")]
    Throttled { operation: String, message: String },

    /// Resource not found
    #[error("Resource '{resource_id}' no longer exists")]
    NotFound { resource_id: String },

    /// Validation failure (configuration, ARNs, capacity targets)
    #[error("Invalid input: {message}")]
    Invalid { message: String },

    /// Unclassified collaborator failure
    #[error("Upstream call '{operation}' failed: {message}")]
    Upstream { operation: String, message: String },

    /// Serialization/deserialization errors
    #[error("Serialization error: {source}")]
    Serialization {
        #[from]
        source: serde_json::Error,
    },

    /// Configuration source could not be read or deserialized
    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: config::ConfigError,
    },
}

/// Helper methods for creating common errors
impl MonitorError {
    pub fn throttled<S: Into<String>>(operation: S, message: S) -> Self {
        Self::Throttled {
            operation: operation.into(),
            message: message.into(),
        }
    }

    pub fn not_found<S: Into<String>>(resource_id: S) -> Self {
        Self::NotFound {
            resource_id: resource_id.into(),
        }
    }

    pub fn invalid<S: Into<String>>(message: S) -> Self {
        Self::Invalid {
            message: message.into(),
        }
    }

    pub fn upstream<S: Into<String>>(operation: S, message: S) -> Self {
        Self::Upstream {
            operation: operation.into(),
            message: message.into(),
        }
    }

    /// Not-found error for a resource ARN
    pub fn resource_gone(arn: &Arn) -> Self {
        Self::not_found(arn.as_str())
    }

    /// Which of the four handling strategies applies to this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Throttled { .. } => ErrorKind::Throttled,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Invalid { .. } | Self::Config { .. } => ErrorKind::Invalid,
            Self::Upstream { .. } | Self::Serialization { .. } => ErrorKind::Upstream,
        }
    }

    pub fn is_throttled(&self) -> bool {
        self.kind() == ErrorKind::Throttled
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        assert_eq!(
            MonitorError::throttled("DescribeCampaign", "rate exceeded").kind(),
            ErrorKind::Throttled
        );
        assert_eq!(MonitorError::not_found("arn").kind(), ErrorKind::NotFound);
        assert_eq!(MonitorError::invalid("bad").kind(), ErrorKind::Invalid);
        assert_eq!(
            MonitorError::upstream("PutMetricData", "boom").kind(),
            ErrorKind::Upstream
        );

        let json_err = serde_json::from_str::<u32>("nope").unwrap_err();
        assert_eq!(MonitorError::from(json_err).kind(), ErrorKind::Upstream);
    }

    #[test]
    fn test_error_messages() {
        let err = MonitorError::not_found("arn:aws:personalize:us-east-1:1:campaign/x");
        assert_eq!(
            err.to_string(),
            "Resource 'arn:aws:personalize:us-east-1:1:campaign/x' no longer exists"
        );
        assert!(MonitorError::throttled("op", "slow down").is_throttled());
        assert!(!MonitorError::invalid("x").is_not_found());
    }
}
