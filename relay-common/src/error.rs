use thiserror::Error;

#[derive(Debug, Error)]
pub enum RelayError {
    #[error("I/O Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization Error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("Configuration Error: {0}")]
    Config(String),

    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("HTTP Error: {0}")]
    Http(String),

    #[error("Invalid credential: {0}")]
    InvalidCredential(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Node {node} unreachable: {message}")]
    NodeUnreachable { node: String, message: String },

    #[error("Node {node} rejected the request: {message}")]
    NodeRejected { node: String, message: String },

    #[error("No master detected for {0}")]
    NoMasterDetected(String),

    #[error("All nodes exhausted: {message}")]
    AllNodesExhausted {
        last_node: Option<String>,
        message: String,
        /// The final attempt's failure as `NodeUnreachable` or `NodeRejected`.
        #[source]
        cause: Option<Box<RelayError>>,
    },
}

pub type Result<T> = std::result::Result<T, RelayError>;

impl RelayError {
    /// Credential problems are surfaced to the caller and never retried.
    pub fn is_auth(&self) -> bool {
        matches!(
            self,
            RelayError::InvalidCredential(_) | RelayError::Unauthenticated(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_message_carries_last_error_only() {
        let err = RelayError::AllNodesExhausted {
            last_node: Some("10.0.0.2:16127".into()),
            message: "10.0.0.2:16127: connection refused".into(),
            cause: Some(Box::new(RelayError::NodeUnreachable {
                node: "10.0.0.2:16127".into(),
                message: "connection refused".into(),
            })),
        };
        assert_eq!(
            err.to_string(),
            "All nodes exhausted: 10.0.0.2:16127: connection refused"
        );
        assert!(!err.is_auth());
        let source = std::error::Error::source(&err).unwrap();
        assert_eq!(source.to_string(), "Node 10.0.0.2:16127 unreachable: connection refused");
        assert!(RelayError::Unauthenticated("expired".into()).is_auth());
    }
}
