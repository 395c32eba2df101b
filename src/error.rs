//! Error types for the labspace provisioner

use thiserror::Error;

/// Main error type for provisioning operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// Validation error for uploaded roster/config input
    #[error("validation error: {0}")]
    Validation(String),

    /// Malformed manifest document
    #[error("decode error: {0}")]
    Decode(String),

    /// Chart rendering error
    #[error("render error: {0}")]
    Render(String),

    /// ServiceAccount credential retrieval error
    #[error("credential error: {0}")]
    Credential(String),
}

impl Error {
    /// Create a validation error with the given message
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Create a decode error with the given message
    pub fn decode(msg: impl Into<String>) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a render error with the given message
    pub fn render(msg: impl Into<String>) -> Self {
        Self::Render(msg.into())
    }

    /// Create a credential error with the given message
    pub fn credential(msg: impl Into<String>) -> Self {
        Self::Credential(msg.into())
    }

    /// Whether this error is a structured "not found" from the API server.
    ///
    /// Classification is by the typed status code carried by the client,
    /// never by matching error message text.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::Kube(kube::Error::Api(e)) if e.code == 404)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Story: bad uploads are rejected before any cluster call
    ///
    /// A malformed roster or config file must surface as a validation error
    /// the HTTP layer can map to a client-side status.
    #[test]
    fn story_validation_rejects_bad_uploads() {
        let err = Error::validation("students must be one of text/csv types");
        assert!(err.to_string().contains("validation error"));
        assert!(err.to_string().contains("text/csv"));

        match Error::validation("any message") {
            Error::Validation(msg) => assert_eq!(msg, "any message"),
            _ => panic!("Expected Validation variant"),
        }
    }

    /// Story: manifest decode failures abort distribution loudly
    #[test]
    fn story_decode_errors_name_the_offending_document() {
        let err = Error::decode("document 3: missing apiVersion");
        assert!(err.to_string().contains("decode error"));
        assert!(err.to_string().contains("document 3"));
    }

    /// Story: credential errors distinguish poll exhaustion from API failure
    ///
    /// A remote failure during the token wait is a `Kube` error; running out
    /// of attempts while the control plane stays healthy is `Credential`.
    #[test]
    fn story_credential_exhaustion_is_its_own_category() {
        let err = Error::credential("no token secret for jane-doe after 20 attempts");
        assert!(err.to_string().contains("credential error"));
        assert!(!err.is_not_found());
    }

    /// Story: not-found is classified by typed status, not message text
    #[test]
    fn story_not_found_uses_structured_status() {
        let api_err = kube::error::ErrorResponse {
            status: "Failure".to_string(),
            message: "clusterroles \"read-namespaces-cr\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        };
        let err = Error::from(kube::Error::Api(api_err));
        assert!(err.is_not_found());

        let forbidden = kube::error::ErrorResponse {
            status: "Failure".to_string(),
            // A misleading message suffix must not be classified as absence.
            message: "request denied: not found".to_string(),
            reason: "Forbidden".to_string(),
            code: 403,
        };
        let err = Error::from(kube::Error::Api(forbidden));
        assert!(!err.is_not_found());
    }
}
