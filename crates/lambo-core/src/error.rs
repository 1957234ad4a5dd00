use std::time::Duration;

use thiserror::Error;

use crate::envelope::EnvelopeKind;

/// Failure of a single invocation.
///
/// None of these are fatal to the runtime; they only ever reach the caller
/// that issued the invocation.
#[derive(Debug, Error)]
pub enum InvokeError {
    /// The function reported an error. The message is the raw body it posted.
    #[error("{0}")]
    Function(String),

    #[error("failed to send job: {0}")]
    Serialization(String),

    #[error("failed to handle response: {0}")]
    Deserialization(String),

    #[error("invocation abandoned before the function reported a result")]
    Abandoned,

    #[error("invocation timed out after {0:?}")]
    Timeout(Duration),

    #[error("runtime is no longer accepting invocations")]
    Closed,

    #[error("response is not the expected type: expected {expected}, got {actual}")]
    UnexpectedResponse {
        expected: EnvelopeKind,
        actual: EnvelopeKind,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn function_error_displays_verbatim() {
        let err = InvokeError::Function("boom".into());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn unexpected_response_names_both_kinds() {
        let err = InvokeError::UnexpectedResponse {
            expected: EnvelopeKind::Gateway,
            actual: EnvelopeKind::Opaque,
        };
        let msg = err.to_string();
        assert!(msg.contains("gateway"));
        assert!(msg.contains("opaque"));
    }
}
