//! The uniform tool-call response envelope.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use gofriq::Error;

/// Every tool answers this shape, serialized as a single content block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope {
    /// `success` or `error`.
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recovery_strategy: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
}

impl Envelope {
    /// A success envelope carrying `data`.
    #[must_use]
    pub fn success(data: Value) -> Self {
        Self {
            status: "success".to_string(),
            message: None,
            data: Some(data),
            error_code: None,
            recovery_strategy: None,
            details: None,
        }
    }

    /// A success envelope with a message and data.
    #[must_use]
    pub fn success_with_message(message: impl Into<String>, data: Value) -> Self {
        Self { message: Some(message.into()), ..Self::success(data) }
    }

    /// Convert a service error into an error envelope with its stable
    /// code and recovery hint.
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        Self {
            status: "error".to_string(),
            message: Some(error.to_string()),
            data: None,
            error_code: Some(error.error_code().to_string()),
            recovery_strategy: error.recovery_strategy().map(str::to_string),
            details: None,
        }
    }
}

impl From<gofriq::Result<Value>> for Envelope {
    fn from(result: gofriq::Result<Value>) -> Self {
        match result {
            Ok(data) => Envelope::success(data),
            Err(e) => Envelope::from_error(&e),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_shape() {
        let env = Envelope::success(json!({"doc_id": "abc"}));
        let text = serde_json::to_string(&env).unwrap();
        assert!(text.contains("\"status\":\"success\""));
        assert!(!text.contains("error_code"));
    }

    #[test]
    fn test_error_carries_code_and_hint() {
        let env = Envelope::from_error(&Error::AccessDenied("doc outside groups".into()));
        assert_eq!(env.status, "error");
        assert_eq!(env.error_code.as_deref(), Some("ACCESS_DENIED"));
        assert!(env.recovery_strategy.is_some());
    }

    #[test]
    fn test_from_result() {
        let ok: Envelope = Ok(json!({"n": 1})).into();
        assert_eq!(ok.status, "success");
        let err: Envelope = Err(Error::validation("bad input")).into();
        assert_eq!(err.error_code.as_deref(), Some("VALIDATION_ERROR"));
    }
}
