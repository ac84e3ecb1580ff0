use super::{describe_error_code, EffectError};
use serde::{Deserialize, Serialize};

/// Serializable error representation for JSON output
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct SerializableError {
    /// Error kind as string
    pub kind: String,
    /// User-facing error message
    pub message: String,
    /// Error code
    pub code: u16,
    /// Description of the code from the registry
    pub description: String,
    /// Cause chain, outermost first
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub causes: Vec<SerializableError>,
    /// Members of an aggregate
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<SerializableError>,
}

impl From<&EffectError> for SerializableError {
    fn from(error: &EffectError) -> Self {
        let errors = match error {
            EffectError::Aggregate { errors, .. } => errors.iter().map(Self::from).collect(),
            _ => Vec::new(),
        };

        Self {
            kind: error.kind().to_string(),
            message: error.user_message(),
            code: error.code(),
            description: describe_error_code(error.code()).to_string(),
            causes: error.causes().into_iter().map(Self::from).collect(),
            errors,
        }
    }
}

impl EffectError {
    /// Convert error to JSON value
    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(SerializableError::from(self))
            .unwrap_or_else(|_| serde_json::json!({ "error": "Serialization failed" }))
    }

    /// Convert error to JSON string
    pub fn to_json_string(&self) -> String {
        serde_json::to_string(&SerializableError::from(self))
            .unwrap_or_else(|_| r#"{"error":"Serialization failed"}"#.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::codes::ErrorCode;

    #[test]
    fn test_basic_serialization() {
        let error = EffectError::failure("disk on fire");

        let serialized = SerializableError::from(&error);
        assert_eq!(serialized.kind, "Failure");
        assert_eq!(serialized.code, ErrorCode::FAILURE_GENERIC);
        assert!(serialized.causes.is_empty());
    }

    #[test]
    fn test_aggregate_serialization() {
        let error = EffectError::aggregate(
            EffectError::failure("use failed"),
            EffectError::failure_with_code(ErrorCode::RESOURCE_RELEASE_FAILED, "release failed"),
        );

        let json = error.to_json();
        assert_eq!(json["kind"], "Aggregate");
        assert_eq!(json["errors"].as_array().map(Vec::len), Some(2));
        assert_eq!(json["errors"][1]["code"], ErrorCode::RESOURCE_RELEASE_FAILED);
    }

    #[test]
    fn test_cause_chain_serialization() {
        let error = EffectError::failure("outer").with_cause(EffectError::closed("inner"));
        let text = error.to_json_string();
        assert!(text.contains("\"causes\""));
        assert!(text.contains("inner"));
    }
}
