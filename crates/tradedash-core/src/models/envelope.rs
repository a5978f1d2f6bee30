use serde::{Deserialize, Serialize};

/// Response wrapper used by the backend: `{ "success": bool, "data": T }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiEnvelope<T> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl<T> ApiEnvelope<T> {
    /// Data carried by a successful envelope, if any
    pub fn into_data(self) -> Option<T> {
        if self.success {
            self.data
        } else {
            None
        }
    }
}

/// Response to write operations: `{ "success": true, "message": "..." }`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Acknowledgement {
    pub success: bool,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        self.status == "healthy"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_envelope_without_data() {
        let env: ApiEnvelope<Vec<u32>> = serde_json::from_str(r#"{"success": false}"#)
            .expect("Failed to parse envelope");
        assert!(!env.success);
        assert_eq!(env.into_data(), None);
    }

    #[test]
    fn test_missing_data_needs_no_default() {
        #[derive(Debug, PartialEq, Deserialize)]
        struct Payload {
            value: u32,
        }

        let env: ApiEnvelope<Payload> = serde_json::from_str(r#"{"success": true}"#)
            .expect("Failed to parse envelope");
        assert_eq!(env.into_data(), None);
    }

    #[test]
    fn test_failed_envelope_hides_data() {
        let env: ApiEnvelope<u32> = serde_json::from_str(r#"{"success": false, "data": 7}"#)
            .expect("Failed to parse envelope");
        assert_eq!(env.into_data(), None);
    }

    #[test]
    fn test_acknowledgement() {
        let ack: Acknowledgement =
            serde_json::from_str(r#"{"success": true, "message": "API keys updated successfully"}"#)
                .expect("Failed to parse acknowledgement");
        assert!(ack.success);
        assert_eq!(ack.message.as_deref(), Some("API keys updated successfully"));
    }
}
