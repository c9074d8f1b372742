use serde::{Deserialize, Serialize};

// -- Result envelopes --

/// Machine-readable code attached to a rate-limited mentorship request.
pub const CODE_RATE_LIMITED: &str = "rate_limited";

/// The `{success, ...}` shape every mutating core operation is reported in.
/// An HTTP layer serializes this as-is; absent fields are omitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    /// Human-readable time after which a rate-limited request may be retried.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after_seconds: Option<i64>,
}

impl Envelope {
    pub fn ok() -> Self {
        Self {
            success: true,
            id: None,
            error: None,
            code: None,
            retry_at: None,
            retry_after_seconds: None,
        }
    }

    pub fn created(id: i64) -> Self {
        Self {
            id: Some(id),
            ..Self::ok()
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            error: Some(message.into()),
            ..Self::ok()
        }
    }

    pub fn rate_limited(retry_at: impl Into<String>, retry_after_seconds: i64) -> Self {
        let retry_at = retry_at.into();
        Self {
            success: false,
            error: Some(format!(
                "You have already contacted this mentor recently. You can send another request after {}.",
                retry_at
            )),
            code: Some(CODE_RATE_LIMITED.to_string()),
            retry_at: Some(retry_at),
            retry_after_seconds: Some(retry_after_seconds),
            id: None,
        }
    }

    /// `true` when a boolean mutation matched a row, otherwise a failure
    /// carrying `miss` as its message.
    pub fn from_affected(affected: bool, miss: &str) -> Self {
        if affected { Self::ok() } else { Self::failure(miss) }
    }

    pub fn is_rate_limited(&self) -> bool {
        self.code.as_deref() == Some(CODE_RATE_LIMITED)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn created_serializes_without_empty_fields() {
        let json = serde_json::to_value(Envelope::created(7)).unwrap();
        assert_eq!(json, serde_json::json!({ "success": true, "id": 7 }));
    }

    #[test]
    fn rate_limited_uses_camel_case_keys() {
        let env = Envelope::rate_limited("Oct 21, 2026 09:00 UTC", 3600);
        let json = serde_json::to_value(&env).unwrap();
        assert_eq!(json["success"], false);
        assert_eq!(json["code"], "rate_limited");
        assert_eq!(json["retryAt"], "Oct 21, 2026 09:00 UTC");
        assert_eq!(json["retryAfterSeconds"], 3600);
        assert!(env.is_rate_limited());
    }

    #[test]
    fn affected_flag_maps_to_failure_message() {
        assert!(Envelope::from_affected(true, "nope").success);
        let miss = Envelope::from_affected(false, "Request not found");
        assert_eq!(miss.error.as_deref(), Some("Request not found"));
    }
}
