//! JSON result object returned for every gateway action.

use chrono::{SecondsFormat, Utc};
use serde::Serialize;

use embystreams_core::{DisplaySession, ErrorCategory};

/// One response shape for all actions; fields an action does not use are
/// left out of the JSON.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_code: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub sessions: Option<Vec<DisplaySession>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub configured: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub online: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server_version: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_count: Option<usize>,

    /// testConnection: server name and version as reported upstream.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub server: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,

    /// RFC 3339, UTC.
    pub timestamp: String,

    /// HTTP status for the front end. Not part of the body.
    #[serde(skip)]
    pub status: u16,
}

impl GatewayResponse {
    fn empty(success: bool, status: u16) -> Self {
        Self {
            success,
            error: None,
            error_code: None,
            message: None,
            sessions: None,
            count: None,
            configured: None,
            online: None,
            server_name: None,
            server_version: None,
            stream_count: None,
            server: None,
            version: None,
            timestamp: now_rfc3339(),
            status,
        }
    }

    pub fn ok() -> Self {
        Self::empty(true, 200)
    }

    pub fn sessions(sessions: Vec<DisplaySession>) -> Self {
        Self {
            count: Some(sessions.len()),
            sessions: Some(sessions),
            ..Self::ok()
        }
    }

    pub fn message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::ok()
        }
    }

    /// Failure: only the category's user message and slug are exposed.
    pub fn failure(category: ErrorCategory) -> Self {
        let mut resp = Self::empty(false, category.http_status());
        resp.error = Some(category.user_message());
        if category != ErrorCategory::UnknownAction {
            resp.error_code = Some(category.as_str());
        }
        if category == ErrorCategory::NotConfigured {
            resp.configured = Some(false);
        }
        resp
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    #[test]
    fn unused_fields_are_omitted() {
        let v = serde_json::to_value(GatewayResponse::message("Configuration saved")).unwrap();
        let obj = v.as_object().unwrap();
        assert_eq!(obj["success"], Value::Bool(true));
        assert_eq!(obj["message"], "Configuration saved");
        assert!(obj.contains_key("timestamp"));
        assert!(!obj.contains_key("sessions"));
        assert!(!obj.contains_key("error"));
        assert!(!obj.contains_key("status"));
    }

    #[test]
    fn failure_carries_category_only() {
        let resp = GatewayResponse::failure(ErrorCategory::UpstreamAuthFailed);
        assert_eq!(resp.status, 502);
        let v = serde_json::to_value(&resp).unwrap();
        assert_eq!(v["success"], false);
        assert_eq!(v["error"], "_(Authentication Failed - Check API Key)_");
        assert_eq!(v["errorCode"], "upstream_authentication_failed");
    }

    #[test]
    fn not_configured_flags_configured_false() {
        let v = serde_json::to_value(GatewayResponse::failure(ErrorCategory::NotConfigured)).unwrap();
        assert_eq!(v["configured"], false);
    }

    #[test]
    fn timestamp_is_rfc3339_utc() {
        let resp = GatewayResponse::ok();
        let parsed = chrono::DateTime::parse_from_rfc3339(&resp.timestamp).unwrap();
        assert_eq!(parsed.offset().local_minus_utc(), 0);
        assert!(resp.timestamp.ends_with('Z'));
    }

    #[test]
    fn sessions_include_count() {
        let v = serde_json::to_value(GatewayResponse::sessions(Vec::new())).unwrap();
        assert_eq!(v["count"], 0);
        assert_eq!(v["sessions"], Value::Array(Vec::new()));
    }
}
