//! Response classification.
//!
//! # Design
//! `classify` never looks at what was requested. It reads the status, the
//! `ETag` header and the JSON body and produces an `Outcome`. Whether a
//! failure outcome becomes an error is the caller's decision, which lets the
//! DELETE fallback inspect a failure without unwinding.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{GraphError, Result};
use crate::http::HttpResponse;

/// Structured error details reported by the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
    /// Error type such as `OAuthException`.
    pub kind: Option<String>,
    pub code: Option<i64>,
    pub subcode: Option<i64>,
}

impl ErrorInfo {
    /// True when the platform reported an OAuth failure (expired or invalid token).
    pub fn is_oauth(&self) -> bool {
        self.kind.as_deref() == Some("OAuthException")
    }

    /// Pull error details out of a decoded failure body.
    ///
    /// Understands `{"error": {...}}`, `{"error": "..."}` and the legacy
    /// `{"error_msg": ..., "error_code": ...}` shape.
    pub fn from_body(body: &Value) -> Option<Self> {
        if let Some(error) = body.get("error") {
            if let Some(message) = error.as_str() {
                return Some(Self {
                    message: body
                        .get("error_description")
                        .and_then(Value::as_str)
                        .unwrap_or(message)
                        .to_string(),
                    kind: Some(message.to_string()),
                    code: None,
                    subcode: None,
                });
            }
            if error.is_object() {
                return Some(Self {
                    message: error.get("message").and_then(Value::as_str).unwrap_or_default().to_string(),
                    kind: error.get("type").and_then(Value::as_str).map(str::to_string),
                    code: error.get("code").and_then(Value::as_i64),
                    subcode: error.get("error_subcode").and_then(Value::as_i64),
                });
            }
        }
        body.get("error_msg").and_then(Value::as_str).map(|message| Self {
            message: message.to_string(),
            kind: None,
            code: body.get("error_code").and_then(Value::as_i64),
            subcode: None,
        })
    }
}

/// Structured result of one HTTP exchange.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    pub status: u16,
    pub is_success: bool,
    /// False only for `304 Not Modified`.
    pub is_modified: bool,
    pub etag: Option<String>,
    pub decoded_body: Option<Value>,
    pub error: Option<ErrorInfo>,
}

impl Outcome {
    /// Decoded body, or `Value::Null` when there was none.
    pub fn body(&self) -> &Value {
        self.decoded_body.as_ref().unwrap_or(&Value::Null)
    }

    pub fn into_body(self) -> Value {
        self.decoded_body.unwrap_or(Value::Null)
    }

    /// True for failures a caller should see: anything but 2xx and 304.
    pub fn is_failure(&self) -> bool {
        !self.is_success && self.is_modified
    }

    /// Turn a failure outcome into `GraphError::Http`.
    pub fn into_result(self) -> Result<Self> {
        if !self.is_failure() {
            return Ok(self);
        }
        let message = self
            .error
            .as_ref()
            .map(|info| info.message.clone())
            .unwrap_or_else(|| format!("HTTP {}", self.status));
        Err(GraphError::Http {
            status: self.status,
            message,
            error: self.error,
        })
    }
}

/// Classify a raw response.
///
/// A non-empty body is decoded as JSON; an undecodable body on a 2xx status is
/// a protocol error. Failure outcomes carry `ErrorInfo` from the body when it
/// has one, otherwise from the status message.
pub fn classify(response: &HttpResponse) -> Result<Outcome> {
    let is_success = (200..300).contains(&response.status);
    let is_modified = response.status != 304;

    let decoded_body = if response.body.trim().is_empty() {
        None
    } else {
        match serde_json::from_str::<Value>(&response.body) {
            Ok(value) => Some(value),
            Err(err) if is_success => {
                return Err(GraphError::protocol(
                    format!("response body is not valid JSON: {err}"),
                    response.body.clone(),
                ))
            }
            Err(_) => None,
        }
    };

    let error = (!is_success && is_modified).then(|| {
        decoded_body
            .as_ref()
            .and_then(ErrorInfo::from_body)
            .unwrap_or_else(|| ErrorInfo {
                message: if response.status_message.is_empty() {
                    format!("HTTP {}", response.status)
                } else {
                    response.status_message.clone()
                },
                kind: None,
                code: None,
                subcode: None,
            })
    });

    Ok(Outcome {
        status: response.status,
        is_success,
        is_modified,
        etag: response.header("etag").map(str::to_string),
        decoded_body,
        error,
    })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    fn response(status: u16, message: &str, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            status_message: message.to_string(),
            headers: Vec::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn not_modified_is_neither_success_nor_failure() {
        let outcome = classify(&response(304, "Not Modified", "")).unwrap();
        assert!(!outcome.is_modified);
        assert!(!outcome.is_success);
        assert!(!outcome.is_failure());
        assert!(outcome.decoded_body.is_none());
        assert!(outcome.error.is_none());
    }

    #[test]
    fn ok_json_body_is_decoded() {
        let outcome = classify(&response(200, "OK", r#"{"id":"1","name":"A"}"#)).unwrap();
        assert!(outcome.is_success);
        assert!(outcome.is_modified);
        assert_eq!(outcome.body()["name"], "A");
    }

    #[test]
    fn error_body_supplies_message() {
        let outcome = classify(&response(400, "Bad Request", r#"{"error":{"message":"bad"}}"#)).unwrap();
        assert!(!outcome.is_success);
        assert_eq!(outcome.error.as_ref().unwrap().message, "bad");
        let err = outcome.into_result().unwrap_err();
        assert!(matches!(err, GraphError::Http { status: 400, ref message, .. } if message == "bad"));
    }

    #[test]
    fn error_fields_are_extracted() {
        let body = json!({"error": {"message": "expired", "type": "OAuthException", "code": 190, "error_subcode": 463}});
        let info = ErrorInfo::from_body(&body).unwrap();
        assert!(info.is_oauth());
        assert_eq!(info.code, Some(190));
        assert_eq!(info.subcode, Some(463));
    }

    #[test]
    fn legacy_error_shape_is_understood() {
        let info = ErrorInfo::from_body(&json!({"error_code": 100, "error_msg": "Invalid parameter"})).unwrap();
        assert_eq!(info.message, "Invalid parameter");
        assert_eq!(info.code, Some(100));
    }

    #[test]
    fn string_error_uses_description() {
        let info = ErrorInfo::from_body(&json!({"error": "invalid_code", "error_description": "code expired"})).unwrap();
        assert_eq!(info.message, "code expired");
        assert_eq!(info.kind.as_deref(), Some("invalid_code"));
    }

    #[test]
    fn failure_without_json_falls_back_to_status_message() {
        let outcome = classify(&response(502, "Bad Gateway", "<html>oops</html>")).unwrap();
        assert!(outcome.decoded_body.is_none());
        assert_eq!(outcome.error.unwrap().message, "Bad Gateway");

        let outcome = classify(&response(500, "", "")).unwrap();
        assert_eq!(outcome.error.unwrap().message, "HTTP 500");
    }

    #[test]
    fn undecodable_success_body_is_a_protocol_error() {
        let err = classify(&response(200, "OK", "access_token=abc")).unwrap_err();
        assert!(matches!(err, GraphError::Protocol { ref body, .. } if body == "access_token=abc"));
    }

    #[test]
    fn etag_header_is_captured() {
        let mut resp = response(200, "OK", "{}");
        resp.headers.push(("ETag".to_string(), "\"v1\"".to_string()));
        assert_eq!(classify(&resp).unwrap().etag.as_deref(), Some("\"v1\""));
    }
}
