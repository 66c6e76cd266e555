//! Turns node responses into values or classified attempt failures.

use crate::dispatcher::AttemptError;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use serde_json::Value;

const MAX_ERROR_BODY: usize = 200;

pub fn transport_error(err: reqwest::Error) -> AttemptError {
    if err.is_timeout() {
        AttemptError::Transport("request timed out".into())
    } else if err.is_connect() {
        AttemptError::Transport(format!("connection failed: {}", err))
    } else if err.is_decode() {
        AttemptError::Malformed(err.to_string())
    } else {
        AttemptError::Transport(err.to_string())
    }
}

/// Reads a JSON body, unwrapping the `{status, data}` envelope when present.
pub async fn read_json(resp: reqwest::Response) -> Result<Value, AttemptError> {
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(transport_error)?;
    classify_json(status, &body)
}

/// Like [`read_json`], but a plain-text success body is returned as is.
pub async fn read_text(resp: reqwest::Response) -> Result<String, AttemptError> {
    let status = resp.status().as_u16();
    let body = resp.text().await.map_err(transport_error)?;
    classify_text(status, &body)
}

pub async fn read_bytes(resp: reqwest::Response) -> Result<Bytes, AttemptError> {
    let status = resp.status().as_u16();
    let is_html = resp
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("text/html"))
        .unwrap_or(false);

    if !(200..300).contains(&status) {
        let body = resp.text().await.unwrap_or_default();
        return Err(rejected(status, &body));
    }
    if is_html {
        return Err(AttemptError::Malformed("received an HTML page instead of file data".into()));
    }
    resp.bytes().await.map_err(transport_error)
}

pub fn classify_json(status: u16, body: &str) -> Result<Value, AttemptError> {
    if !(200..300).contains(&status) {
        return Err(rejected(status, body));
    }
    if looks_like_html(body) {
        return Err(AttemptError::Malformed("received an HTML error page".into()));
    }
    let value: Value = serde_json::from_str(body)
        .map_err(|e| AttemptError::Malformed(format!("response is not JSON: {}", e)))?;
    unwrap_envelope(value)
}

pub fn classify_text(status: u16, body: &str) -> Result<String, AttemptError> {
    if !(200..300).contains(&status) {
        return Err(rejected(status, body));
    }
    if looks_like_html(body) {
        return Err(AttemptError::Malformed("received an HTML error page".into()));
    }
    match serde_json::from_str::<Value>(body) {
        Ok(value) if value.get("status").is_some() => match unwrap_envelope(value)? {
            Value::String(text) => Ok(text),
            other => Ok(other.to_string()),
        },
        _ => Ok(body.to_string()),
    }
}

fn unwrap_envelope(value: Value) -> Result<Value, AttemptError> {
    match value.get("status").and_then(Value::as_str) {
        Some("error") => Err(AttemptError::Rejected {
            status: None,
            message: error_message(&value),
        }),
        Some("success") => Ok(value.get("data").cloned().unwrap_or(Value::Null)),
        _ => Ok(value),
    }
}

fn error_message(value: &Value) -> String {
    let data = value.get("data");
    data.and_then(|d| d.get("message"))
        .and_then(Value::as_str)
        .or_else(|| data.and_then(Value::as_str))
        .or_else(|| value.get("message").and_then(Value::as_str))
        .unwrap_or("node reported an error")
        .to_string()
}

fn rejected(status: u16, body: &str) -> AttemptError {
    let message = serde_json::from_str::<Value>(body)
        .ok()
        .map(|v| error_message(&v))
        .filter(|m| m != "node reported an error")
        .unwrap_or_else(|| {
            if looks_like_html(body) {
                "HTML error page".to_string()
            } else {
                body.chars().take(MAX_ERROR_BODY).collect()
            }
        });
    AttemptError::Rejected {
        status: Some(status),
        message,
    }
}

fn looks_like_html(body: &str) -> bool {
    let head = body.trim_start();
    head.starts_with('<') || head.get(..200).unwrap_or(head).to_lowercase().contains("<html")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_success_envelope_is_unwrapped() {
        let body = json!({"status": "success", "data": ["a", "b"]}).to_string();
        assert_eq!(classify_json(200, &body).unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_bare_json_passes_through() {
        assert_eq!(classify_json(200, r#"{"cpu_stats": {}}"#).unwrap(), json!({"cpu_stats": {}}));
    }

    #[test]
    fn test_error_envelope_is_rejected() {
        let body = json!({"status": "error", "data": {"code": 401, "message": "Unauthorized. Access denied."}})
            .to_string();
        assert_eq!(
            classify_json(200, &body).unwrap_err(),
            AttemptError::Rejected {
                status: None,
                message: "Unauthorized. Access denied.".into()
            }
        );
    }

    #[test]
    fn test_html_and_garbage_are_malformed() {
        let html = "<!DOCTYPE html><html><body>502 Bad Gateway</body></html>";
        assert!(matches!(classify_json(200, html), Err(AttemptError::Malformed(_))));
        assert!(matches!(classify_json(200, "not json"), Err(AttemptError::Malformed(_))));
        assert!(matches!(classify_text(200, html), Err(AttemptError::Malformed(_))));
    }

    #[test]
    fn test_non_2xx_is_rejected_with_status() {
        assert_eq!(
            classify_json(503, "<html>down</html>").unwrap_err(),
            AttemptError::Rejected {
                status: Some(503),
                message: "HTML error page".into()
            }
        );
        assert_eq!(
            classify_text(404, r#"{"status":"error","data":{"message":"no such app"}}"#).unwrap_err(),
            AttemptError::Rejected {
                status: Some(404),
                message: "no such app".into()
            }
        );
    }

    #[test]
    fn test_text_bodies() {
        assert_eq!(classify_text(200, "total 0\n").unwrap(), "total 0\n");
        assert_eq!(
            classify_text(200, r#"{"status":"success","data":"done"}"#).unwrap(),
            "done"
        );
    }
}
