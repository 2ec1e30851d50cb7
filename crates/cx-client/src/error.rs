//! Error handling for the chart API client

use log::debug;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ApiError {
    /// Network failure, timeout or a body that could not be read.
    #[error("request failed: {0}")]
    Reqwest(#[from] reqwest::Error),

    /// The server answered with a non-2xx status.
    #[error("{message}")]
    Http { status: u16, message: String },

    #[error("unexpected response body: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("invalid API URL: {0}")]
    Url(String),

    #[error("cannot upload {path}: {reason}")]
    InvalidUpload { path: String, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ApiError {
    pub async fn from_response(response: reqwest::Response) -> ApiError {
        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => {
                debug!("could not read {} error body: {}", status, e);
                String::new()
            }
        };

        ApiError::Http {
            status: status.as_u16(),
            message: extract_error_message(status, &body),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            Self::Reqwest(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401 | 403))
    }
}

/// Pulls a human-readable message out of an error body.
///
/// Understands a bare JSON string, `{"detail": "..."}` and the validation
/// shape `{"detail": [{"msg": "..."}, ...]}`. Anything else becomes the
/// status line, plus the raw text when it is not JSON.
pub fn extract_error_message(status: StatusCode, body: &str) -> String {
    let status_line = match status.canonical_reason() {
        Some(reason) => format!("{} {}", status.as_u16(), reason),
        None => status.as_u16().to_string(),
    };

    let trimmed = body.trim();
    let Ok(parsed) = serde_json::from_str::<Value>(trimmed) else {
        if trimmed.is_empty() {
            return status_line;
        }
        return format!("{status_line} - {trimmed}");
    };

    match &parsed {
        Value::String(s) if !s.trim().is_empty() => return s.clone(),
        Value::Object(o) => match o.get("detail") {
            Some(Value::String(s)) if !s.trim().is_empty() => return s.clone(),
            Some(Value::Array(items)) => {
                let msgs: Vec<&str> = items
                    .iter()
                    .filter_map(|item| item.get("msg").and_then(Value::as_str))
                    .collect();
                if !msgs.is_empty() {
                    return msgs.join("; ");
                }
            }
            _ => {}
        },
        _ => {}
    }

    status_line
}
