use std::time::Duration;

use reqwest::{Method, StatusCode};

/// Bodies attached to errors are cut to this many bytes.
pub(crate) const MAX_ERROR_BODY_BYTES: usize = 512;

/// Error type returned by this crate.
///
/// Every variant produced by a call carries the method, the target URL and the
/// number of attempts issued, so it can be logged without the internal trace.
#[derive(Debug, thiserror::Error)]
pub enum CallError {
    /// Network failure below HTTP on the final attempt.
    #[error("{method} {url} failed after {attempts} attempt(s): transport error: {source}")]
    Transport {
        method: Method,
        url: String,
        attempts: usize,
        #[source]
        source: reqwest::Error,
    },
    /// Non-2xx status code with the (truncated) response body.
    #[error(
        "{method} {url} failed after {attempts} attempt(s): http error {status} {status_text}: {body}"
    )]
    Http {
        method: Method,
        url: String,
        status: u16,
        status_text: String,
        body: String,
        attempts: usize,
    },
    /// 2xx response whose body does not match the expected shape.
    #[error("{method} {url} failed after {attempts} attempt(s): decode error: {message}; body: {body}")]
    Decode {
        method: Method,
        url: String,
        message: String,
        body: String,
        attempts: usize,
    },
    /// The final attempt did not complete within its deadline.
    #[error("{method} {url} timed out after {attempts} attempt(s): final attempt exceeded {timeout:?}")]
    Timeout {
        method: Method,
        url: String,
        attempts: usize,
        timeout: Duration,
    },
    /// The task running the final attempt was cancelled by its runtime.
    #[error("{method} {url} interrupted after {attempts} attempt(s): attempt task was cancelled")]
    Interrupted {
        method: Method,
        url: String,
        attempts: usize,
    },
    /// The request could not be assembled; nothing was sent.
    #[error("invalid request: {0}")]
    InvalidRequest(String),
    /// Client configuration is missing or unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
    /// The shared HTTP transport could not be constructed.
    #[error("failed to build http transport: {0}")]
    Build(reqwest::Error),
}

impl CallError {
    /// HTTP status code, for [`CallError::Http`] only.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Http { status, .. } => StatusCode::from_u16(*status).ok(),
            _ => None,
        }
    }

    /// Number of attempts issued before the call gave up.
    ///
    /// Zero for errors raised before anything was sent.
    pub fn attempts(&self) -> usize {
        match self {
            Self::Transport { attempts, .. }
            | Self::Http { attempts, .. }
            | Self::Decode { attempts, .. }
            | Self::Timeout { attempts, .. }
            | Self::Interrupted { attempts, .. } => *attempts,
            Self::InvalidRequest(_) | Self::Config(_) | Self::Build(_) => 0,
        }
    }

    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

/// Cuts `body` to at most [`MAX_ERROR_BODY_BYTES`] bytes on a char boundary.
pub(crate) fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_BYTES {
        return body.to_owned();
    }
    let mut end = MAX_ERROR_BODY_BYTES;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::{Method, StatusCode};

    use super::{truncate_body, CallError, MAX_ERROR_BODY_BYTES};

    #[test]
    fn http_error_message_keeps_diagnostic_context() {
        let err = CallError::Http {
            method: Method::GET,
            url: "http://127.0.0.1/rpc".to_owned(),
            status: 404,
            status_text: "Not Found".to_owned(),
            body: "missing".to_owned(),
            attempts: 2,
        };

        let message = err.to_string();
        assert!(message.contains("http error 404 Not Found"));
        assert!(message.contains("GET http://127.0.0.1/rpc"));
        assert!(message.contains("2 attempt(s)"));
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
        assert_eq!(err.attempts(), 2);
    }

    #[test]
    fn timeout_reports_budget() {
        let err = CallError::Timeout {
            method: Method::POST,
            url: "http://host/x".to_owned(),
            attempts: 1,
            timeout: Duration::from_millis(1500),
        };
        assert!(err.is_timeout());
        assert!(err.to_string().contains("1.5s"));
        assert_eq!(err.status(), None);
    }

    #[test]
    fn truncate_keeps_short_bodies() {
        assert_eq!(truncate_body("short"), "short");
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        let body = "é".repeat(MAX_ERROR_BODY_BYTES);
        let cut = truncate_body(&body);
        assert!(cut.ends_with("..."));
        assert!(cut.len() <= MAX_ERROR_BODY_BYTES + 3);
        assert!(cut.trim_end_matches("...").chars().all(|c| c == 'é'));
    }
}
