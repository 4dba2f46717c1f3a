use reqwest::StatusCode;
use serde::de::DeserializeOwned;

/// Result of inspecting one completed response.
#[derive(Debug)]
pub(crate) enum Classification<T> {
    Success(T),
    /// Non-2xx status. The body is kept for diagnostics, never decoded.
    HttpError { status: StatusCode, body: String },
    /// 2xx status with a body that does not decode into `T`.
    DecodeError { message: String, body: String },
}

/// Decides the outcome of a response from its status and full body.
pub(crate) fn classify<T: DeserializeOwned>(status: StatusCode, body: &[u8]) -> Classification<T> {
    if status.as_u16() / 100 != 2 {
        return Classification::HttpError {
            status,
            body: String::from_utf8_lossy(body).into_owned(),
        };
    }

    match serde_json::from_slice::<T>(body) {
        Ok(value) => Classification::Success(value),
        Err(err) => Classification::DecodeError {
            message: format!("invalid response JSON: {err}"),
            body: String::from_utf8_lossy(body).into_owned(),
        },
    }
}
