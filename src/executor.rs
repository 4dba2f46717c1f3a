use std::sync::Arc;

use reqwest::header::HeaderValue;
use serde::de::DeserializeOwned;

use crate::{
    classify::{classify, Classification},
    request::LOG_ID_HEADER,
    Request,
};

/// Performs one network call and classifies the completed response.
///
/// The body is read here, on the attempt's own task, so the caller only ever
/// waits on the finished classification. Failing to read the body counts as a
/// transport error.
pub(crate) async fn execute<T>(
    http: reqwest::Client,
    request: Arc<Request>,
    log_id: HeaderValue,
    attempt: usize,
) -> Result<Classification<T>, reqwest::Error>
where
    T: DeserializeOwned,
{
    #[cfg(feature = "tracing")]
    tracing::debug!(
        log_id = ?log_id,
        method = %request.method,
        url = %request.url,
        attempt,
        "dispatching attempt"
    );
    #[cfg(not(feature = "tracing"))]
    let _ = attempt;

    let mut builder = http
        .request(request.method.clone(), request.url.as_str())
        .header(LOG_ID_HEADER, log_id)
        .headers(request.headers.clone());
    if let Some(body) = &request.body {
        builder = builder.body(body.clone());
    }

    let response = builder.send().await?;
    let status = response.status();
    let body = response.bytes().await?;

    #[cfg(feature = "tracing")]
    tracing::debug!(
        url = %request.url,
        attempt,
        status = status.as_u16(),
        body_len = body.len(),
        "response received"
    );

    Ok(classify(status, &body))
}
