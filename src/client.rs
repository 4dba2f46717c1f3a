use std::{fmt, sync::Arc};

use reqwest::{header::HeaderValue, Method};
use serde::de::DeserializeOwned;

use crate::{
    error::truncate_body,
    executor::execute,
    options::ENV_PREFIX,
    request::RequestBuilder,
    retry::{self, CallTrace, Failure, FailureKind},
    CallError, ClientOption, ClientOptions, Request, Result,
};

#[derive(Clone)]
/// HTTP client that retries and time-boxes every call.
///
/// Cloning is cheap and shares the connection pool.
pub struct ResilientClient {
    http: reqwest::Client,
    host: String,
    defaults: ClientOptions,
    options: Vec<ClientOption>,
}

impl fmt::Debug for ResilientClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResilientClient")
            .field("host", &self.host)
            .field("defaults", &self.defaults)
            .field("options", &self.options)
            .finish()
    }
}

impl ResilientClient {
    /// Creates a client for `host` (scheme and authority, e.g.
    /// `http://127.0.0.1:8080`) with the default policy.
    pub fn new(host: impl Into<String>) -> Result<Self> {
        Self::with_options(host, ClientOptions::default(), Vec::new())
    }

    /// Creates a client with explicit defaults and client-level overrides.
    ///
    /// The transport fields (`max_idle_conns`, `idle_conn_timeout`,
    /// `disable_compression`) are resolved once here; overriding them per call
    /// has no effect on the shared pool.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use std::time::Duration;
    /// use resilient_http::{ClientOption, ClientOptions, ResilientClient};
    ///
    /// let client = ResilientClient::with_options(
    ///     "http://127.0.0.1:8080",
    ///     ClientOptions::default(),
    ///     [
    ///         ClientOption::retry_times(2),
    ///         ClientOption::retry_timeout(Duration::from_secs(1)),
    ///     ],
    /// )
    /// .expect("transport must build");
    /// ```
    pub fn with_options<I>(
        host: impl Into<String>,
        defaults: ClientOptions,
        options: I,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = ClientOption>,
    {
        let options: Vec<ClientOption> = options.into_iter().collect();
        let transport = defaults.clone().resolve(&options);

        let mut builder = reqwest::Client::builder()
            .pool_max_idle_per_host(transport.max_idle_conns)
            .pool_idle_timeout(transport.idle_conn_timeout);
        if transport.disable_compression {
            builder = builder.no_gzip().no_brotli();
        }
        let http = builder.build().map_err(CallError::Build)?;

        let host = host.into();
        Ok(Self {
            http,
            host: host.trim_end_matches('/').to_owned(),
            defaults,
            options,
        })
    }

    /// Creates a client from environment variables.
    ///
    /// Reads `RESILIENT_HTTP_HOST` (required) and the policy variables listed
    /// on [`ClientOption::from_env`].
    ///
    /// # Example
    ///
    /// ```no_run
    /// use resilient_http::ResilientClient;
    ///
    /// let client = ResilientClient::from_env().expect("missing RESILIENT_HTTP_HOST");
    /// ```
    pub fn from_env() -> Result<Self> {
        let name = format!("{ENV_PREFIX}HOST");
        let host = std::env::var(&name)
            .map_err(|_| CallError::Config(format!("missing {name} environment variable")))?;
        if host.trim().is_empty() {
            return Err(CallError::Config(format!("{name} is set but empty")));
        }
        Self::with_options(host.trim(), ClientOptions::default(), ClientOption::from_env())
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Client-level overrides, applied before any per-call override.
    pub fn options(&self) -> &[ClientOption] {
        &self.options
    }

    /// Resolves the policy a call with `overrides` would run under.
    pub fn effective_options(&self, overrides: &[ClientOption]) -> ClientOptions {
        self.defaults
            .clone()
            .resolve(self.options.iter().chain(overrides))
    }

    /// Starts a request for `path`, relative to the client host.
    pub fn request(&self, method: Method, path: impl Into<String>) -> RequestBuilder<'_> {
        RequestBuilder::new(self, method, path.into())
    }

    pub fn get(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::GET, path)
    }

    pub fn delete(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::DELETE, path)
    }

    pub fn post(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::POST, path)
    }

    pub fn put(&self, path: impl Into<String>) -> RequestBuilder<'_> {
        self.request(Method::PUT, path)
    }

    /// Sends a fully built request and decodes a 2xx JSON body into `T`.
    ///
    /// Runs at most `retry_times + 1` attempts under the policy resolved from
    /// the client defaults, the client-level overrides and `overrides`, and
    /// returns exactly one outcome.
    pub async fn send<T>(&self, request: Request, overrides: &[ClientOption]) -> Result<T>
    where
        T: DeserializeOwned + Send + 'static,
    {
        url::Url::parse(&request.url).map_err(|err| {
            CallError::InvalidRequest(format!("invalid url '{}': {err}", request.url))
        })?;
        let policy = self.effective_options(overrides);
        let log_id = request.log_id.clone().unwrap_or_else(new_log_id);
        let log_header = HeaderValue::from_str(&log_id).map_err(|err| {
            CallError::InvalidRequest(format!("invalid log id '{log_id}': {err}"))
        })?;
        let request = Arc::new(request);

        #[cfg(feature = "tracing")]
        tracing::info!(
            log_id = %log_id,
            method = %request.method,
            url = %request.url,
            retry_times = policy.retry_times,
            "sending request"
        );

        let trace = CallTrace {
            log_id: &log_id,
            method: request.method.as_str(),
            url: &request.url,
        };
        retry::run(&policy, trace, |attempt| {
            execute::<T>(
                self.http.clone(),
                Arc::clone(&request),
                log_header.clone(),
                attempt,
            )
        })
        .await
        .map_err(|failure| call_error(&request, failure))
    }
}

fn new_log_id() -> String {
    uuid::Uuid::new_v4().simple().to_string()
}

fn call_error(request: &Request, failure: Failure<reqwest::Error>) -> CallError {
    let method = request.method.clone();
    let url = request.url.clone();
    let attempts = failure.attempts;
    match failure.kind {
        FailureKind::Http { status, body } => CallError::Http {
            method,
            url,
            status: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            body: truncate_body(&body),
            attempts,
        },
        FailureKind::Decode { message, body } => CallError::Decode {
            method,
            url,
            message,
            body: truncate_body(&body),
            attempts,
        },
        FailureKind::Transport(source) => CallError::Transport {
            method,
            url,
            attempts,
            source,
        },
        FailureKind::Timeout(timeout) => CallError::Timeout {
            method,
            url,
            attempts,
            timeout,
        },
        FailureKind::Interrupted => CallError::Interrupted {
            method,
            url,
            attempts,
        },
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use reqwest::{Method, StatusCode};

    use super::{call_error, new_log_id, ResilientClient};
    use crate::{
        retry::{Failure, FailureKind},
        CallError, ClientOption, ClientOptions, Request,
    };

    #[test]
    fn host_trailing_slash_is_trimmed() {
        let client = ResilientClient::new("http://domain/").expect("client must build");
        assert_eq!(client.host(), "http://domain");
    }

    #[test]
    fn client_defaults_resolve_to_documented_policy() {
        let client = ResilientClient::new("http://domain").expect("client must build");
        assert_eq!(client.effective_options(&[]), ClientOptions::default());
    }

    #[test]
    fn call_overrides_win_over_client_overrides() {
        let client = ResilientClient::with_options(
            "http://domain",
            ClientOptions::default(),
            [
                ClientOption::retry_times(3),
                ClientOption::retry_timeout(Duration::from_secs(10)),
            ],
        )
        .expect("client must build");

        let policy = client.effective_options(&[ClientOption::retry_times(1)]);
        assert_eq!(policy.retry_times, 1);
        assert_eq!(policy.retry_timeout, Duration::from_secs(10));
        assert_eq!(policy.total_timeout, Duration::from_secs(5));
        assert_eq!(client.options().len(), 2);
    }

    #[test]
    fn debug_shows_host_and_options() {
        let client = ResilientClient::new("http://domain").expect("client must build");
        let debug = format!("{client:?}");
        assert!(debug.contains("http://domain"));
        assert!(debug.contains("retry_times"));
    }

    #[test]
    fn log_ids_are_unique_header_safe_tokens() {
        let first = new_log_id();
        let second = new_log_id();
        assert_ne!(first, second);
        assert_eq!(first.len(), 32);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn http_failure_maps_to_http_error_with_reason() {
        let request = Request::new(Method::GET, "http://domain/rpc");
        let err = call_error(
            &request,
            Failure {
                attempts: 2,
                kind: FailureKind::Http {
                    status: StatusCode::NOT_FOUND,
                    body: "x".repeat(2_000),
                },
            },
        );

        match err {
            CallError::Http {
                status,
                status_text,
                body,
                attempts,
                ..
            } => {
                assert_eq!(status, 404);
                assert_eq!(status_text, "Not Found");
                assert!(body.len() < 600);
                assert_eq!(attempts, 2);
            }
            other => panic!("expected http error, got {other:?}"),
        }
    }

    #[test]
    fn timeout_failure_maps_to_timeout_error() {
        let request = Request::new(Method::POST, "http://domain/rpc");
        let err = call_error(
            &request,
            Failure {
                attempts: 1,
                kind: FailureKind::Timeout(Duration::from_secs(5)),
            },
        );
        assert!(err.is_timeout());
        assert!(err.to_string().contains("POST http://domain/rpc"));
    }

    #[tokio::test]
    async fn invalid_log_id_is_rejected_before_sending() {
        let client = ResilientClient::new("http://127.0.0.1:9").expect("client must build");
        let mut request = Request::new(Method::GET, "http://127.0.0.1:9/rpc");
        request.log_id = Some("bad\nid".to_owned());

        let err = client
            .send::<serde_json::Value>(request, &[])
            .await
            .expect_err("must fail");
        assert!(matches!(err, CallError::InvalidRequest(_)));
        assert_eq!(err.attempts(), 0);
    }

    #[tokio::test]
    async fn malformed_url_is_rejected_before_any_attempt() {
        let client = ResilientClient::new("http://127.0.0.1:9").expect("client must build");
        let request = Request::new(Method::GET, "not a url");

        let err = client
            .send::<serde_json::Value>(
                request,
                &[
                    ClientOption::retry_times(2),
                    ClientOption::retry_timeout(Duration::from_millis(100)),
                ],
            )
            .await
            .expect_err("must fail");
        match &err {
            CallError::InvalidRequest(message) => assert!(message.contains("not a url")),
            other => panic!("expected invalid request, got {other:?}"),
        }
        assert_eq!(err.attempts(), 0);
    }
}
