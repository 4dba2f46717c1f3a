use std::time::Duration;

/// Environment variable prefix read by [`ClientOption::from_env`].
pub const ENV_PREFIX: &str = "RESILIENT_HTTP_";

/// Effective timeout, retry and transport policy for one call.
///
/// Built by folding [`ClientOption`] overrides onto a default value with
/// [`ClientOptions::resolve`].
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Idle connections kept per host by the shared pool.
    pub max_idle_conns: usize,
    /// How long an idle pooled connection is kept alive.
    pub idle_conn_timeout: Duration,
    /// Disables gzip/brotli negotiation on the shared transport.
    pub disable_compression: bool,
    /// Number of retries after the initial attempt.
    pub retry_times: usize,
    /// Deadline of every non-final attempt.
    pub retry_timeout: Duration,
    /// Deadline of the final attempt. Its expiry ends the call.
    pub total_timeout: Duration,
    /// Whether non-2xx responses are retried while attempts remain.
    pub retry_on_http_error: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            max_idle_conns: 10,
            idle_conn_timeout: Duration::from_secs(30),
            disable_compression: true,
            retry_times: 0,
            retry_timeout: Duration::from_secs(5),
            total_timeout: Duration::from_secs(5),
            retry_on_http_error: false,
        }
    }
}

impl ClientOptions {
    /// Applies `overrides` in order on top of `self`.
    ///
    /// Later overrides win on the same key. An override whose value does not
    /// fit its key (wrong type, or a zero timeout) is skipped without error,
    /// so callers cannot tell that it was dropped.
    pub fn resolve<'a, I>(self, overrides: I) -> Self
    where
        I: IntoIterator<Item = &'a ClientOption>,
    {
        overrides.into_iter().fold(self, |mut acc, option| {
            match (option.key, option.value) {
                (OptionKey::MaxIdleConns, OptionValue::Count(v)) => acc.max_idle_conns = v,
                (OptionKey::IdleConnTimeout, OptionValue::Duration(v)) => {
                    acc.idle_conn_timeout = v
                }
                (OptionKey::DisableCompression, OptionValue::Flag(v)) => {
                    acc.disable_compression = v
                }
                (OptionKey::RetryTimes, OptionValue::Count(v)) => acc.retry_times = v,
                (OptionKey::RetryTimeout, OptionValue::Duration(v)) if !v.is_zero() => {
                    acc.retry_timeout = v
                }
                (OptionKey::TotalTimeout, OptionValue::Duration(v)) if !v.is_zero() => {
                    acc.total_timeout = v
                }
                (OptionKey::RetryOnHttpError, OptionValue::Flag(v)) => acc.retry_on_http_error = v,
                _ => {
                    #[cfg(feature = "tracing")]
                    tracing::debug!(key = ?option.key, value = ?option.value, "ignoring mismatched client option");
                }
            }
            acc
        })
    }

    /// Upper bound on how long one call can wait for attempts to finish.
    pub fn worst_case_latency(&self) -> Duration {
        let retries = u32::try_from(self.retry_times).unwrap_or(u32::MAX);
        self.retry_timeout
            .saturating_mul(retries)
            .saturating_add(self.total_timeout)
    }
}

/// Field of [`ClientOptions`] targeted by an override.
#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub enum OptionKey {
    MaxIdleConns,
    IdleConnTimeout,
    DisableCompression,
    RetryTimes,
    RetryTimeout,
    TotalTimeout,
    RetryOnHttpError,
}

/// Value carried by an override.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OptionValue {
    Count(usize),
    Duration(Duration),
    Flag(bool),
}

impl From<usize> for OptionValue {
    fn from(value: usize) -> Self {
        Self::Count(value)
    }
}

impl From<Duration> for OptionValue {
    fn from(value: Duration) -> Self {
        Self::Duration(value)
    }
}

impl From<bool> for OptionValue {
    fn from(value: bool) -> Self {
        Self::Flag(value)
    }
}

/// One policy override, applied at client or call level.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClientOption {
    pub key: OptionKey,
    pub value: OptionValue,
}

impl ClientOption {
    /// Builds an arbitrary override. The value is checked only at resolution.
    pub fn new(key: OptionKey, value: impl Into<OptionValue>) -> Self {
        Self {
            key,
            value: value.into(),
        }
    }

    pub fn max_idle_conns(value: usize) -> Self {
        Self::new(OptionKey::MaxIdleConns, value)
    }

    pub fn idle_conn_timeout(value: Duration) -> Self {
        Self::new(OptionKey::IdleConnTimeout, value)
    }

    pub fn disable_compression(value: bool) -> Self {
        Self::new(OptionKey::DisableCompression, value)
    }

    pub fn retry_times(value: usize) -> Self {
        Self::new(OptionKey::RetryTimes, value)
    }

    pub fn retry_timeout(value: Duration) -> Self {
        Self::new(OptionKey::RetryTimeout, value)
    }

    pub fn total_timeout(value: Duration) -> Self {
        Self::new(OptionKey::TotalTimeout, value)
    }

    pub fn retry_on_http_error(value: bool) -> Self {
        Self::new(OptionKey::RetryOnHttpError, value)
    }

    /// Reads overrides from `RESILIENT_HTTP_*` environment variables.
    ///
    /// Reads:
    /// - `RESILIENT_HTTP_MAX_IDLE_CONNS`
    /// - `RESILIENT_HTTP_IDLE_CONN_TIMEOUT_MS`
    /// - `RESILIENT_HTTP_DISABLE_COMPRESSION`
    /// - `RESILIENT_HTTP_RETRY_TIMES`
    /// - `RESILIENT_HTTP_RETRY_TIMEOUT_MS`
    /// - `RESILIENT_HTTP_TOTAL_TIMEOUT_MS`
    /// - `RESILIENT_HTTP_RETRY_ON_HTTP_ERROR`
    ///
    /// Unset or unparseable variables are skipped.
    pub fn from_env() -> Vec<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Vec<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |suffix: &str| {
            lookup(&format!("{ENV_PREFIX}{suffix}"))
                .map(|raw| raw.trim().to_owned())
                .filter(|raw| !raw.is_empty())
        };
        let count = |suffix: &str| read(suffix).and_then(|raw| raw.parse::<usize>().ok());
        let millis = |suffix: &str| {
            read(suffix)
                .and_then(|raw| raw.parse::<u64>().ok())
                .map(Duration::from_millis)
        };
        let flag = |suffix: &str| read(suffix).and_then(|raw| parse_flag(&raw));

        [
            count("MAX_IDLE_CONNS").map(Self::max_idle_conns),
            millis("IDLE_CONN_TIMEOUT_MS").map(Self::idle_conn_timeout),
            flag("DISABLE_COMPRESSION").map(Self::disable_compression),
            count("RETRY_TIMES").map(Self::retry_times),
            millis("RETRY_TIMEOUT_MS").map(Self::retry_timeout),
            millis("TOTAL_TIMEOUT_MS").map(Self::total_timeout),
            flag("RETRY_ON_HTTP_ERROR").map(Self::retry_on_http_error),
        ]
        .into_iter()
        .flatten()
        .collect()
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
