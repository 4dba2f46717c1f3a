//! `resilient-http` is an async HTTP call layer that bounds and retries every
//! outbound request.
//!
//! Each call runs up to `retry_times + 1` attempts. Attempts before the last
//! one are abandoned after `retry_timeout` and retried on transport failures
//! (and on HTTP errors when `retry_on_http_error` is set); the last attempt
//! gets `total_timeout` and its outcome is final. Outcomes are classified the
//! same way for every verb:
//! - 2xx with a JSON body matching `T`: success;
//! - non-2xx: [`CallError::Http`];
//! - 2xx with a mismatched body: [`CallError::Decode`], never retried;
//! - network failure: [`CallError::Transport`];
//! - final deadline missed: [`CallError::Timeout`].
//!
//! Log events are emitted through `tracing` when the `tracing` feature is
//! enabled (off by default).
//!
//! Entry points:
//! - [`ResilientClient::send`]
//! - [`ResilientClient::get`], [`ResilientClient::delete`],
//!   [`ResilientClient::post`], [`ResilientClient::put`]

mod classify;
mod client;
mod error;
mod executor;
mod multipart;
mod options;
mod request;
mod retry;

pub use client::ResilientClient;
pub use error::CallError;
pub use options::{ClientOption, ClientOptions, OptionKey, OptionValue};
pub use request::{Request, RequestBuilder, CONTENT_TYPE_FORM, CONTENT_TYPE_JSON, LOG_ID_HEADER};
pub use reqwest::Method;

pub type Result<T> = std::result::Result<T, CallError>;
