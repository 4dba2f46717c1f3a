//! Retry and deadline orchestration for one call.
//!
//! Every attempt runs on its own task and is raced against a timer. Attempts
//! before the last one race `retry_timeout` and any transient failure moves on
//! to the next attempt; the last attempt races `total_timeout` and whatever
//! happens first ends the call. A timed-out attempt is abandoned, not
//! cancelled: its task keeps running and its result is dropped.

use std::{fmt::Display, future::Future, time::Duration};

use reqwest::StatusCode;
use tokio::task::JoinHandle;

use crate::{classify::Classification, ClientOptions};

/// Identifies a call in log events.
#[derive(Clone, Copy, Debug)]
#[cfg_attr(not(feature = "tracing"), allow(dead_code))]
pub(crate) struct CallTrace<'a> {
    pub log_id: &'a str,
    pub method: &'a str,
    pub url: &'a str,
}

/// Terminal failure of a call, before request context is attached.
#[derive(Debug)]
pub(crate) struct Failure<E> {
    pub attempts: usize,
    pub kind: FailureKind<E>,
}

#[derive(Debug)]
pub(crate) enum FailureKind<E> {
    Http { status: StatusCode, body: String },
    Decode { message: String, body: String },
    Transport(E),
    Timeout(Duration),
    Interrupted,
}

enum Event<T, E> {
    Completed(Classification<T>),
    Failed(E),
    /// The attempt task was cancelled by its runtime.
    Lost,
    Elapsed,
}

/// Runs up to `policy.retry_times + 1` attempts produced by `launch`.
///
/// `launch` receives the attempt index and returns the attempt future, which
/// is spawned immediately. Exactly one outcome is returned.
pub(crate) async fn run<T, E, F, Fut>(
    policy: &ClientOptions,
    trace: CallTrace<'_>,
    mut launch: F,
) -> Result<T, Failure<E>>
where
    F: FnMut(usize) -> Fut,
    Fut: Future<Output = Result<Classification<T>, E>> + Send + 'static,
    T: Send + 'static,
    E: Display + Send + 'static,
{
    for attempt in 0..policy.retry_times {
        let attempts = attempt + 1;
        match race(tokio::spawn(launch(attempt)), policy.retry_timeout).await {
            Event::Completed(Classification::Success(value)) => return Ok(value),
            Event::Completed(Classification::HttpError { status, .. })
                if policy.retry_on_http_error =>
            {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    log_id = trace.log_id,
                    method = trace.method,
                    url = trace.url,
                    attempt,
                    status = status.as_u16(),
                    "http error, retrying"
                );
                #[cfg(not(feature = "tracing"))]
                let _ = status;
            }
            Event::Completed(Classification::HttpError { status, body }) => {
                return Err(reject(trace, attempts, FailureKind::Http { status, body }));
            }
            Event::Completed(Classification::DecodeError { message, body }) => {
                return Err(reject(trace, attempts, FailureKind::Decode { message, body }));
            }
            Event::Failed(err) => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    log_id = trace.log_id,
                    method = trace.method,
                    url = trace.url,
                    attempt,
                    error = %err,
                    "transport error, retrying"
                );
                drop(err);
            }
            Event::Lost => {
                #[cfg(feature = "tracing")]
                tracing::warn!(
                    log_id = trace.log_id,
                    url = trace.url,
                    attempt,
                    "attempt task cancelled, retrying"
                );
            }
            Event::Elapsed => {
                #[cfg(feature = "tracing")]
                tracing::info!(
                    log_id = trace.log_id,
                    method = trace.method,
                    url = trace.url,
                    attempt,
                    timeout = ?policy.retry_timeout,
                    "attempt timed out, retrying"
                );
            }
        }
    }

    let attempts = policy.retry_times + 1;
    let kind = match race(tokio::spawn(launch(policy.retry_times)), policy.total_timeout).await {
        Event::Completed(Classification::Success(value)) => return Ok(value),
        Event::Completed(Classification::HttpError { status, body }) => {
            FailureKind::Http { status, body }
        }
        Event::Completed(Classification::DecodeError { message, body }) => {
            FailureKind::Decode { message, body }
        }
        Event::Failed(err) => FailureKind::Transport(err),
        Event::Lost => FailureKind::Interrupted,
        Event::Elapsed => FailureKind::Timeout(policy.total_timeout),
    };
    Err(reject(trace, attempts, kind))
}

async fn race<T, E>(
    handle: JoinHandle<Result<Classification<T>, E>>,
    budget: Duration,
) -> Event<T, E> {
    // Dropping the handle on timeout detaches the task; it is not aborted.
    match tokio::time::timeout(budget, handle).await {
        Ok(Ok(Ok(classification))) => Event::Completed(classification),
        Ok(Ok(Err(err))) => Event::Failed(err),
        Ok(Err(join_err)) if join_err.is_panic() => {
            std::panic::resume_unwind(join_err.into_panic())
        }
        Ok(Err(_)) => Event::Lost,
        Err(_) => Event::Elapsed,
    }
}

fn reject<E: Display>(trace: CallTrace<'_>, attempts: usize, kind: FailureKind<E>) -> Failure<E> {
    #[cfg(feature = "tracing")]
    match &kind {
        FailureKind::Http { status, .. } => tracing::error!(
            log_id = trace.log_id,
            method = trace.method,
            url = trace.url,
            attempts,
            status = status.as_u16(),
            "call failed with http error"
        ),
        FailureKind::Decode { message, .. } => tracing::error!(
            log_id = trace.log_id,
            method = trace.method,
            url = trace.url,
            attempts,
            %message,
            "call failed to decode response"
        ),
        FailureKind::Transport(err) => tracing::error!(
            log_id = trace.log_id,
            method = trace.method,
            url = trace.url,
            attempts,
            error = %err,
            "call failed with transport error"
        ),
        FailureKind::Timeout(timeout) => tracing::error!(
            log_id = trace.log_id,
            method = trace.method,
            url = trace.url,
            attempts,
            ?timeout,
            "call timed out"
        ),
        FailureKind::Interrupted => tracing::error!(
            log_id = trace.log_id,
            url = trace.url,
            attempts,
            "call interrupted"
        ),
    }
    #[cfg(not(feature = "tracing"))]
    let _ = trace;

    Failure { attempts, kind }
}
