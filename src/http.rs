//! Plumbing shared by the HTTP service clients.

use std::time::Duration;

use crate::{Error, Result};

/// `seconds` as a [Duration], or [Error::Config] when it is negative, NaN or too large.
pub(crate) fn timeout(seconds: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(seconds).map_err(|e| Error::Config {
        path: None,
        reason: format!("invalid timeout {seconds}s: {e}"),
    })
}

/// Build a client whose requests, body included, give up after `timeout_secs`.
pub(crate) fn client(service: &'static str, timeout_secs: f64) -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(timeout(timeout_secs.max(0.001))?)
        .build()
        .map_err(|e| Error::Service {
            service,
            reason: e.to_string(),
        })
}

pub(crate) fn map_err(service: &'static str, timeout_secs: f64) -> impl Fn(reqwest::Error) -> Error {
    move |e| {
        if e.is_timeout() {
            Error::Timeout {
                service,
                seconds: timeout_secs,
            }
        } else {
            Error::Service {
                service,
                reason: e.to_string(),
            }
        }
    }
}

/// Turn non-2xx responses into [Error::Service], keeping the body for context.
pub(crate) async fn check(
    service: &'static str,
    response: reqwest::Response,
) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(Error::Service {
        service,
        reason: format!("{status}: {body}"),
    })
}
