//! Background token refresh

use reqwest::StatusCode;
use reqwest::header::{AUTHORIZATION, COOKIE, HeaderMap, HeaderValue};
use std::sync::Arc;
use std::time::Duration;

use super::token::SessionState;
use crate::errors::{BspError, Result};

pub const REFRESH_COOKIE: &str = "refresh_token";

/// Non-empty `Authorization` header of a response
pub(crate) fn authorization(headers: &HeaderMap) -> Option<HeaderValue> {
    headers
        .get(AUTHORIZATION)
        .filter(|value| !value.is_empty())
        .cloned()
}

/// Non-empty value of the `refresh_token` cookie set by `response`
pub(crate) fn refresh_token_cookie(response: &reqwest::Response) -> Option<String> {
    response
        .cookies()
        .find(|cookie| cookie.name() == REFRESH_COOKIE && !cookie.value().is_empty())
        .map(|cookie| cookie.value().to_string())
}

/// Refresh every `interval` until the first failure.
///
/// The failure is recorded on `state` and the loop ends for good; nothing
/// restarts it. The owning client aborts this task when it is dropped.
pub(crate) async fn refresh_loop(
    http: reqwest::Client,
    url: String,
    refresh_token: String,
    state: Arc<SessionState>,
    interval: Duration,
) {
    loop {
        tokio::time::sleep(interval).await;

        match refresh_once(&http, &url, &refresh_token, &state).await {
            Ok(token) => {
                state.token.store(token);
                log::debug!("Session token refreshed via {}", url);
            }
            Err(e) => {
                log::warn!("{}; this session will no longer be refreshed", e);
                state.record_refresh_failure(e);
                return;
            }
        }
    }
}

async fn refresh_once(
    http: &reqwest::Client,
    url: &str,
    refresh_token: &str,
    state: &SessionState,
) -> Result<HeaderValue> {
    let response = http
        .get(url)
        .header(AUTHORIZATION, state.token.load())
        .header(COOKIE, format!("{}={}", REFRESH_COOKIE, refresh_token))
        .send()
        .await
        .map_err(|e| BspError::Refresh(format!("request failed: {}", e)))?;

    if response.status() != StatusCode::OK {
        return Err(BspError::Refresh(format!(
            "request returned unexpected status code: {}",
            response.status().as_u16()
        )));
    }

    authorization(response.headers()).ok_or_else(|| {
        BspError::Refresh(
            "a successive call to refresh did not include a new JWT in its response".to_string(),
        )
    })
}
