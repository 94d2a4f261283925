//! Authenticated HTTP sessions with a controller
//!
//! [`AuthenticatedClient::login`] exchanges a username and password for a
//! bearer token. When the device also hands out a `refresh_token` cookie, a
//! background task renews the bearer token on a fixed interval. Every request
//! sent through [`AuthenticatedClient::send`] carries the token current at the
//! time of sending.

pub mod refresh;
pub mod token;

use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::config::SessionConfig;
use crate::errors::{BspError, Result};
use refresh::{authorization, refresh_token_cookie};
pub use token::TokenCell;
use token::SessionState;

pub const LOGIN_PATH: &str = "/auth/login";
pub const REFRESH_PATH: &str = "/auth/refresh";

/// Username and password for a device
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

#[derive(Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
}

/// An HTTP client bound to one device, carrying a live bearer token.
///
/// Clones share the token and the refresh task. The refresh task is aborted
/// when the last clone is dropped.
#[derive(Clone)]
pub struct AuthenticatedClient {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    http: reqwest::Client,
    origin: String,
    state: Arc<SessionState>,
    refresh: Option<JoinHandle<()>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        if let Some(handle) = self.refresh.take() {
            handle.abort();
        }
    }
}

impl fmt::Debug for AuthenticatedClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticatedClient")
            .field("origin", &self.inner.origin)
            .field("refreshing", &self.is_refreshing())
            .finish()
    }
}

impl AuthenticatedClient {
    /// Log in with the default session settings
    pub async fn login(host: &str, username: &str, password: &str, insecure: bool) -> Result<Self> {
        let config = SessionConfig {
            insecure,
            ..SessionConfig::default()
        };
        Self::login_with(host, &Credentials::new(username, password), &config).await
    }

    /// Log in to `host` and start the refresh loop if the device allows it
    pub async fn login_with(
        host: &str,
        credentials: &Credentials,
        config: &SessionConfig,
    ) -> Result<Self> {
        let origin = origin(&config.scheme, host)?;

        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(config.insecure)
            .connect_timeout(config.connect_timeout())
            .build()?;

        log::debug!("Logging in to {} as {}", origin, credentials.username);

        let response = http
            .post(format!("{}{}", origin, LOGIN_PATH))
            .timeout(config.login_timeout())
            .json(&LoginRequest {
                username: &credentials.username,
                password: &credentials.password,
            })
            .send()
            .await?;

        match response.status() {
            StatusCode::OK => {}
            StatusCode::FORBIDDEN => return Err(BspError::InvalidCredentials),
            status => {
                return Err(BspError::UnexpectedStatus {
                    operation: "login",
                    status,
                });
            }
        }

        let token = authorization(response.headers())
            .ok_or(BspError::MissingAuthorization { operation: "login" })?;
        let state = Arc::new(SessionState::new(token));

        let refresh = match refresh_token_cookie(&response) {
            Some(refresh_token) => {
                log::debug!(
                    "{}: refreshing token every {:?}",
                    origin,
                    config.refresh_interval()
                );
                Some(tokio::spawn(refresh::refresh_loop(
                    http.clone(),
                    format!("{}{}", origin, REFRESH_PATH),
                    refresh_token,
                    state.clone(),
                    config.refresh_interval(),
                )))
            }
            None => {
                log::debug!("{}: no refresh token offered, token will expire", origin);
                None
            }
        };

        Ok(Self {
            inner: Arc::new(SessionInner {
                http,
                origin,
                state,
                refresh,
            }),
        })
    }

    /// `scheme://host` of the device, without a trailing slash
    pub fn origin(&self) -> &str {
        &self.inner.origin
    }

    /// Request builder for `path` on the device. Send it with [`Self::send`].
    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.inner
            .http
            .request(method, format!("{}{}", self.inner.origin, path))
    }

    /// Attach the current bearer token and execute the request.
    ///
    /// A 401 is returned as a plain response unless the refresh loop has
    /// already failed, in which case that failure is reported with it.
    pub async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let mut request = builder.build()?;
        request
            .headers_mut()
            .insert(AUTHORIZATION, self.inner.state.token.load());

        log::trace!("{} {}", request.method(), request.url());

        match self.inner.http.execute(request).await {
            Err(source) => Err(BspError::Transport {
                source,
                refresh_failure: self.refresh_failure(),
            }),
            Ok(response) if response.status() == StatusCode::UNAUTHORIZED => {
                match self.refresh_failure() {
                    Some(refresh_failure) => Err(BspError::Unauthorized {
                        refresh_failure: Some(refresh_failure),
                    }),
                    None => Ok(response),
                }
            }
            Ok(response) => Ok(response),
        }
    }

    /// The bearer token requests are currently sent with
    pub fn token(&self) -> reqwest::header::HeaderValue {
        self.inner.state.token.load()
    }

    /// Failure that ended the refresh loop, if any
    pub fn refresh_failure(&self) -> Option<Arc<BspError>> {
        self.inner.state.refresh_failure()
    }

    /// Whether a refresh task was started and is still alive
    pub fn is_refreshing(&self) -> bool {
        self.inner
            .refresh
            .as_ref()
            .is_some_and(|handle| !handle.is_finished())
    }
}

fn origin(scheme: &str, host: &str) -> Result<String> {
    let host = host.trim().trim_end_matches('/');
    if host.is_empty() || host.contains('/') {
        return Err(BspError::InvalidHost(format!("{:?}", host)));
    }

    let origin = format!("{}://{}", scheme, host);
    url::Url::parse(&origin).map_err(|e| BspError::InvalidHost(format!("{}: {}", host, e)))?;
    Ok(origin)
}
