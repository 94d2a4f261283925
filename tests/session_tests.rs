//! Login, token refresh and request interception against fake devices


use bspctl::errors::BspError;
use bspctl::remote::session::{AuthenticatedClient, Credentials};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use test_fixtures::{DeviceBehavior, FakeDevice, REFRESH_COOKIE_VALUE, login, session_config};

#[tokio::test]
async fn test_login_and_refresh_republishes_token() {
    let device = FakeDevice::start(DeviceBehavior::default());
    let client = login(&device).await;

    assert_eq!(client.token(), "Bearer token-0");
    assert!(client.is_refreshing());

    tokio::time::sleep(Duration::from_millis(1500)).await;

    assert_eq!(client.token(), "Bearer token-1");
    assert!(client.refresh_failure().is_none());

    let refreshes = device.calls_to("GET", "/auth/refresh");
    assert_eq!(refreshes.len(), 1);
    assert_eq!(
        refreshes[0].cookie.as_deref(),
        Some(format!("refresh_token={}", REFRESH_COOKIE_VALUE).as_str())
    );
    assert_eq!(refreshes[0].authorization.as_deref(), Some("Bearer token-0"));

    // later requests carry the refreshed token
    let response = client
        .send(client.request(Method::PUT, "/firmware/upgrade"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::ACCEPTED);
    let puts = device.calls_to("PUT", "/firmware/upgrade");
    assert_eq!(puts[0].authorization.as_deref(), Some("Bearer token-1"));
}

#[tokio::test]
async fn test_no_refresh_without_cookie() {
    let device = FakeDevice::start(DeviceBehavior {
        refresh_cookie: false,
        ..DeviceBehavior::default()
    });
    let client = login(&device).await;

    assert!(!client.is_refreshing());
    tokio::time::sleep(Duration::from_millis(1300)).await;

    assert!(device.calls_to("GET", "/auth/refresh").is_empty());
    assert_eq!(client.token(), "Bearer token-0");
}

#[tokio::test]
async fn test_wrong_password_is_invalid_credentials() {
    let device = FakeDevice::start(DeviceBehavior::default());

    let result = AuthenticatedClient::login_with(
        &device.host(),
        &Credentials::new("admin", "wrong"),
        &session_config(),
    )
    .await;

    assert!(matches!(result, Err(BspError::InvalidCredentials)));
    // the caller decides whether to try again
    assert_eq!(device.calls_to("POST", "/auth/login").len(), 1);
    assert!(device.calls_to("GET", "/auth/refresh").is_empty());
}

#[tokio::test]
async fn test_login_without_authorization_header() {
    let device = FakeDevice::start(DeviceBehavior {
        omit_authorization: true,
        ..DeviceBehavior::default()
    });

    let result = AuthenticatedClient::login_with(
        &device.host(),
        &Credentials::new("admin", test_fixtures::PASSWORD),
        &session_config(),
    )
    .await;

    assert!(matches!(
        result,
        Err(BspError::MissingAuthorization { operation: "login" })
    ));
}

#[tokio::test]
async fn test_failed_refresh_stops_loop_and_explains_401() {
    let device = FakeDevice::start(DeviceBehavior {
        refresh_status: 500,
        ..DeviceBehavior::default()
    });
    let client = login(&device).await;

    tokio::time::sleep(Duration::from_millis(1500)).await;

    let failure = client.refresh_failure().expect("refresh failure recorded");
    assert!(failure.to_string().contains("unexpected status code: 500"));
    assert!(!client.is_refreshing());

    // no retry after the first failure
    tokio::time::sleep(Duration::from_millis(1200)).await;
    assert_eq!(device.calls_to("GET", "/auth/refresh").len(), 1);

    let err = client
        .send(client.request(Method::GET, "/firmware/upgrade"))
        .await
        .unwrap_err();
    assert!(matches!(err, BspError::Unauthorized { refresh_failure: Some(_) }));
    assert_eq!(
        err.to_string(),
        "status 401 unauthorized, prior to that: refresh token: request returned unexpected status code: 500"
    );
}

#[tokio::test]
async fn test_plain_401_is_returned_as_response() {
    let device = FakeDevice::start(DeviceBehavior::default());
    let client = login(&device).await;
    device.expire_tokens();

    let response = client
        .send(client.request(Method::GET, "/firmware/upgrade"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_dropping_client_stops_refresh() {
    let device = FakeDevice::start(DeviceBehavior::default());
    let client = login(&device).await;
    let clone = client.clone();

    drop(client);
    assert!(clone.is_refreshing());
    drop(clone);

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(device.calls_to("GET", "/auth/refresh").is_empty());
}
