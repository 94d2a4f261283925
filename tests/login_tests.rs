//! Logging in to several targets, with and without a password prompt


use bspctl::cli::LoginArgs;
use bspctl::cli::targets::{PasswordPrompt, login_all};
use bspctl::config::AppConfig;
use std::io;
use test_fixtures::{DeviceBehavior, FakeDevice, PASSWORD, session_config};

/// Answers prompts from a fixed list and remembers who was asked for
struct ScriptedPrompt {
    answers: Vec<&'static str>,
    asked: Vec<String>,
}

impl ScriptedPrompt {
    fn new(answers: &[&'static str]) -> Self {
        Self {
            answers: answers.iter().rev().copied().collect(),
            asked: Vec::new(),
        }
    }
}

impl PasswordPrompt for ScriptedPrompt {
    fn ask(&mut self, username: &str, host: &str) -> io::Result<String> {
        self.asked.push(format!("{}@{}", username, host));
        self.answers
            .pop()
            .map(str::to_string)
            .ok_or_else(|| io::Error::new(io::ErrorKind::UnexpectedEof, "no more answers"))
    }
}

fn config() -> AppConfig {
    AppConfig {
        session: session_config(),
        ..AppConfig::default()
    }
}

fn login_args(password: &str) -> LoginArgs {
    LoginArgs {
        username: Some("admin".to_string()),
        password: password.to_string(),
        insecure: false,
        interactive: None,
    }
}

#[tokio::test]
async fn test_rejected_password_without_prompt_fails_once() {
    let device = FakeDevice::start(DeviceBehavior::default());

    let err = login_all(&[device.host()], &login_args("wrong"), &config(), None)
        .await
        .unwrap_err();

    assert!(err.to_string().contains("unable to authenticate to"));
    assert_eq!(device.calls_to("POST", "/auth/login").len(), 1);
}

#[tokio::test]
async fn test_prompted_password_is_reused_for_remaining_hosts() {
    let first = FakeDevice::start(DeviceBehavior::default());
    let second = FakeDevice::start(DeviceBehavior::default());
    let hosts = vec![first.host(), second.host()];
    let mut prompt = ScriptedPrompt::new(&["still wrong", PASSWORD]);

    let endpoints = login_all(&hosts, &login_args("wrong"), &config(), Some(&mut prompt))
        .await
        .unwrap();

    assert_eq!(endpoints.len(), 2);
    assert_eq!(endpoints[0].hostname, first.host());
    assert_eq!(endpoints[1].client.token(), "Bearer token-0");

    // asked twice for the first host, never for the second
    assert_eq!(
        prompt.asked,
        vec![format!("admin@{}", first.host()), format!("admin@{}", first.host())]
    );
    assert_eq!(first.calls_to("POST", "/auth/login").len(), 3);
    assert_eq!(second.calls_to("POST", "/auth/login").len(), 1);
}

#[tokio::test]
async fn test_prompt_failure_aborts_login() {
    let device = FakeDevice::start(DeviceBehavior::default());
    let mut prompt = ScriptedPrompt::new(&[]);

    let err = login_all(&[device.host()], &login_args("wrong"), &config(), Some(&mut prompt))
        .await
        .unwrap_err();

    assert!(format!("{:#}", err).contains("unable to ask for password"));
}
