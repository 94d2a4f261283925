//! Published bearer token shared by request senders and the refresh loop

use reqwest::header::HeaderValue;
use std::sync::{Arc, PoisonError, RwLock};

use crate::errors::BspError;

/// Single writer, many readers. Readers get a whole `HeaderValue` or the
/// previous one, never a mix.
#[derive(Debug)]
pub struct TokenCell {
    current: RwLock<HeaderValue>,
}

impl TokenCell {
    pub fn new(token: HeaderValue) -> Self {
        Self {
            current: RwLock::new(token),
        }
    }

    pub fn load(&self) -> HeaderValue {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn store(&self, token: HeaderValue) {
        *self
            .current
            .write()
            .unwrap_or_else(PoisonError::into_inner) = token;
    }
}

/// State shared between an authenticated client and its refresh task
#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) token: TokenCell,
    refresh_failure: RwLock<Option<Arc<BspError>>>,
}

impl SessionState {
    pub(crate) fn new(token: HeaderValue) -> Self {
        Self {
            token: TokenCell::new(token),
            refresh_failure: RwLock::new(None),
        }
    }

    /// Last failure of the refresh loop, if it has recorded one yet
    pub(crate) fn refresh_failure(&self) -> Option<Arc<BspError>> {
        self.refresh_failure
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn record_refresh_failure(&self, err: BspError) {
        *self
            .refresh_failure
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(Arc::new(err));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_readers_never_see_torn_tokens() {
        let long_a = format!("Bearer {}", "a".repeat(4096));
        let long_b = format!("Bearer {}", "b".repeat(2048));
        let cell = Arc::new(TokenCell::new(HeaderValue::from_str(&long_a).unwrap()));

        let readers: Vec<_> = (0..8)
            .map(|_| {
                let cell = cell.clone();
                let (a, b) = (long_a.clone(), long_b.clone());
                thread::spawn(move || {
                    for _ in 0..2000 {
                        let token = cell.load();
                        let token = token.to_str().unwrap();
                        assert!(token == a || token == b);
                    }
                })
            })
            .collect();

        for i in 0..2000 {
            let next = if i % 2 == 0 { &long_b } else { &long_a };
            cell.store(HeaderValue::from_str(next).unwrap());
        }

        for reader in readers {
            reader.join().unwrap();
        }
    }

    #[test]
    fn test_refresh_failure_is_recorded() {
        let state = SessionState::new(HeaderValue::from_static("Bearer x"));
        assert!(state.refresh_failure().is_none());

        state.record_refresh_failure(BspError::Refresh("boom".to_string()));
        assert_eq!(
            state.refresh_failure().unwrap().to_string(),
            "refresh token: boom"
        );
    }
}
