//! Session-scoped storage of the access/refresh token pair.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard};

use chrono::{DateTime, Utc};

use crate::models::auth::TokenPair;

pub const ACCESS_TOKEN_KEY: &str = "access_token";
pub const REFRESH_TOKEN_KEY: &str = "refresh_token";
pub const TOKEN_EXPIRY_KEY: &str = "token_expiry";

/// An access token counts as expired this long before its real expiry.
pub const EXPIRY_MARGIN_MS: i64 = 60_000;

/// Key-value medium behind the token store.
pub trait TokenStorage: Send + Sync {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&self, key: &str, value: String);
    fn remove(&self, key: &str);
}

/// In-process storage that lives exactly as long as the client process.
#[derive(Debug, Default)]
pub struct SessionStorage {
    entries: Mutex<HashMap<String, String>>,
}

impl SessionStorage {
    fn entries(&self) -> MutexGuard<'_, HashMap<String, String>> {
        // A panic elsewhere must not make the tokens unreadable.
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl TokenStorage for SessionStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.entries().get(key).cloned()
    }

    fn set(&self, key: &str, value: String) {
        self.entries().insert(key.to_string(), value);
    }

    fn remove(&self, key: &str) {
        self.entries().remove(key);
    }
}

/// Owner of the current token pair.
///
/// Writers are the refresh path of the HTTP client and the login/logout
/// paths; everything else only reads. Every write bumps [`generation`],
/// which lets a caller detect that the pair changed while it was waiting.
///
/// [`generation`]: TokenStore::generation
pub struct TokenStore {
    storage: Box<dyn TokenStorage>,
    generation: AtomicU64,
}

impl Default for TokenStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

impl std::fmt::Debug for TokenStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenStore")
            .field("has_access", &self.access().is_some())
            .field("has_refresh", &self.refresh().is_some())
            .field("generation", &self.generation())
            .finish()
    }
}

impl TokenStore {
    pub fn new(storage: impl TokenStorage + 'static) -> Self {
        Self {
            storage: Box::new(storage),
            generation: AtomicU64::new(0),
        }
    }

    pub fn in_memory() -> Self {
        Self::new(SessionStorage::default())
    }

    pub fn save(&self, tokens: &TokenPair) {
        self.save_at(tokens, Utc::now());
    }

    /// Store the pair with an absolute expiry of `now + expires_in`.
    pub fn save_at(&self, tokens: &TokenPair, now: DateTime<Utc>) {
        let expiry = now.timestamp_millis() + tokens.expires_in.saturating_mul(1000);
        self.storage.set(ACCESS_TOKEN_KEY, tokens.access_token.clone());
        self.storage.set(REFRESH_TOKEN_KEY, tokens.refresh_token.clone());
        self.storage.set(TOKEN_EXPIRY_KEY, expiry.to_string());
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    pub fn access(&self) -> Option<String> {
        self.storage.get(ACCESS_TOKEN_KEY)
    }

    pub fn refresh(&self) -> Option<String> {
        self.storage.get(REFRESH_TOKEN_KEY)
    }

    /// Absolute expiry in epoch milliseconds, if one is stored and readable.
    pub fn expiry_millis(&self) -> Option<i64> {
        self.storage
            .get(TOKEN_EXPIRY_KEY)
            .and_then(|v| v.trim().parse().ok())
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        match self.expiry_millis() {
            Some(expiry) => now.timestamp_millis() >= expiry - EXPIRY_MARGIN_MS,
            None => true,
        }
    }

    /// Removes all three entries. Safe to call on an empty store.
    pub fn clear(&self) {
        self.storage.remove(ACCESS_TOKEN_KEY);
        self.storage.remove(REFRESH_TOKEN_KEY);
        self.storage.remove(TOKEN_EXPIRY_KEY);
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// "Might be logged in": either token is present. Not a validity check.
    pub fn is_authenticated(&self) -> bool {
        self.access().is_some() || self.refresh().is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}
