//! Bearer token storage.
//!
//! On device the token lives in the OS credential store (Keychain, Android
//! keystore bridge, DPAPI, Secret Service) via the `keyring` crate. The
//! in-memory store backs tests and "do not remember me" sessions.

use std::sync::Mutex;

use keyring::Entry;
use tracing::{info, warn};
use zeroize::Zeroizing;

use crate::error::{AppError, AppResult};

const SERVICE_NAME: &str = "garage-jobcard";

// Credential keys
pub const KEY_AUTH_TOKEN: &str = "auth_token";
pub const KEY_BASE_URL: &str = "api_base_url";

pub trait TokenStore: Send + Sync {
    fn load(&self) -> Option<Zeroizing<String>>;
    fn save(&self, token: &str) -> AppResult<()>;
    fn clear(&self) -> AppResult<()>;
}

// ---------------------------------------------------------------------------
// Keyring helpers
// ---------------------------------------------------------------------------

/// Retrieve a single credential from the OS keyring. Returns `None` when the
/// entry does not exist (or the platform returns a "not found" error).
pub fn get_credential(key: &str) -> Option<String> {
    let entry = match Entry::new(SERVICE_NAME, key) {
        Ok(e) => e,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to create entry");
            return None;
        }
    };
    match entry.get_password() {
        Ok(pw) => Some(pw),
        Err(keyring::Error::NoEntry) => None,
        Err(e) => {
            warn!(key, error = %e, "keyring: failed to read credential");
            None
        }
    }
}

pub fn set_credential(key: &str, value: &str) -> AppResult<()> {
    let entry = Entry::new(SERVICE_NAME, key)?;
    entry.set_password(value)?;
    Ok(())
}

/// Delete a credential. Silently succeeds if the entry does not exist.
pub fn delete_credential(key: &str) -> AppResult<()> {
    let entry = Entry::new(SERVICE_NAME, key)?;
    match entry.delete_credential() {
        Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
        Err(e) => Err(AppError::Storage(e.to_string())),
    }
}

/// Show only the last four characters of a token in logs.
pub fn mask_token(token: &str) -> String {
    let chars: Vec<char> = token.chars().collect();
    if chars.len() <= 4 {
        return "****".to_string();
    }
    let tail: String = chars[chars.len() - 4..].iter().collect();
    format!("****{tail}")
}

// ---------------------------------------------------------------------------
// Stores
// ---------------------------------------------------------------------------

#[derive(Debug, Default, Clone, Copy)]
pub struct KeyringTokenStore;

impl TokenStore for KeyringTokenStore {
    fn load(&self) -> Option<Zeroizing<String>> {
        get_credential(KEY_AUTH_TOKEN)
            .filter(|t| !t.trim().is_empty())
            .map(Zeroizing::new)
    }

    fn save(&self, token: &str) -> AppResult<()> {
        set_credential(KEY_AUTH_TOKEN, token.trim())?;
        info!(token = %mask_token(token), "auth token stored");
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        delete_credential(KEY_AUTH_TOKEN)
    }
}

#[derive(Default)]
pub struct MemoryTokenStore {
    token: Mutex<Option<Zeroizing<String>>>,
}

impl MemoryTokenStore {
    pub fn with_token(token: &str) -> Self {
        Self {
            token: Mutex::new(Some(Zeroizing::new(token.to_string()))),
        }
    }
}

impl TokenStore for MemoryTokenStore {
    fn load(&self) -> Option<Zeroizing<String>> {
        self.token.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn save(&self, token: &str) -> AppResult<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) =
            Some(Zeroizing::new(token.trim().to_string()));
        Ok(())
    }

    fn clear(&self) -> AppResult<()> {
        *self.token.lock().unwrap_or_else(|e| e.into_inner()) = None;
        Ok(())
    }
}
