//! Account store and connection collaborators.
//!
//! The transport reads the access credential from an [`AccountStore`] and
//! surfaces fatal failures through a [`ConnectionSink`]. Both are owned by
//! the surrounding chat session; talkline only holds shared handles.

use std::cell::RefCell;
use std::collections::HashMap;

/// Setting key under which the access credential is stored.
pub const ACCESS_TOKEN_KEY: &str = "auth_token";

/// Persistent per-account settings.
pub trait AccountStore {
    /// Read a string setting, or `default` if unset.
    fn get_string(&self, key: &str, default: &str) -> String;

    /// Delete a setting.
    fn remove_setting(&self, key: &str);
}

/// The connection a transport reports to.
pub trait ConnectionSink {
    /// Surface an unrecoverable error to the user; the session is torn down.
    fn report_fatal(&self, message: &str);

    /// Tell the session not to reconnect automatically after the next error.
    fn set_no_reconnect(&self);
}

/// In-memory [`AccountStore`].
#[derive(Debug, Default)]
pub struct MemoryAccount {
    settings: RefCell<HashMap<String, String>>,
}

impl MemoryAccount {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store holding an access credential.
    pub fn with_access_token(token: &str) -> Self {
        let account = Self::new();
        account.set_string(ACCESS_TOKEN_KEY, token);
        account
    }

    /// Write a string setting.
    pub fn set_string(&self, key: &str, value: &str) {
        self.settings
            .borrow_mut()
            .insert(key.to_string(), value.to_string());
    }

    /// Whether a setting is present.
    pub fn contains(&self, key: &str) -> bool {
        self.settings.borrow().contains_key(key)
    }
}

impl AccountStore for MemoryAccount {
    fn get_string(&self, key: &str, default: &str) -> String {
        self.settings
            .borrow()
            .get(key)
            .cloned()
            .unwrap_or_else(|| default.to_string())
    }

    fn remove_setting(&self, key: &str) {
        self.settings.borrow_mut().remove(key);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn memory_account_round_trip() {
        let account = MemoryAccount::with_access_token("secret");
        assert_eq!(account.get_string(ACCESS_TOKEN_KEY, ""), "secret");

        account.remove_setting(ACCESS_TOKEN_KEY);
        assert!(!account.contains(ACCESS_TOKEN_KEY));
        assert_eq!(account.get_string(ACCESS_TOKEN_KEY, "none"), "none");
    }
}
