use anyhow::{Context, Result};
use keyring::Entry;

use crate::config::APP_NAME;

/// Keychain account holding the assistant API key
const ASSISTANT_ACCOUNT: &str = "assistant-api-key";

/// Keychain account holding the local data passphrase
const PASSPHRASE_ACCOUNT: &str = "local-data-passphrase";

/// Environment override for the assistant API key
pub const API_KEY_ENV: &str = "SAMPLEAGENT_API_KEY";

/// Environment override for the local data passphrase
pub const PASSPHRASE_ENV: &str = "SAMPLEAGENT_PASSPHRASE";

/// Secrets kept in the OS keychain rather than the config file.
pub struct CredentialStore;

impl CredentialStore {
    fn entry(account: &str) -> Result<Entry> {
        Entry::new(APP_NAME, account).context("Failed to create keyring entry")
    }

    /// Store the assistant API key in the OS keychain
    pub fn store_api_key(key: &str) -> Result<()> {
        Self::entry(ASSISTANT_ACCOUNT)?
            .set_password(key)
            .context("Failed to store API key in keychain")
    }

    pub fn delete_api_key() -> Result<()> {
        Self::entry(ASSISTANT_ACCOUNT)?
            .delete_credential()
            .context("Failed to delete API key from keychain")
    }

    /// The API key from the environment, falling back to the keychain.
    pub fn api_key() -> Option<String> {
        non_empty(std::env::var(API_KEY_ENV).ok())
            .or_else(|| non_empty(Self::entry(ASSISTANT_ACCOUNT).ok()?.get_password().ok()))
    }

    pub fn store_passphrase(passphrase: &str) -> Result<()> {
        Self::entry(PASSPHRASE_ACCOUNT)?
            .set_password(passphrase)
            .context("Failed to store passphrase in keychain")
    }

    pub fn passphrase() -> Option<String> {
        non_empty(std::env::var(PASSPHRASE_ENV).ok())
            .or_else(|| non_empty(Self::entry(PASSPHRASE_ACCOUNT).ok()?.get_password().ok()))
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
