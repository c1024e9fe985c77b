use anyhow::{Context, Result};
use keyring::Entry;

const SERVICE_NAME: &str = "feedlog";

/// Storage for long-lived secrets such as OAuth refresh tokens.
pub trait SecretStore: Send + Sync {
    /// The secret stored for `account`, or `None` if there is none.
    fn load(&self, account: &str) -> Result<Option<String>>;
    /// Store `secret` for `account`, replacing any previous value.
    fn save(&self, account: &str, secret: &str) -> Result<()>;
    /// Remove the secret for `account`. Missing entries are not an error.
    fn delete(&self, account: &str) -> Result<()>;
}

/// Secrets kept in the OS keychain.
pub struct CredentialStore {
    service: String,
}

impl Default for CredentialStore {
    fn default() -> Self {
        Self::new(SERVICE_NAME)
    }
}

impl CredentialStore {
    /// A store whose keychain entries live under `service`.
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// Keychain entry for `account` under this store's service name.
    fn entry(&self, account: &str) -> Result<Entry> {
        Entry::new(&self.service, account).context("Failed to create keyring entry")
    }
}

impl SecretStore for CredentialStore {
    /// A missing keychain entry reads as `None`.
    fn load(&self, account: &str) -> Result<Option<String>> {
        match self.entry(account)?.get_password() {
            Ok(secret) => Ok(Some(secret)),
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(e).context("Failed to retrieve secret from keychain"),
        }
    }

    /// Overwrites the keychain password for `account`.
    fn save(&self, account: &str, secret: &str) -> Result<()> {
        self.entry(account)?
            .set_password(secret)
            .context("Failed to store secret in keychain")
    }

    /// Deleting an entry that was never stored succeeds.
    fn delete(&self, account: &str) -> Result<()> {
        match self.entry(account)?.delete_credential() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(e).context("Failed to delete secret from keychain"),
        }
    }
}
