use std::fmt;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};

use crate::error::Result;

/// Access token issued by the sign-in provider.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub access_token: String,
    pub expires_at: DateTime<Utc>,
}

impl Credential {
    pub fn new(access_token: impl Into<String>, expires_at: DateTime<Utc>) -> Self {
        Self {
            access_token: access_token.into(),
            expires_at,
        }
    }

    pub fn time_until_expiry(&self, now: DateTime<Utc>) -> Duration {
        self.expires_at - now
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

// Tokens stay out of logs
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("access_token", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedInUser {
    pub email: String,
    pub credential: Credential,
}

/// Platform sign-in collaborator.
///
/// The provider owns the credential; the token manager only asks for the
/// current one and tells the provider when to refresh it.
#[async_trait]
pub trait SignInProvider: Send + Sync {
    /// Interactive sign-in.
    async fn sign_in(&self) -> Result<SignedInUser>;

    /// Silent sign-in from a previous session, if one exists.
    async fn restore_previous_sign_in(&self) -> Result<Option<SignedInUser>>;

    async fn sign_out(&self) -> Result<()>;

    fn current_credential(&self) -> Option<Credential>;

    /// Obtain a new access token. Called once per attempt; retries are
    /// the caller's business.
    async fn refresh_credential(&self) -> Result<Credential>;
}
