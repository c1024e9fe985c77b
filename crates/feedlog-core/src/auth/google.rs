//! Google OAuth sign-in for hosts without a platform sign-in SDK.
//!
//! The refresh token obtained by the host's consent flow is kept in a
//! [`SecretStore`]; access tokens are minted from it at the OAuth token
//! endpoint and held in memory only.

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration as StdDuration;

use async_trait::async_trait;
use chrono::Duration;
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use super::credentials::SecretStore;
use super::provider::{Credential, SignInProvider, SignedInUser};
use crate::clock::Clock;
use crate::error::{Result, StoreError};

const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// HTTP request timeout in seconds.
const REQUEST_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: i64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

pub struct GoogleOAuthProvider {
    client: Client,
    token_url: String,
    client_id: String,
    client_secret: Option<String>,
    account: String,
    secrets: Arc<dyn SecretStore>,
    clock: Arc<dyn Clock>,
    credential: Mutex<Option<Credential>>,
}

impl GoogleOAuthProvider {
    pub fn new(
        client_id: &str,
        client_secret: Option<&str>,
        account: &str,
        secrets: Arc<dyn SecretStore>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let client = Client::builder()
            .timeout(StdDuration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            token_url: TOKEN_URL.to_string(),
            client_id: client_id.to_string(),
            client_secret: client_secret.map(str::to_string),
            account: account.to_string(),
            secrets,
            clock,
            credential: Mutex::new(None),
        })
    }

    /// Point token exchanges at a different endpoint.
    pub fn with_token_url(mut self, token_url: &str) -> Self {
        self.token_url = token_url.to_string();
        self
    }

    /// Keep the refresh token from a completed consent flow.
    pub fn remember_refresh_token(&self, refresh_token: &str) -> Result<()> {
        self.secrets
            .save(&self.account, refresh_token)
            .map_err(|e| StoreError::AuthenticationFailed(format!("{:#}", e)))
    }

    fn stored_refresh_token(&self) -> Result<Option<String>> {
        self.secrets
            .load(&self.account)
            .map_err(|e| StoreError::AuthenticationFailed(format!("{:#}", e)))
    }

    fn required_refresh_token(&self) -> Result<String> {
        self.stored_refresh_token()?.ok_or_else(|| {
            StoreError::AuthenticationFailed(format!(
                "No refresh token stored for {}",
                self.account
            ))
        })
    }

    fn set_credential(&self, credential: Option<Credential>) {
        *self.credential.lock().unwrap_or_else(PoisonError::into_inner) = credential;
    }

    async fn exchange(&self, refresh_token: &str) -> Result<Credential> {
        let mut form = vec![
            ("grant_type", "refresh_token"),
            ("refresh_token", refresh_token),
            ("client_id", self.client_id.as_str()),
        ];
        if let Some(ref secret) = self.client_secret {
            form.push(("client_secret", secret.as_str()));
        }

        let response = self.client.post(&self.token_url).form(&form).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            return Err(match serde_json::from_str::<TokenErrorResponse>(&body) {
                Ok(err) if err.error == "invalid_grant" || status.as_u16() == 401 => {
                    StoreError::AuthenticationFailed(err.error_description.unwrap_or(err.error))
                }
                Ok(err) => StoreError::ProviderSpecific(match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                }),
                Err(_) => StoreError::from_status(status.as_u16(), &body),
            });
        }

        let token: TokenResponse = serde_json::from_str(&body)?;
        let credential = Credential::new(
            token.access_token,
            self.clock.now() + Duration::seconds(token.expires_in),
        );
        debug!(expires_in = token.expires_in, "Access token issued");
        self.set_credential(Some(credential.clone()));
        Ok(credential)
    }

    async fn sign_in_with(&self, refresh_token: &str) -> Result<SignedInUser> {
        let credential = self.exchange(refresh_token).await?;
        Ok(SignedInUser {
            email: self.account.clone(),
            credential,
        })
    }
}

#[async_trait]
impl SignInProvider for GoogleOAuthProvider {
    async fn sign_in(&self) -> Result<SignedInUser> {
        let refresh_token = self.required_refresh_token()?;
        self.sign_in_with(&refresh_token).await
    }

    async fn restore_previous_sign_in(&self) -> Result<Option<SignedInUser>> {
        match self.stored_refresh_token()? {
            Some(refresh_token) => self.sign_in_with(&refresh_token).await.map(Some),
            None => Ok(None),
        }
    }

    async fn sign_out(&self) -> Result<()> {
        self.secrets
            .delete(&self.account)
            .map_err(|e| StoreError::AuthenticationFailed(format!("{:#}", e)))?;
        self.set_credential(None);
        info!(account = %self.account, "Forgot stored refresh token");
        Ok(())
    }

    fn current_credential(&self) -> Option<Credential> {
        self.credential
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    async fn refresh_credential(&self) -> Result<Credential> {
        let refresh_token = self.required_refresh_token()?;
        self.exchange(&refresh_token).await
    }
}
