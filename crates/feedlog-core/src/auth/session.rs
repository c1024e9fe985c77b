use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration as StdDuration;

use chrono::Duration;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::provider::{Credential, SignInProvider};
use crate::clock::Clock;
use crate::error::{Result, StoreError};

/// Refresh when fewer than 10 minutes of token lifetime remain.
const REFRESH_THRESHOLD_SECS: i64 = 600;

/// Maximum refresh attempts before giving up.
const MAX_REFRESH_ATTEMPTS: u32 = 3;

/// Delay after the first failed refresh; doubles after each further failure.
const INITIAL_BACKOFF_MS: u64 = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthState {
    SignedOut,
    SigningIn,
    SignedIn,
    TokenStale,
    Refreshing,
}

#[derive(Debug, Clone)]
pub struct RefreshPolicy {
    pub max_attempts: u32,
    pub initial_backoff: StdDuration,
    pub refresh_threshold: Duration,
}

impl Default for RefreshPolicy {
    fn default() -> Self {
        Self {
            max_attempts: MAX_REFRESH_ATTEMPTS,
            initial_backoff: StdDuration::from_millis(INITIAL_BACKOFF_MS),
            refresh_threshold: Duration::seconds(REFRESH_THRESHOLD_SECS),
        }
    }
}

impl RefreshPolicy {
    /// Delay after failed attempt number `attempt` (1-based).
    pub fn backoff_for(&self, attempt: u32) -> StdDuration {
        self.initial_backoff
            .saturating_mul(2u32.saturating_pow(attempt.saturating_sub(1)))
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    state: AuthState,
    user_email: Option<String>,
    /// Bumped whenever a new credential is obtained.
    generation: u64,
}

/// Restores a fallback state if an in-progress transition is dropped,
/// e.g. when the task awaiting a refresh is cancelled mid-backoff.
struct StateGuard<'a> {
    snapshot: &'a RwLock<Snapshot>,
    fallback: AuthState,
    armed: bool,
}

impl<'a> StateGuard<'a> {
    fn new(snapshot: &'a RwLock<Snapshot>, fallback: AuthState) -> Self {
        Self {
            snapshot,
            fallback,
            armed: true,
        }
    }

    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for StateGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
            snapshot.state = self.fallback;
            debug!(state = ?self.fallback, "Auth transition abandoned");
        }
    }
}

/// Keeps a usable credential available for remote calls.
///
/// Tracks sign-in state, refreshes proactively when a token is close to
/// expiry, and retries failed refreshes with exponential backoff.
/// Refreshes are serialized; concurrent callers share the result.
pub struct TokenManager {
    provider: Arc<dyn SignInProvider>,
    clock: Arc<dyn Clock>,
    policy: RefreshPolicy,
    snapshot: RwLock<Snapshot>,
    refresh_lock: Mutex<()>,
}

impl TokenManager {
    pub fn new(provider: Arc<dyn SignInProvider>, clock: Arc<dyn Clock>) -> Self {
        Self::with_policy(provider, clock, RefreshPolicy::default())
    }

    pub fn with_policy(
        provider: Arc<dyn SignInProvider>,
        clock: Arc<dyn Clock>,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            provider,
            clock,
            policy,
            snapshot: RwLock::new(Snapshot {
                state: AuthState::SignedOut,
                user_email: None,
                generation: 0,
            }),
            refresh_lock: Mutex::new(()),
        }
    }

    fn read(&self) -> Snapshot {
        self.snapshot
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn update(&self, f: impl FnOnce(&mut Snapshot)) {
        let mut snapshot = self.snapshot.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut snapshot);
    }

    fn set_state(&self, state: AuthState) {
        self.update(|s| s.state = state);
    }

    fn mark_signed_in(&self, email: String) {
        self.update(|s| {
            s.state = AuthState::SignedIn;
            s.user_email = Some(email);
            s.generation += 1;
        });
    }

    /// `SignedIn` becomes `TokenStale` once the token needs refreshing.
    fn mark_stale(&self) {
        self.update(|s| {
            if s.state == AuthState::SignedIn {
                debug!("Token stale");
                s.state = AuthState::TokenStale;
            }
        });
    }

    fn mark_signed_out(&self) {
        self.update(|s| {
            s.state = AuthState::SignedOut;
            s.user_email = None;
        });
    }

    pub fn state(&self) -> AuthState {
        self.read().state
    }

    pub fn is_signed_in(&self) -> bool {
        matches!(
            self.state(),
            AuthState::SignedIn | AuthState::TokenStale | AuthState::Refreshing
        )
    }

    pub fn user_email(&self) -> Option<String> {
        self.read().user_email
    }

    pub fn policy(&self) -> &RefreshPolicy {
        &self.policy
    }

    pub fn needs_refresh(&self, credential: &Credential) -> bool {
        credential.time_until_expiry(self.clock.now()) < self.policy.refresh_threshold
    }

    pub async fn sign_in(&self) -> Result<String> {
        let guard = StateGuard::new(&self.snapshot, AuthState::SignedOut);
        self.set_state(AuthState::SigningIn);

        match self.provider.sign_in().await {
            Ok(user) => {
                guard.disarm();
                info!(email = %user.email, "Signed in");
                self.mark_signed_in(user.email.clone());
                Ok(user.email)
            }
            Err(e) => {
                guard.disarm();
                warn!(error = %e, "Sign-in failed");
                self.mark_signed_out();
                Err(into_auth_failure(e))
            }
        }
    }

    /// Silent sign-in at launch. Returns whether a session was restored.
    pub async fn restore_previous_sign_in(&self) -> Result<bool> {
        match self.provider.restore_previous_sign_in().await {
            Ok(Some(user)) => {
                info!(email = %user.email, "Restored previous sign-in");
                self.mark_signed_in(user.email);
                Ok(true)
            }
            Ok(None) => {
                debug!("No previous sign-in to restore");
                self.mark_signed_out();
                Ok(false)
            }
            Err(e) => {
                warn!(error = %e, "Failed to restore previous sign-in");
                self.mark_signed_out();
                Err(into_auth_failure(e))
            }
        }
    }

    pub async fn sign_out(&self) -> Result<()> {
        self.provider.sign_out().await?;
        info!("Signed out");
        self.mark_signed_out();
        Ok(())
    }

    /// Proactive check for app-foreground transitions: refresh if the
    /// token expires within the refresh threshold.
    pub async fn handle_foreground(&self) -> Result<()> {
        if !self.is_signed_in() {
            return Ok(());
        }
        match self.provider.current_credential() {
            Some(credential) if !self.needs_refresh(&credential) => {
                debug!(
                    minutes_left = credential.time_until_expiry(self.clock.now()).num_minutes(),
                    "Token still fresh on foreground"
                );
                Ok(())
            }
            _ => {
                self.mark_stale();
                self.refresh(false).await.map(|_| ())
            }
        }
    }

    /// A credential safe to use right now, refreshing first if it is
    /// close to expiry.
    pub async fn valid_credential(&self) -> Result<Credential> {
        if !self.is_signed_in() {
            return Err(StoreError::NotSignedIn);
        }
        match self.provider.current_credential() {
            Some(credential) if !self.needs_refresh(&credential) => Ok(credential),
            _ => {
                self.mark_stale();
                self.refresh(false).await
            }
        }
    }

    /// Refresh regardless of expiry, after the remote side rejected a call.
    pub async fn force_refresh(&self) -> Result<Credential> {
        if !self.is_signed_in() {
            return Err(StoreError::NotSignedIn);
        }
        self.refresh(true).await
    }

    async fn refresh(&self, forced: bool) -> Result<Credential> {
        let seen_generation = self.read().generation;
        let _lock = self.refresh_lock.lock().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(credential) = self.provider.current_credential() {
            let refreshed_meanwhile = self.read().generation != seen_generation;
            if !self.needs_refresh(&credential) && (!forced || refreshed_meanwhile) {
                self.update(|s| {
                    if s.state == AuthState::TokenStale {
                        s.state = AuthState::SignedIn;
                    }
                });
                return Ok(credential);
            }
        }

        self.refresh_with_retry().await
    }

    async fn refresh_with_retry(&self) -> Result<Credential> {
        let max_attempts = self.policy.max_attempts.max(1);
        let guard = StateGuard::new(&self.snapshot, AuthState::TokenStale);
        self.set_state(AuthState::Refreshing);

        let mut last_error =
            StoreError::AuthenticationFailed("token refresh not attempted".to_string());
        for attempt in 1..=max_attempts {
            match self.provider.refresh_credential().await {
                Ok(credential) => {
                    guard.disarm();
                    self.update(|s| {
                        s.state = AuthState::SignedIn;
                        s.generation += 1;
                    });
                    info!(attempt, "Token refreshed");
                    return Ok(credential);
                }
                Err(e) => {
                    warn!(attempt, max_attempts, error = %e, "Token refresh failed");
                    last_error = e;
                    if attempt < max_attempts {
                        let delay = self.policy.backoff_for(attempt);
                        debug!(
                            backoff_ms = delay.as_millis() as u64,
                            "Backing off before next refresh"
                        );
                        self.clock.sleep(delay).await;
                    }
                }
            }
        }

        guard.disarm();
        if last_error.is_auth_rejection() {
            warn!("Token refresh rejected, signing out");
            self.mark_signed_out();
        } else {
            self.set_state(AuthState::TokenStale);
        }
        Err(into_auth_failure(last_error))
    }
}

fn into_auth_failure(err: StoreError) -> StoreError {
    match err {
        StoreError::AuthenticationFailed(_) => err,
        other => StoreError::AuthenticationFailed(other.to_string()),
    }
}
