//! Authentication: sign-in state and credential lifecycle.
//!
//! This module provides:
//! - `SignInProvider`: the platform sign-in collaborator that owns tokens
//! - `TokenManager`: sign-in state machine with proactive refresh and
//!   bounded exponential-backoff retry
//! - `GoogleOAuthProvider`: refresh-token based provider for hosts
//!   without a platform SDK
//! - `CredentialStore`: OS keychain storage for refresh tokens
//!
//! Tokens are refreshed when fewer than 10 minutes of lifetime remain.

pub mod credentials;
pub mod google;
pub mod provider;
pub mod session;

pub use credentials::{CredentialStore, SecretStore};
pub use google::GoogleOAuthProvider;
pub use provider::{Credential, SignInProvider, SignedInUser};
pub use session::{AuthState, RefreshPolicy, TokenManager};
