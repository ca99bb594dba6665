//! # Session Credentials
//!
//! ```text
//! token.rs    - CredentialPair and JWT `exp` decoding
//! store.rs    - CredentialStore trait, in-memory and JSON-file stores
//! backend.rs  - AuthBackend trait and the HTTP `/auth/refresh` client
//! manager.rs  - SessionTokenManager: cached token, single-flight refresh
//! ```

pub mod backend;
pub mod manager;
pub mod store;
pub mod token;

use thiserror::Error;

use crate::http::TransportError;

pub use backend::{AuthBackend, HttpAuthBackend, JwtInfo, JwtResponse};
pub use manager::SessionTokenManager;
pub use store::{
    CredentialEntry, CredentialStore, FileCredentialStore, MemoryCredentialStore,
    StoredCredentials,
};
pub use token::CredentialPair;

/// Authentication failures. `Clone` so one refresh result can be handed to
/// every waiter.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthError {
    /// The refresh token is absent, rejected, or the refresh failed. The
    /// stored pair has been purged; the user must sign in again.
    #[error("credentials expired: {0}")]
    CredentialsExpired(String),

    /// The refresh this caller was waiting on was cancelled before it
    /// produced a result. Nothing was purged.
    #[error("in-flight refresh was interrupted")]
    RefreshInterrupted,

    /// The backend answered the refresh with a non-success status.
    #[error("refresh rejected with status {0}")]
    Rejected(u16),

    /// A token or `jwt_info` body could not be decoded.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The credential store failed to read or write.
    #[error("credential store error: {0}")]
    Store(String),

    /// Transport failure talking to the auth backend.
    #[error(transparent)]
    Transport(#[from] TransportError),
}
