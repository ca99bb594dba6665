//! # Wallet Sessions
//!
//! ```text
//! provider.rs   - WalletProvider trait, sendTransaction request/receipt
//! artifacts.rs  - ArtifactStore: the provider's persisted session keys
//! session.rs    - WalletSessionController: connect, disconnect, reset
//! ```
//!
//! A purchase never trusts an existing session: the orchestrator
//! disconnects, clears the provider's persisted keys, and connects again so
//! the account it pays from is the one the user has selected right now.

pub mod artifacts;
pub mod provider;
pub mod session;

pub use artifacts::{ArtifactError, ArtifactStore, MemoryArtifactStore};
pub use provider::{
    ProviderError, TransactionReceipt, TransactionRequest, WalletMessage, WalletProvider,
};
pub use session::{WalletError, WalletSession, WalletSessionController};
