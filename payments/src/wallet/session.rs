//! Wallet session lifecycle.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::artifacts::{ArtifactError, ArtifactStore};
use super::provider::{ProviderError, TransactionReceipt, TransactionRequest, WalletProvider};
use crate::cell::TonAddress;
use crate::config::WALLET_ARTIFACT_KEYS;

/// Wallet session failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum WalletError {
    /// The user declined the connection or the provider is unreachable.
    #[error("wallet unavailable: {0}")]
    Unavailable(String),

    /// The user declined to sign, or let the request expire.
    #[error("transaction rejected: {0}")]
    UserRejected(String),

    /// A transaction was requested without an open session.
    #[error("no wallet connected")]
    NotConnected,

    /// Persisted provider artifacts could not be cleared.
    #[error(transparent)]
    Artifacts(#[from] ArtifactError),
}

/// A connected wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WalletSession {
    /// Account bound to the session.
    pub account: TonAddress,
    /// When the session was opened.
    pub connected_at: DateTime<Utc>,
}

/// Owns the provider session and the locally known account.
pub struct WalletSessionController {
    provider: Arc<dyn WalletProvider>,
    artifacts: Arc<dyn ArtifactStore>,
    session: Mutex<Option<WalletSession>>,
    connect_timeout: Duration,
}

impl WalletSessionController {
    /// Controller over `provider`, whose persisted keys live in `artifacts`.
    pub fn new(
        provider: Arc<dyn WalletProvider>,
        artifacts: Arc<dyn ArtifactStore>,
        connect_timeout: Duration,
    ) -> Self {
        Self {
            provider,
            artifacts,
            session: Mutex::new(None),
            connect_timeout,
        }
    }

    /// The connected account, if any.
    pub async fn account(&self) -> Option<TonAddress> {
        (*self.session.lock().await).map(|session| session.account)
    }

    /// Returns the bound account, opening a session first if there is none.
    pub async fn connect(&self) -> Result<TonAddress, WalletError> {
        let mut session = self.session.lock().await;
        if let Some(existing) = *session {
            debug!(account = %existing.account, "reusing wallet session");
            return Ok(existing.account);
        }

        let account = tokio::time::timeout(self.connect_timeout, self.provider.open_session())
            .await
            .map_err(|_| WalletError::Unavailable("connection prompt timed out".to_string()))?
            .map_err(|err| WalletError::Unavailable(err.to_string()))?;

        *session = Some(WalletSession {
            account,
            connected_at: Utc::now(),
        });
        info!(%account, "wallet connected");
        Ok(account)
    }

    /// Closes the provider session if one is open and forgets the account.
    /// A no-op when already disconnected.
    pub async fn disconnect(&self) -> Result<(), WalletError> {
        let mut session = self.session.lock().await;
        let had_local = session.take().is_some();
        if !had_local && !self.provider.is_connected() {
            return Ok(());
        }
        if let Err(err) = self.provider.close_session().await {
            warn!(error = %err, "provider failed to close session");
            if let ProviderError::Unreachable(_) = err {
                return Err(WalletError::Unavailable(err.to_string()));
            }
        }
        info!("wallet disconnected");
        Ok(())
    }

    /// Removes every persisted provider key so the next [`connect`](Self::connect)
    /// cannot resume a cached session. Returns how many keys were present.
    pub async fn reset_local_artifacts(&self) -> Result<usize, WalletError> {
        let _session = self.session.lock().await;
        let mut removed = 0;
        for key in WALLET_ARTIFACT_KEYS {
            if self.artifacts.remove(key)? {
                removed += 1;
            }
        }
        debug!(removed, "cleared wallet artifacts");
        Ok(removed)
    }

    /// Asks the connected wallet to sign and send `request`.
    pub async fn send_transaction(
        &self,
        request: &TransactionRequest,
    ) -> Result<TransactionReceipt, WalletError> {
        let session = self.session.lock().await;
        if session.is_none() {
            return Err(WalletError::NotConnected);
        }
        self.provider
            .send_transaction(request)
            .await
            .map_err(|err| match err {
                ProviderError::Rejected | ProviderError::Expired => {
                    WalletError::UserRejected(err.to_string())
                }
                ProviderError::Unreachable(_) => WalletError::Unavailable(err.to_string()),
            })
    }
}

impl std::fmt::Debug for WalletSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletSessionController")
            .field("connect_timeout", &self.connect_timeout)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use async_trait::async_trait;

    use super::*;
    use crate::wallet::MemoryArtifactStore;

    const BRIDGE_KEY: &str = "ton-connect-storage_bridge-connection";

    /// Resumes silently from a persisted bridge connection, otherwise
    /// "prompts" and binds whatever wallet the user has selected now.
    struct ResumingProvider {
        artifacts: Arc<MemoryArtifactStore>,
        selected: TonAddress,
        connected: AtomicBool,
        opens: AtomicUsize,
        closes: AtomicUsize,
        reject: bool,
    }

    impl ResumingProvider {
        fn new(artifacts: Arc<MemoryArtifactStore>, selected: TonAddress) -> Self {
            Self {
                artifacts,
                selected,
                connected: AtomicBool::new(false),
                opens: AtomicUsize::new(0),
                closes: AtomicUsize::new(0),
                reject: false,
            }
        }
    }

    #[async_trait]
    impl WalletProvider for ResumingProvider {
        fn is_connected(&self) -> bool {
            self.connected.load(Ordering::SeqCst)
        }

        async fn open_session(&self) -> Result<TonAddress, ProviderError> {
            self.opens.fetch_add(1, Ordering::SeqCst);
            if let Ok(Some(cached)) = self.artifacts.get(BRIDGE_KEY) {
                self.connected.store(true, Ordering::SeqCst);
                return TonAddress::parse(&cached)
                    .map_err(|err| ProviderError::Unreachable(err.to_string()));
            }
            if self.reject {
                return Err(ProviderError::Rejected);
            }
            self.artifacts
                .set(BRIDGE_KEY, &self.selected.to_raw())
                .map_err(|err| ProviderError::Unreachable(err.to_string()))?;
            self.connected.store(true, Ordering::SeqCst);
            Ok(self.selected)
        }

        async fn close_session(&self) -> Result<(), ProviderError> {
            self.closes.fetch_add(1, Ordering::SeqCst);
            self.connected.store(false, Ordering::SeqCst);
            Ok(())
        }

        async fn send_transaction(
            &self,
            _request: &TransactionRequest,
        ) -> Result<TransactionReceipt, ProviderError> {
            Err(ProviderError::Rejected)
        }
    }

    fn stale() -> TonAddress {
        TonAddress::new(0, [0x5A; 32])
    }

    fn current() -> TonAddress {
        TonAddress::new(0, [0xC0; 32])
    }

    fn controller(
        provider: ResumingProvider,
        artifacts: Arc<MemoryArtifactStore>,
    ) -> (WalletSessionController, Arc<ResumingProvider>) {
        let provider = Arc::new(provider);
        let controller = WalletSessionController::new(
            provider.clone(),
            artifacts,
            Duration::from_secs(5),
        );
        (controller, provider)
    }

    #[tokio::test]
    async fn reset_prevents_resuming_a_stale_session() {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        artifacts.set(BRIDGE_KEY, &stale().to_raw()).unwrap();
        artifacts
            .set("ton-connect-ui_preferred-wallet", "tonkeeper")
            .unwrap();
        let (controller, _) = controller(
            ResumingProvider::new(artifacts.clone(), current()),
            artifacts.clone(),
        );

        controller.disconnect().await.unwrap();
        assert_eq!(controller.reset_local_artifacts().await.unwrap(), 2);
        let account = controller.connect().await.unwrap();

        assert_eq!(account, current());
        assert_ne!(account, stale());
    }

    #[tokio::test]
    async fn without_reset_the_stale_account_comes_back() {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        artifacts.set(BRIDGE_KEY, &stale().to_raw()).unwrap();
        let (controller, _) = controller(
            ResumingProvider::new(artifacts.clone(), current()),
            artifacts.clone(),
        );

        assert_eq!(controller.connect().await.unwrap(), stale());
    }

    #[tokio::test]
    async fn connect_reuses_an_open_session() {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let (controller, provider) = controller(
            ResumingProvider::new(artifacts.clone(), current()),
            artifacts,
        );

        controller.connect().await.unwrap();
        controller.connect().await.unwrap();
        assert_eq!(provider.opens.load(Ordering::SeqCst), 1);
        assert_eq!(controller.account().await, Some(current()));
    }

    #[tokio::test]
    async fn disconnect_is_idempotent() {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let (controller, provider) = controller(
            ResumingProvider::new(artifacts.clone(), current()),
            artifacts,
        );

        controller.connect().await.unwrap();
        controller.disconnect().await.unwrap();
        controller.disconnect().await.unwrap();
        assert_eq!(provider.closes.load(Ordering::SeqCst), 1);
        assert_eq!(controller.account().await, None);
    }

    #[tokio::test]
    async fn declined_connection_is_unavailable() {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let mut provider = ResumingProvider::new(artifacts.clone(), current());
        provider.reject = true;
        let (controller, _) = controller(provider, artifacts);

        let err = controller.connect().await.unwrap_err();
        assert!(matches!(err, WalletError::Unavailable(_)));
        assert_eq!(controller.account().await, None);
    }

    #[tokio::test]
    async fn declined_signature_is_user_rejection() {
        let artifacts = Arc::new(MemoryArtifactStore::new());
        let (controller, _) = controller(
            ResumingProvider::new(artifacts.clone(), current()),
            artifacts,
        );
        let request = TransactionRequest {
            valid_until: 0,
            messages: Vec::new(),
        };

        assert_eq!(
            controller.send_transaction(&request).await.unwrap_err(),
            WalletError::NotConnected
        );
        controller.connect().await.unwrap();
        assert!(matches!(
            controller.send_transaction(&request).await.unwrap_err(),
            WalletError::UserRejected(_)
        ));
    }
}
