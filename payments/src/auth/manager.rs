//! Session token manager with single-flight refresh.
//!
//! The manager is the only writer of the stored credential pair. Refresh
//! is single-flight: the first caller that needs a refresh becomes the
//! leader and performs the round-trip; everyone arriving while it is in
//! flight parks a oneshot sender in [`RefreshFlight::InFlight`] and receives
//! the leader's result. The pair is persisted before any waiter is woken.

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{AuthBackend, AuthError, CredentialPair, CredentialStore};
use crate::config::CookiePolicy;
use crate::metrics::PaymentMetrics;

type Waiter = oneshot::Sender<Result<String, AuthError>>;

/// Refresh state shared by every caller of one manager.
#[derive(Debug, Default)]
enum RefreshFlight {
    #[default]
    Idle,
    InFlight(Vec<Waiter>),
}

/// Resets the flight when the leader finishes or is dropped mid-refresh.
///
/// With an outcome, every waiter receives a copy of it. Without one (the
/// leader's future was cancelled) the senders are dropped and the waiters
/// see [`AuthError::RefreshInterrupted`].
struct FlightGuard<'a> {
    flight: &'a Mutex<RefreshFlight>,
    outcome: Option<Result<String, AuthError>>,
}

impl Drop for FlightGuard<'_> {
    fn drop(&mut self) {
        let previous = std::mem::take(&mut *self.flight.lock());
        if let (RefreshFlight::InFlight(waiters), Some(outcome)) = (previous, self.outcome.take()) {
            for waiter in waiters {
                let _ = waiter.send(outcome.clone());
            }
        }
    }
}

/// Owns the credential pair for one client session.
pub struct SessionTokenManager {
    store: Arc<dyn CredentialStore>,
    backend: Arc<dyn AuthBackend>,
    policy: CookiePolicy,
    refresh_timeout: Duration,
    flight: Mutex<RefreshFlight>,
    metrics: Option<Arc<PaymentMetrics>>,
}

impl SessionTokenManager {
    /// Creates a manager over `store`, refreshing through `backend`.
    pub fn new(
        store: Arc<dyn CredentialStore>,
        backend: Arc<dyn AuthBackend>,
        policy: CookiePolicy,
        refresh_timeout: Duration,
    ) -> Self {
        Self {
            store,
            backend,
            policy,
            refresh_timeout,
            flight: Mutex::new(RefreshFlight::Idle),
            metrics: None,
        }
    }

    /// Attaches metrics.
    pub fn with_metrics(mut self, metrics: Arc<PaymentMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// The stored access token if it is present and unexpired. Never
    /// refreshes.
    pub fn cached_access_token(&self) -> Option<String> {
        match self.store.load() {
            Ok(stored) => stored.access.map(|entry| entry.value),
            Err(err) => {
                warn!(error = %err, "credential store unreadable");
                None
            }
        }
    }

    /// Returns an unexpired access token, refreshing once if the cached one
    /// is absent or expired.
    pub async fn get_valid_access_token(&self) -> Result<String, AuthError> {
        if let Some(token) = self.cached_access_token() {
            return Ok(token);
        }
        debug!("access token absent or expired, refreshing");
        self.refresh().await
    }

    /// Exchanges the stored refresh token for a new pair.
    ///
    /// Concurrent callers share a single round-trip. Any failure purges the
    /// stored pair and is reported to every caller as
    /// [`AuthError::CredentialsExpired`].
    pub async fn refresh(&self) -> Result<String, AuthError> {
        let waiter = {
            let mut flight = self.flight.lock();
            match &mut *flight {
                RefreshFlight::InFlight(waiters) => {
                    let (tx, rx) = oneshot::channel();
                    waiters.push(tx);
                    Some(rx)
                }
                RefreshFlight::Idle => {
                    *flight = RefreshFlight::InFlight(Vec::new());
                    None
                }
            }
        };

        if let Some(rx) = waiter {
            debug!("joining in-flight refresh");
            return rx.await.unwrap_or(Err(AuthError::RefreshInterrupted));
        }

        let mut guard = FlightGuard {
            flight: &self.flight,
            outcome: None,
        };
        let outcome = self.perform_refresh().await;
        guard.outcome = Some(outcome.clone());
        drop(guard);
        outcome
    }

    /// Persists a pair issued outside the refresh path (sign-in).
    pub fn install(&self, pair: &CredentialPair) -> Result<(), AuthError> {
        self.store.save(pair, &self.policy)?;
        info!(access_expiry = %pair.access_expiry, "credentials installed");
        Ok(())
    }

    /// Drops the stored pair (sign-out).
    pub fn sign_out(&self) -> Result<(), AuthError> {
        self.store.purge()
    }

    async fn perform_refresh(&self) -> Result<String, AuthError> {
        if let Some(metrics) = &self.metrics {
            metrics.refresh_attempts_total.inc();
        }

        let refresh_token = match self.store.load() {
            Ok(stored) => stored.refresh.map(|entry| entry.value),
            Err(err) => return Err(self.expire(format!("credential store unreadable: {err}"))),
        };
        let Some(refresh_token) = refresh_token else {
            return Err(self.expire("no refresh token".to_string()));
        };

        let pair = match tokio::time::timeout(
            self.refresh_timeout,
            self.backend.refresh(&refresh_token),
        )
        .await
        {
            Ok(Ok(pair)) => pair,
            Ok(Err(err)) => return Err(self.expire(err.to_string())),
            Err(_) => return Err(self.expire("refresh timed out".to_string())),
        };

        if let Err(err) = self.store.save(&pair, &self.policy) {
            return Err(self.expire(format!("failed to persist refreshed pair: {err}")));
        }
        info!(access_expiry = %pair.access_expiry, "credentials refreshed");
        Ok(pair.access_token)
    }

    fn expire(&self, reason: String) -> AuthError {
        warn!(%reason, "refresh failed, purging credentials");
        if let Some(metrics) = &self.metrics {
            metrics.refresh_failures_total.inc();
        }
        if let Err(err) = self.store.purge() {
            warn!(error = %err, "failed to purge credentials");
        }
        AuthError::CredentialsExpired(reason)
    }
}

impl std::fmt::Debug for SessionTokenManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionTokenManager")
            .field("policy", &self.policy)
            .field("refresh_timeout", &self.refresh_timeout)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use chrono::Utc;

    use super::*;
    use crate::auth::token::test_jwt;
    use crate::auth::MemoryCredentialStore;
    use crate::config::{PRODUCTION_COOKIE_DOMAIN, REFRESH_TOKEN_ENTRY};

    struct CountingBackend {
        calls: AtomicUsize,
        delay: Duration,
        reject: bool,
    }

    impl CountingBackend {
        fn new(delay: Duration, reject: bool) -> Arc<Self> {
            Arc::new(Self {
                calls: AtomicUsize::new(0),
                delay,
                reject,
            })
        }
    }

    #[async_trait]
    impl AuthBackend for CountingBackend {
        async fn refresh(&self, _refresh_token: &str) -> Result<CredentialPair, AuthError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            if self.reject {
                return Err(AuthError::Rejected(401));
            }
            let exp = Utc::now().timestamp() + 3600 + n as i64;
            CredentialPair::from_tokens(test_jwt(Some(exp)), test_jwt(Some(exp + 86_400)))
        }
    }

    fn policy() -> CookiePolicy {
        CookiePolicy::for_host("localhost", PRODUCTION_COOKIE_DOMAIN)
    }

    fn expired_access_store() -> Arc<MemoryCredentialStore> {
        let now = Utc::now().timestamp();
        let pair =
            CredentialPair::from_tokens(test_jwt(Some(now - 5)), test_jwt(Some(now + 86_400)))
                .unwrap();
        Arc::new(MemoryCredentialStore::with_pair(&pair, &policy()))
    }

    #[tokio::test]
    async fn concurrent_callers_share_one_refresh() {
        let backend = CountingBackend::new(Duration::from_millis(50), false);
        let manager = Arc::new(SessionTokenManager::new(
            expired_access_store(),
            backend.clone(),
            policy(),
            Duration::from_secs(5),
        ));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let manager = manager.clone();
                tokio::spawn(async move { manager.get_valid_access_token().await })
            })
            .collect();
        let tokens: Vec<String> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|joined| joined.unwrap().unwrap())
            .collect();

        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(tokens.iter().all(|t| t == &tokens[0]));
        assert_eq!(manager.cached_access_token().as_deref(), Some(tokens[0].as_str()));
    }

    #[tokio::test]
    async fn rejection_purges_and_reaches_every_waiter() {
        let store = expired_access_store();
        let backend = CountingBackend::new(Duration::from_millis(50), true);
        let manager = Arc::new(SessionTokenManager::new(
            store.clone(),
            backend.clone(),
            policy(),
            Duration::from_secs(5),
        ));

        let (a, b) = tokio::join!(manager.refresh(), manager.refresh());
        assert!(matches!(a, Err(AuthError::CredentialsExpired(_))));
        assert!(matches!(b, Err(AuthError::CredentialsExpired(_))));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
        assert!(store.raw_entry(REFRESH_TOKEN_ENTRY).is_none());
    }

    #[tokio::test]
    async fn missing_refresh_token_expires_without_backend_call() {
        let backend = CountingBackend::new(Duration::ZERO, false);
        let manager = SessionTokenManager::new(
            Arc::new(MemoryCredentialStore::new()),
            backend.clone(),
            policy(),
            Duration::from_secs(5),
        );
        assert!(matches!(
            manager.get_valid_access_token().await,
            Err(AuthError::CredentialsExpired(_))
        ));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_backend_times_out_as_expired() {
        let store = expired_access_store();
        let backend = CountingBackend::new(Duration::from_secs(60), false);
        let manager =
            SessionTokenManager::new(store.clone(), backend, policy(), Duration::from_secs(1));
        assert!(matches!(
            manager.refresh().await,
            Err(AuthError::CredentialsExpired(reason)) if reason.contains("timed out")
        ));
        assert!(store.raw_entry(REFRESH_TOKEN_ENTRY).is_none());
    }

    #[tokio::test]
    async fn fresh_token_skips_refresh() {
        let now = Utc::now().timestamp();
        let pair =
            CredentialPair::from_tokens(test_jwt(Some(now + 600)), test_jwt(Some(now + 86_400)))
                .unwrap();
        let backend = CountingBackend::new(Duration::ZERO, false);
        let manager = SessionTokenManager::new(
            Arc::new(MemoryCredentialStore::with_pair(&pair, &policy())),
            backend.clone(),
            policy(),
            Duration::from_secs(5),
        );
        assert_eq!(manager.get_valid_access_token().await.unwrap(), pair.access_token);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn dropped_leader_releases_waiters() {
        let backend = CountingBackend::new(Duration::from_secs(30), false);
        let manager = Arc::new(SessionTokenManager::new(
            expired_access_store(),
            backend,
            policy(),
            Duration::from_secs(60),
        ));

        let leader = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        let follower = {
            let manager = manager.clone();
            tokio::spawn(async move { manager.refresh().await })
        };
        tokio::time::sleep(Duration::from_millis(20)).await;
        leader.abort();

        assert!(matches!(
            follower.await.unwrap(),
            Err(AuthError::RefreshInterrupted)
        ));
        // The flight is idle again, so a new refresh can lead.
        assert!(matches!(*manager.flight.lock(), RefreshFlight::Idle));
    }
}
