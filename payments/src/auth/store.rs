//! Durable credential storage.
//!
//! The pair is persisted as two named entries, each carrying its own expiry
//! and the cookie scope it was written under. Stores behave like a cookie
//! jar: an entry past its expiry is invisible to [`CredentialStore::load`].

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::{AuthError, CredentialPair};
use crate::config::{CookiePolicy, ACCESS_TOKEN_ENTRY, REFRESH_TOKEN_ENTRY};

/// One persisted token.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialEntry {
    /// Token value.
    pub value: String,
    /// Instant after which the entry is discarded.
    pub expires_at: DateTime<Utc>,
    /// Scope the entry was written under.
    pub policy: CookiePolicy,
}

impl CredentialEntry {
    /// True once `now` has reached the expiry.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

impl std::fmt::Debug for CredentialEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialEntry")
            .field("expires_at", &self.expires_at)
            .field("domain", &self.policy.domain)
            .finish_non_exhaustive()
    }
}

/// The live (non-expired) entries of a store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoredCredentials {
    /// Access token entry, if present and unexpired.
    pub access: Option<CredentialEntry>,
    /// Refresh token entry, if present and unexpired.
    pub refresh: Option<CredentialEntry>,
}

impl StoredCredentials {
    fn from_entries(entries: &HashMap<String, CredentialEntry>, now: DateTime<Utc>) -> Self {
        let live = |name: &str| {
            entries
                .get(name)
                .filter(|entry| !entry.is_expired(now))
                .cloned()
        };
        Self {
            access: live(ACCESS_TOKEN_ENTRY),
            refresh: live(REFRESH_TOKEN_ENTRY),
        }
    }
}

fn entries_for(pair: &CredentialPair, policy: &CookiePolicy) -> [(String, CredentialEntry); 2] {
    [
        (
            ACCESS_TOKEN_ENTRY.to_string(),
            CredentialEntry {
                value: pair.access_token.clone(),
                expires_at: pair.access_expiry,
                policy: policy.clone(),
            },
        ),
        (
            REFRESH_TOKEN_ENTRY.to_string(),
            CredentialEntry {
                value: pair.refresh_token.clone(),
                expires_at: pair.refresh_expiry,
                policy: policy.clone(),
            },
        ),
    ]
}

/// Persistence backend for the credential pair.
///
/// `save` replaces both entries in one step; readers never observe a new
/// access token next to an old refresh token.
pub trait CredentialStore: Send + Sync {
    /// Returns the unexpired entries.
    fn load(&self) -> Result<StoredCredentials, AuthError>;

    /// Replaces both entries.
    fn save(&self, pair: &CredentialPair, policy: &CookiePolicy) -> Result<(), AuthError>;

    /// Removes both entries.
    fn purge(&self) -> Result<(), AuthError>;
}

// ---------------------------------------------------------------------------
// In-memory
// ---------------------------------------------------------------------------

/// Process-local store.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: Mutex<HashMap<String, CredentialEntry>>,
}

impl MemoryCredentialStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Store pre-populated with `pair`.
    pub fn with_pair(pair: &CredentialPair, policy: &CookiePolicy) -> Self {
        let store = Self::new();
        store.entries.lock().extend(entries_for(pair, policy));
        store
    }

    /// Raw entry regardless of expiry. Useful for inspecting purges.
    pub fn raw_entry(&self, name: &str) -> Option<CredentialEntry> {
        self.entries.lock().get(name).cloned()
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn load(&self) -> Result<StoredCredentials, AuthError> {
        Ok(StoredCredentials::from_entries(&self.entries.lock(), Utc::now()))
    }

    fn save(&self, pair: &CredentialPair, policy: &CookiePolicy) -> Result<(), AuthError> {
        self.entries.lock().extend(entries_for(pair, policy));
        Ok(())
    }

    fn purge(&self) -> Result<(), AuthError> {
        let mut entries = self.entries.lock();
        entries.remove(ACCESS_TOKEN_ENTRY);
        entries.remove(REFRESH_TOKEN_ENTRY);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// File-backed
// ---------------------------------------------------------------------------

/// JSON file store. The whole map is rewritten on every save.
#[derive(Debug)]
pub struct FileCredentialStore {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCredentialStore {
    /// Store at `path`. The file is created on first save.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    /// Location of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_entries(&self) -> Result<HashMap<String, CredentialEntry>, AuthError> {
        match std::fs::read(&self.path) {
            Ok(bytes) => {
                serde_json::from_slice(&bytes).map_err(|err| AuthError::Store(err.to_string()))
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(AuthError::Store(err.to_string())),
        }
    }

    fn write_entries(&self, entries: &HashMap<String, CredentialEntry>) -> Result<(), AuthError> {
        let json =
            serde_json::to_vec_pretty(entries).map_err(|err| AuthError::Store(err.to_string()))?;
        // Write then rename so a crash never leaves half a file behind.
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, json).map_err(|err| AuthError::Store(err.to_string()))?;
        std::fs::rename(&tmp, &self.path).map_err(|err| AuthError::Store(err.to_string()))
    }
}

impl CredentialStore for FileCredentialStore {
    fn load(&self) -> Result<StoredCredentials, AuthError> {
        let _guard = self.lock.lock();
        Ok(StoredCredentials::from_entries(
            &self.read_entries()?,
            Utc::now(),
        ))
    }

    fn save(&self, pair: &CredentialPair, policy: &CookiePolicy) -> Result<(), AuthError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        entries.extend(entries_for(pair, policy));
        self.write_entries(&entries)?;
        debug!(path = %self.path.display(), "credentials saved");
        Ok(())
    }

    fn purge(&self) -> Result<(), AuthError> {
        let _guard = self.lock.lock();
        let mut entries = self.read_entries()?;
        entries.remove(ACCESS_TOKEN_ENTRY);
        entries.remove(REFRESH_TOKEN_ENTRY);
        self.write_entries(&entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::token::test_jwt;
    use crate::config::PRODUCTION_COOKIE_DOMAIN;

    fn policy() -> CookiePolicy {
        CookiePolicy::for_host("localhost", PRODUCTION_COOKIE_DOMAIN)
    }

    fn pair(access_exp: i64, refresh_exp: i64) -> CredentialPair {
        CredentialPair::from_tokens(test_jwt(Some(access_exp)), test_jwt(Some(refresh_exp)))
            .unwrap()
    }

    #[test]
    fn expired_entries_are_invisible() {
        let now = Utc::now().timestamp();
        let store = MemoryCredentialStore::with_pair(&pair(now - 10, now + 3600), &policy());
        let loaded = store.load().unwrap();
        assert!(loaded.access.is_none());
        assert!(loaded.refresh.is_some());
        // Still physically present, just not served.
        assert!(store.raw_entry(ACCESS_TOKEN_ENTRY).is_some());
    }

    #[test]
    fn purge_removes_both() {
        let now = Utc::now().timestamp();
        let store = MemoryCredentialStore::with_pair(&pair(now + 60, now + 3600), &policy());
        store.purge().unwrap();
        assert_eq!(store.load().unwrap(), StoredCredentials::default());
    }

    #[test]
    fn file_store_persists_across_instances() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("credentials.json");
        let now = Utc::now().timestamp();
        let saved = pair(now + 60, now + 3600);

        FileCredentialStore::new(&path)
            .save(&saved, &policy())
            .unwrap();

        let reopened = FileCredentialStore::new(&path);
        let loaded = reopened.load().unwrap();
        assert_eq!(loaded.access.unwrap().value, saved.access_token);
        assert_eq!(loaded.refresh.as_ref().unwrap().policy.domain, "localhost");

        reopened.purge().unwrap();
        assert_eq!(reopened.load().unwrap(), StoredCredentials::default());
    }

    #[test]
    fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileCredentialStore::new(dir.path().join("absent.json"));
        assert_eq!(store.load().unwrap(), StoredCredentials::default());
    }
}
