//! # Payment Configuration & Constants
//!
//! Protocol constants live at the top of this file; everything an operator
//! may reasonably want to change per deployment lives in [`ClientConfig`].
//! The jetton constants are dictated by the token-contract standard and are
//! not configurable; changing them breaks every deployed wallet contract.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::cell::TonAddress;

// ---------------------------------------------------------------------------
// Jetton Transfer Protocol
// ---------------------------------------------------------------------------

/// `transfer` operation code of the jetton wallet standard (TEP-74).
pub const JETTON_TRANSFER_OPCODE: u32 = 0x0f8a_7ea5;

/// 32-bit zero prefix marking a forward payload as a plain-text comment.
pub const COMMENT_PREFIX: u32 = 0;

/// Query id written when the caller does not supply one.
pub const DEFAULT_QUERY_ID: u64 = 0;

/// Nanotons per native unit.
pub const NANO_PER_TON: u128 = 1_000_000_000;

/// Native amount attached to the transfer message to pay for jetton wallet
/// gas: 0.038 TON.
pub const DEFAULT_GAS_FEE_NANO: u128 = 38_000_000;

/// Native amount forwarded to the destination with the transfer
/// notification.
pub const DEFAULT_FORWARD_AMOUNT_NANO: u128 = 1;

/// Native balance that keeps a purchase eligible even when the token
/// balance falls short: 0.1 TON.
pub const DEFAULT_GAS_ONLY_THRESHOLD_NANO: u128 = 100_000_000;

/// Decimal places of the course token. The academy jetton is indivisible.
pub const JETTON_DECIMALS: u32 = 0;

/// How long a submitted transaction stays valid for the wallet provider.
pub const TRANSACTION_VALIDITY: Duration = Duration::from_secs(5 * 60);

/// Exit code a get-method returns when the contract is not deployed.
pub const EXIT_CODE_UNINITIALIZED: i64 = -13;

// ---------------------------------------------------------------------------
// Timeouts
// ---------------------------------------------------------------------------

/// Upper bound on a single backend HTTP request.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(15);

/// Upper bound on one credential refresh round-trip.
pub const DEFAULT_REFRESH_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the combined native + token balance read.
pub const DEFAULT_BALANCE_TIMEOUT: Duration = Duration::from_secs(10);

/// Upper bound on the wallet connection prompt.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(120);

/// Retries the HTTP transport spends on idempotent reads.
pub const DEFAULT_MAX_RETRIES: usize = 2;

// ---------------------------------------------------------------------------
// Persisted State Keys
// ---------------------------------------------------------------------------

/// Credential entry holding the access token.
pub const ACCESS_TOKEN_ENTRY: &str = "student_access_token";

/// Credential entry holding the refresh token.
pub const REFRESH_TOKEN_ENTRY: &str = "student_refresh_token";

/// Every key the wallet-connect provider persists between sessions. All of
/// them are removed before a fresh connection.
pub const WALLET_ARTIFACT_KEYS: [&str; 5] = [
    "ton-connect-ui_last-selected-wallet-info",
    "ton-connect-storage_bridge-connection",
    "ton-connect-storage_http-bridge-gateway::https://tonconnectbridge.mytonwallet.org/bridge/",
    "ton-connect-ui_wallet-info",
    "ton-connect-ui_preferred-wallet",
];

/// Cookie domain used outside local development.
pub const PRODUCTION_COOKIE_DOMAIN: &str = ".academy.gradosphera.org";

/// Backend base URL used when none is configured.
pub const DEFAULT_API_BASE_URL: &str = "https://api.academy.gradosphera.org";

/// Public toncenter endpoint.
pub const DEFAULT_CHAIN_API_URL: &str = "https://toncenter.com";

// ---------------------------------------------------------------------------
// Runtime configuration
// ---------------------------------------------------------------------------

/// Deployment flavor. Decides the cookie scope of persisted credentials.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    /// Local development against `localhost`.
    Development,
    /// Public deployment.
    #[default]
    Production,
}

/// Configuration loading failures.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for [`ClientConfig`].
    #[error("invalid config file: {0}")]
    Parse(#[from] serde_json::Error),
}

/// Runtime settings of the payment client.
///
/// Every field has a default, so an empty JSON object is a valid config.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Academy backend base URL.
    pub api_base_url: String,
    /// Chain HTTP API base URL (toncenter-compatible).
    pub chain_api_url: String,
    /// Chain HTTP API key, appended as `api_key` when present.
    pub chain_api_key: Option<String>,
    /// Master contract of the course token.
    pub jetton_master: Option<TonAddress>,
    /// Native amount attached to the transfer message (nanotons).
    pub gas_fee_nano: u128,
    /// Native amount forwarded with the transfer notification (nanotons).
    pub forward_amount_nano: u128,
    /// Native balance that still counts as sufficient (nanotons).
    /// `None` disables the gas-only path.
    pub gas_only_threshold_nano: Option<u128>,
    /// Per-request timeout, milliseconds.
    pub request_timeout_ms: u64,
    /// Credential refresh timeout, milliseconds.
    pub refresh_timeout_ms: u64,
    /// Balance query timeout, milliseconds.
    pub balance_timeout_ms: u64,
    /// Retries on idempotent HTTP reads.
    pub max_retries: usize,
    /// Deployment flavor.
    pub environment: Environment,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE_URL.to_string(),
            chain_api_url: DEFAULT_CHAIN_API_URL.to_string(),
            chain_api_key: None,
            jetton_master: None,
            gas_fee_nano: DEFAULT_GAS_FEE_NANO,
            forward_amount_nano: DEFAULT_FORWARD_AMOUNT_NANO,
            gas_only_threshold_nano: Some(DEFAULT_GAS_ONLY_THRESHOLD_NANO),
            request_timeout_ms: DEFAULT_REQUEST_TIMEOUT.as_millis() as u64,
            refresh_timeout_ms: DEFAULT_REFRESH_TIMEOUT.as_millis() as u64,
            balance_timeout_ms: DEFAULT_BALANCE_TIMEOUT.as_millis() as u64,
            max_retries: DEFAULT_MAX_RETRIES,
            environment: Environment::default(),
        }
    }
}

impl ClientConfig {
    /// Loads a JSON config file. Missing fields take their defaults.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }

    /// Per-request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Credential refresh timeout.
    pub fn refresh_timeout(&self) -> Duration {
        Duration::from_millis(self.refresh_timeout_ms)
    }

    /// Balance query timeout.
    pub fn balance_timeout(&self) -> Duration {
        Duration::from_millis(self.balance_timeout_ms)
    }
}

// ---------------------------------------------------------------------------
// Cookie policy
// ---------------------------------------------------------------------------

/// Scope under which credential entries are persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CookiePolicy {
    /// Cookie domain: a bare hostname or a leading-dot wildcard.
    pub domain: String,
    /// Only sent over TLS.
    pub secure: bool,
    /// `SameSite=Strict`.
    pub same_site_strict: bool,
}

impl CookiePolicy {
    /// `localhost` keeps its bare hostname; every other host is scoped to
    /// the wildcard production domain.
    pub fn for_host(hostname: &str, production_domain: &str) -> Self {
        let domain = if hostname == "localhost" {
            hostname.to_string()
        } else {
            production_domain.to_string()
        };
        Self {
            domain,
            secure: true,
            same_site_strict: true,
        }
    }

    /// Policy for an [`Environment`] without a concrete hostname.
    pub fn for_environment(environment: Environment) -> Self {
        match environment {
            Environment::Development => Self::for_host("localhost", PRODUCTION_COOKIE_DOMAIN),
            Environment::Production => Self::for_host("", PRODUCTION_COOKIE_DOMAIN),
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_yields_defaults() {
        let cfg: ClientConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(cfg, ClientConfig::default());
        assert_eq!(cfg.gas_only_threshold_nano, Some(100_000_000));
        assert_eq!(cfg.refresh_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn file_overrides_selected_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{"environment":"development","gas_only_threshold_nano":null,"max_retries":0}"#,
        )
        .unwrap();
        let cfg = ClientConfig::from_json_file(&path).unwrap();
        assert_eq!(cfg.environment, Environment::Development);
        assert_eq!(cfg.gas_only_threshold_nano, None);
        assert_eq!(cfg.max_retries, 0);
        assert_eq!(cfg.gas_fee_nano, DEFAULT_GAS_FEE_NANO);
    }

    #[test]
    fn cookie_policy_follows_host() {
        let local = CookiePolicy::for_host("localhost", PRODUCTION_COOKIE_DOMAIN);
        assert_eq!(local.domain, "localhost");
        assert!(local.secure && local.same_site_strict);

        let prod = CookiePolicy::for_host("app.academy.gradosphera.org", PRODUCTION_COOKIE_DOMAIN);
        assert_eq!(prod.domain, ".academy.gradosphera.org");
    }

    #[test]
    fn missing_file_is_io_error() {
        assert!(matches!(
            ClientConfig::from_json_file("/definitely/not/here.json"),
            Err(ConfigError::Io(_))
        ));
    }
}
