//! [`ChainReader`] over the toncenter v2 HTTP API.
//!
//! - `GET  /api/v2/getAddressInformation?address=..` for native balances
//! - `POST /api/v2/runGetMethod` for `get_wallet_address` and
//!   `get_wallet_data`
//!
//! The API key, when configured, is sent as the `api_key` query parameter.

use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::{ChainError, ChainReader, JettonWalletData};
use crate::cell::{boc, Cell, CellBuilder, TonAddress};
use crate::http::{read_body, HttpClient};

const ADDRESS_INFORMATION_PATH: &str = "/api/v2/getAddressInformation";
const RUN_GET_METHOD_PATH: &str = "/api/v2/runGetMethod";

#[derive(Deserialize)]
struct Envelope<T> {
    #[serde(default)]
    ok: bool,
    result: Option<T>,
    error: Option<String>,
    code: Option<i64>,
}

#[derive(Deserialize)]
struct AddressInformation {
    balance: Value,
}

#[derive(Deserialize)]
struct GetMethodResult {
    exit_code: i64,
    #[serde(default)]
    stack: Vec<(String, Value)>,
}

/// toncenter-compatible chain API client.
#[derive(Debug, Clone)]
pub struct TonCenterClient {
    http: HttpClient,
    api_key: Option<String>,
}

impl TonCenterClient {
    /// Client for the API at `http`'s base URL.
    pub fn new(http: HttpClient, api_key: Option<String>) -> Self {
        Self { http, api_key }
    }

    fn with_key(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.query(&[("api_key", key.as_str())]),
            None => builder,
        }
    }

    async fn fetch<T: DeserializeOwned>(
        &self,
        builder: reqwest::RequestBuilder,
    ) -> Result<T, ChainError> {
        let (status, body) = read_body(self.http.send(self.with_key(builder)).await?).await?;
        match serde_json::from_slice::<Envelope<T>>(&body) {
            Ok(Envelope {
                ok: true,
                result: Some(result),
                ..
            }) => Ok(result),
            Ok(Envelope { error, code, .. }) if error.is_some() || !(200..300).contains(&status) => {
                Err(ChainError::Api {
                    code,
                    message: error.unwrap_or_else(|| format!("status {status}")),
                })
            }
            Ok(_) => Err(ChainError::Decode("response has no result".to_string())),
            Err(_) if !(200..300).contains(&status) => Err(ChainError::Status {
                status,
                body: String::from_utf8_lossy(&body).into_owned(),
            }),
            Err(err) => Err(ChainError::Decode(err.to_string())),
        }
    }

    async fn run_get_method(
        &self,
        address: &TonAddress,
        method: &str,
        stack: Value,
    ) -> Result<Vec<(String, Value)>, ChainError> {
        let request = self
            .http
            .request(Method::POST, RUN_GET_METHOD_PATH)
            .json(&json!({
                "address": address.to_raw(),
                "method": method,
                "stack": stack,
            }));
        let result: GetMethodResult = self.fetch(request).await?;
        debug!(%address, method, exit_code = result.exit_code, "get-method");
        if result.exit_code != 0 && result.exit_code != 1 {
            return Err(ChainError::GetMethod {
                method: method.to_string(),
                exit_code: result.exit_code,
            });
        }
        Ok(result.stack)
    }
}

#[async_trait]
impl ChainReader for TonCenterClient {
    async fn native_balance(&self, account: &TonAddress) -> Result<u128, ChainError> {
        let request = self
            .http
            .request(Method::GET, ADDRESS_INFORMATION_PATH)
            .query(&[("address", account.to_raw())]);
        let info: AddressInformation = self.fetch(request).await?;
        parse_amount(&info.balance)
    }

    async fn jetton_wallet_address(
        &self,
        master: &TonAddress,
        owner: &TonAddress,
    ) -> Result<TonAddress, ChainError> {
        let mut owner_slice = CellBuilder::new();
        owner_slice.store_address(Some(owner))?;
        let owner_boc = boc::to_base64(&owner_slice.build()?);

        let stack = self
            .run_get_method(
                master,
                "get_wallet_address",
                json!([["tvm.Slice", owner_boc]]),
            )
            .await?;
        let cell = stack_cell(stack.first(), "wallet address")?;
        cell.parse()
            .load_address()?
            .ok_or_else(|| ChainError::Decode("wallet address is addr_none".to_string()))
    }

    async fn jetton_wallet_data(
        &self,
        wallet: &TonAddress,
    ) -> Result<JettonWalletData, ChainError> {
        let stack = self
            .run_get_method(wallet, "get_wallet_data", json!([]))
            .await?;
        let balance = stack_num(stack.first())?;
        let owner = stack_address(stack.get(1), "owner")?;
        let master = stack_address(stack.get(2), "master")?;
        let code = Arc::new(stack_cell(stack.get(3), "code")?);
        Ok(JettonWalletData {
            balance,
            owner,
            master,
            code,
        })
    }
}

// ---------------------------------------------------------------------------
// Stack decoding
// ---------------------------------------------------------------------------

/// Balances arrive as decimal strings or JSON numbers.
fn parse_amount(value: &Value) -> Result<u128, ChainError> {
    match value {
        Value::String(text) => text
            .parse::<u128>()
            .map_err(|err| ChainError::Decode(format!("balance {text:?}: {err}"))),
        Value::Number(number) => number
            .as_u64()
            .map(u128::from)
            .ok_or_else(|| ChainError::Decode(format!("balance {number}"))),
        other => Err(ChainError::Decode(format!("balance {other}"))),
    }
}

/// `["num", "0x1f4"]`. Negative values are rejected.
fn stack_num(entry: Option<&(String, Value)>) -> Result<u128, ChainError> {
    let (kind, value) = entry.ok_or_else(|| ChainError::Decode("stack too short".to_string()))?;
    let text = value
        .as_str()
        .filter(|_| kind == "num")
        .ok_or_else(|| ChainError::Decode(format!("expected num, got {kind}")))?;
    let parsed = match text.strip_prefix("0x") {
        Some(hex) => u128::from_str_radix(hex, 16),
        None => text.parse::<u128>(),
    };
    parsed.map_err(|err| ChainError::Decode(format!("num {text:?}: {err}")))
}

/// `["cell", {"bytes": "<base64 boc>"}]`, also accepted as `slice`.
fn stack_cell(entry: Option<&(String, Value)>, what: &str) -> Result<Cell, ChainError> {
    let (kind, value) =
        entry.ok_or_else(|| ChainError::Decode(format!("stack has no {what}")))?;
    if kind != "cell" && kind != "slice" {
        return Err(ChainError::Decode(format!("{what}: expected cell, got {kind}")));
    }
    let encoded = value
        .get("bytes")
        .and_then(Value::as_str)
        .ok_or_else(|| ChainError::Decode(format!("{what}: missing bytes")))?;
    let raw = STANDARD
        .decode(encoded)
        .map_err(|err| ChainError::Decode(format!("{what}: {err}")))?;
    Ok(boc::deserialize(&raw)?)
}

fn stack_address(entry: Option<&(String, Value)>, what: &str) -> Result<TonAddress, ChainError> {
    stack_cell(entry, what)?
        .parse()
        .load_address()?
        .ok_or_else(|| ChainError::Decode(format!("{what} is addr_none")))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
