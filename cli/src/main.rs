// Copyright (c) 2026 Gradosphera Academy. MIT License.
// See LICENSE for details.

//! # academy-pay
//!
//! Entry point for the `academy-pay` binary. Loads the client config,
//! applies flag overrides, initializes logging, and runs one subcommand:
//!
//! - `balance`        - balance check of an owner against the course token
//! - `build-transfer` - jetton transfer payload plus its wallet message
//! - `decode`         - fields of a transfer payload
//! - `address`        - raw and user-friendly address forms
//! - `version`        - build version information

mod cli;
mod logging;

use std::sync::Arc;

use anyhow::{bail, Context, Result};
use clap::Parser;
use serde_json::{json, Value};

use academy_payments::cell::{FriendlyFlags, TonAddress};
use academy_payments::chain::{BalanceVerifier, SufficiencyPolicy, TonCenterClient};
use academy_payments::config::ClientConfig;
use academy_payments::http::HttpClient;
use academy_payments::jetton::{ForwardPayload, JettonTransferBuilder, TransferMessage};
use academy_payments::metrics::PaymentMetrics;
use academy_payments::purchase::{parse_token_amount, TransferSettings};

use cli::{AcademyPayCli, Commands};
use logging::LogFormat;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = AcademyPayCli::parse();
    logging::init_logging(logging::DEFAULT_DIRECTIVES, LogFormat::from(cli.log_format));

    let config = load_config(&cli)?;
    match cli.command {
        Commands::Balance(args) => check_balance(&config, args).await,
        Commands::BuildTransfer(args) => build_transfer(&config, args).await,
        Commands::Decode(args) => decode_transfer(args),
        Commands::Address(args) => print_address(args),
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

/// The config file (or defaults) with global flags applied on top.
fn load_config(cli: &AcademyPayCli) -> Result<ClientConfig> {
    let mut config = match &cli.config {
        Some(path) => ClientConfig::from_json_file(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => ClientConfig::default(),
    };
    if let Some(url) = &cli.chain_api_url {
        config.chain_api_url = url.clone();
    }
    if let Some(key) = &cli.chain_api_key {
        config.chain_api_key = Some(key.clone());
    }
    if let Some(master) = &cli.jetton_master {
        config.jetton_master = Some(parse_address(master, "--jetton-master")?);
    }
    tracing::debug!(chain_api_url = %config.chain_api_url, "config loaded");
    Ok(config)
}

fn parse_address(text: &str, what: &str) -> Result<TonAddress> {
    TonAddress::parse(text).with_context(|| format!("invalid {what} address: {text}"))
}

fn chain_client(config: &ClientConfig) -> TonCenterClient {
    let http = HttpClient::new(
        config.chain_api_url.clone(),
        config.request_timeout(),
        config.max_retries,
    );
    TonCenterClient::new(http, config.chain_api_key.clone())
}

fn verifier(config: &ClientConfig) -> Result<BalanceVerifier> {
    let Some(master) = config.jetton_master else {
        bail!("no jetton master configured; pass --jetton-master or set it in the config file");
    };
    Ok(BalanceVerifier::new(
        Arc::new(chain_client(config)),
        master,
        SufficiencyPolicy::from_config(config),
        config.balance_timeout(),
    ))
}

fn print_json(value: &impl serde::Serialize) -> Result<()> {
    let text = serde_json::to_string_pretty(value).context("failed to encode output")?;
    println!("{text}");
    Ok(())
}

/// Resolves the owner's jetton wallet and prints the balance check.
async fn check_balance(config: &ClientConfig, args: cli::BalanceArgs) -> Result<()> {
    let owner = parse_address(&args.owner, "--owner")?;
    let required = parse_token_amount(&args.required)
        .with_context(|| format!("invalid --required amount: {}", args.required))?;

    let metrics = Arc::new(PaymentMetrics::new().context("failed to register metrics")?);
    let verifier = verifier(config)?.with_metrics(Arc::clone(&metrics));

    let check = verifier
        .check_sufficiency(&owner, required)
        .await
        .with_context(|| format!("balance check failed for {owner}"))?;
    print_json(&check)?;

    if args.metrics {
        let text = metrics.encode().context("failed to encode metrics")?;
        eprintln!("{text}");
    }
    Ok(())
}

/// Builds the transfer payload and prints it with its wallet message.
async fn build_transfer(config: &ClientConfig, args: cli::BuildTransferArgs) -> Result<()> {
    let destination = parse_address(&args.destination, "--destination")?;
    let sender = parse_address(&args.sender, "--sender")?;
    let amount = parse_token_amount(&args.amount)
        .with_context(|| format!("invalid --amount: {}", args.amount))?;

    let jetton_wallet = match &args.jetton_wallet {
        Some(text) => parse_address(text, "--jetton-wallet")?,
        None => verifier(config)?
            .resolve_token_wallet(&sender)
            .await
            .with_context(|| format!("failed to resolve the jetton wallet of {sender}"))?,
    };

    let settings = TransferSettings::from_config(config);
    let message = JettonTransferBuilder::new(amount, destination)
        .query_id(args.query_id)
        .response_destination(sender)
        .forward_amount(args.forward_amount.unwrap_or(settings.forward_amount_nano))
        .comment(args.reference.as_str())
        .build()
        .context("failed to build the transfer message")?;
    let request = settings.transaction_request(&jetton_wallet, &message);

    tracing::info!(
        %destination,
        %sender,
        %amount,
        reference = %args.reference,
        bits = message.body().bit_len(),
        "transfer built"
    );
    print_json(&json!({
        "payload": message.to_base64(),
        "request": request,
    }))
}

fn address_json(address: &TonAddress) -> Value {
    json!({
        "raw": address.to_raw(),
        "friendly": address.to_friendly(FriendlyFlags::default(), true),
    })
}

fn payload_json(payload: &ForwardPayload) -> Value {
    match payload {
        ForwardPayload::None => json!({"kind": "none"}),
        ForwardPayload::Comment(text) => json!({"kind": "comment", "text": text}),
        ForwardPayload::Structured(cell) => json!({
            "kind": "structured",
            "bits": cell.bit_len(),
            "refs": cell.references().len(),
            "hash": cell.hash_hex(),
        }),
        ForwardPayload::Raw(bytes) => json!({"kind": "raw", "hex": hex::encode(bytes)}),
    }
}

/// Prints the fields of a base64 transfer payload.
fn decode_transfer(args: cli::DecodeArgs) -> Result<()> {
    let message =
        TransferMessage::from_base64(args.payload.trim()).context("not a jetton transfer payload")?;
    let transfer = message.transfer();
    print_json(&json!({
        "opcode": format!("{:#010x}", transfer.opcode),
        "query_id": transfer.query_id,
        "amount": transfer.amount.to_string(),
        "destination": address_json(&transfer.destination),
        "response_destination": transfer.response_destination.as_ref().map(address_json),
        "forward_amount": transfer.forward_amount.to_string(),
        "forward_payload": payload_json(&transfer.forward_payload),
        "body_hash": message.body().hash_hex(),
    }))
}

/// Prints every textual form of an address.
fn print_address(args: cli::AddressArgs) -> Result<()> {
    let (address, flags) = TonAddress::parse_with_flags(&args.address)
        .with_context(|| format!("invalid address: {}", args.address))?;
    let form = |bounceable: bool, testnet: bool, url_safe: bool| {
        address.to_friendly(
            FriendlyFlags {
                bounceable,
                testnet,
            },
            url_safe,
        )
    };
    print_json(&json!({
        "raw": address.to_raw(),
        "workchain": address.workchain,
        "input_flags": {"bounceable": flags.bounceable, "testnet": flags.testnet},
        "bounceable": form(true, false, true),
        "non_bounceable": form(false, false, true),
        "bounceable_std": form(true, false, false),
        "testnet_bounceable": form(true, true, true),
        "testnet_non_bounceable": form(false, true, true),
    }))
}

/// Prints version information to stdout.
fn print_version() {
    println!("academy-pay {}", env!("CARGO_PKG_VERSION"));
    println!("payments    {}", academy_payments::VERSION);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("client.json");
        std::fs::write(
            &path,
            r#"{"chain_api_url": "https://file.example", "gas_fee_nano": 50000000}"#,
        )
        .unwrap();
        let master = format!("0:{}", "11".repeat(32));

        let cli = AcademyPayCli::try_parse_from([
            "academy-pay",
            "--config",
            path.to_str().unwrap(),
            "--chain-api-url",
            "http://localhost:8081",
            "--jetton-master",
            master.as_str(),
            "version",
        ])
        .unwrap();
        let config = load_config(&cli).unwrap();

        assert_eq!(config.chain_api_url, "http://localhost:8081");
        assert_eq!(config.gas_fee_nano, 50_000_000);
        assert_eq!(config.jetton_master, Some(TonAddress::new(0, [0x11; 32])));
    }

    #[test]
    fn missing_master_is_reported() {
        let err = verifier(&ClientConfig::default()).unwrap_err();
        assert!(err.to_string().contains("jetton master"));
    }

    #[test]
    fn decoded_comment_payload_is_labelled() {
        let value = payload_json(&ForwardPayload::Comment("INV-42".into()));
        assert_eq!(value, json!({"kind": "comment", "text": "INV-42"}));
    }
}
