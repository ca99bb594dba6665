//! # CLI Interface
//!
//! Command-line arguments of `academy-pay`, defined with `clap` derive.
//! Global flags override fields of the loaded [`ClientConfig`]; every
//! subcommand works on that merged config.
//!
//! [`ClientConfig`]: academy_payments::ClientConfig

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Operator tool for the academy jetton payment flow.
///
/// Checks balances against the chain API, builds and decodes jetton
/// transfer payloads, and converts between address forms. It never signs
/// anything.
#[derive(Parser, Debug)]
#[command(
    name = "academy-pay",
    about = "Academy jetton payment tool",
    version,
    propagate_version = true
)]
pub struct AcademyPayCli {
    /// JSON config file. Missing fields take their defaults.
    #[arg(long, short = 'c', env = "ACADEMY_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// Log output format. Logs go to stderr.
    #[arg(long, value_enum, default_value_t = LogFormatArg::Pretty, global = true)]
    pub log_format: LogFormatArg,

    /// Chain API base URL (toncenter-compatible).
    #[arg(long, env = "ACADEMY_CHAIN_API_URL", global = true)]
    pub chain_api_url: Option<String>,

    /// Chain API key.
    #[arg(long, env = "ACADEMY_CHAIN_API_KEY", global = true, hide_env_values = true)]
    pub chain_api_key: Option<String>,

    /// Jetton master contract of the course token.
    #[arg(long, env = "ACADEMY_JETTON_MASTER", global = true)]
    pub jetton_master: Option<String>,

    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// `--log-format` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum LogFormatArg {
    /// Human-readable.
    Pretty,
    /// JSON lines.
    Json,
}

/// Top-level subcommands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Resolve an owner's jetton wallet and check its balances.
    Balance(BalanceArgs),
    /// Build a jetton transfer payload and the wallet message carrying it.
    BuildTransfer(BuildTransferArgs),
    /// Decode a base64 jetton transfer payload.
    Decode(DecodeArgs),
    /// Print every textual form of an address.
    Address(AddressArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for `balance`.
#[derive(Parser, Debug)]
pub struct BalanceArgs {
    /// Owner account, raw or user-friendly.
    #[arg(long)]
    pub owner: String,

    /// Token amount to check against, in whole tokens.
    #[arg(long, default_value = "0")]
    pub required: String,

    /// Also print the collected Prometheus metrics.
    #[arg(long)]
    pub metrics: bool,
}

/// Arguments for `build-transfer`.
#[derive(Parser, Debug)]
pub struct BuildTransferArgs {
    /// Account receiving the tokens.
    #[arg(long)]
    pub destination: String,

    /// Paying account. Receives the excess gas.
    #[arg(long)]
    pub sender: String,

    /// Token amount, in whole tokens.
    #[arg(long)]
    pub amount: String,

    /// Payment reference, written as the transfer comment.
    #[arg(long)]
    pub reference: String,

    /// Query id of the transfer.
    #[arg(long, default_value_t = 0)]
    pub query_id: u64,

    /// Nanotons forwarded with the transfer notification. Defaults to the
    /// config value.
    #[arg(long)]
    pub forward_amount: Option<u128>,

    /// The sender's jetton wallet. Resolved through the chain API when
    /// omitted.
    #[arg(long)]
    pub jetton_wallet: Option<String>,
}

/// Arguments for `decode`.
#[derive(Parser, Debug)]
pub struct DecodeArgs {
    /// Base64 bag of cells holding a transfer body.
    pub payload: String,
}

/// Arguments for `address`.
#[derive(Parser, Debug)]
pub struct AddressArgs {
    /// Address in raw or user-friendly form.
    pub address: String,
}
