//! Configuration loader and application settings.

use crate::chain::VersionedTxConfig;
use crate::errors::{AppError, Result};
use crate::quote::client::DEFAULT_QUOTE_API_URL;
use solana_sdk::signature::Keypair;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

/// Knobs handed to the chain adapters.
#[derive(Debug, Clone)]
pub struct ExecutionConfig {
    pub solana_max_retries: usize,
    pub confirm_poll: Duration,
    pub max_transient_errors: u32,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        let versioned = VersionedTxConfig::default();
        Self {
            solana_max_retries: versioned.max_retries,
            confirm_poll: versioned.poll_interval,
            max_transient_errors: versioned.max_transient_errors,
        }
    }
}

impl ExecutionConfig {
    pub fn versioned_tx(&self) -> VersionedTxConfig {
        VersionedTxConfig {
            max_retries: self.solana_max_retries,
            poll_interval: self.confirm_poll,
            max_transient_errors: self.max_transient_errors,
            ..VersionedTxConfig::default()
        }
    }
}

/// Consolidated application configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub quote_api_url: String,
    /// Node endpoint of the target chain (EVM JSON-RPC or Solana RPC).
    pub rpc_url: String,
    pub chain_id: u64,
    pub token_in: String,
    pub token_out: String,
    /// Human decimal amount of `token_in`.
    pub amount_in: String,
    /// Defaults to the signer's account.
    pub sender: Option<String>,
    /// Defaults to the sender.
    pub receiver: Option<String>,
    pub slippage_bps: u32,
    pub private_key: Option<String>,
    /// Path to a JSON byte-array keypair file, or a base58 secret key.
    pub solana_keypair: Option<String>,
    pub token_in_decimals: Option<u8>,
    pub execution: ExecutionConfig,
}

impl AppConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let required = |name: &str| {
            var(name).ok_or_else(|| AppError::Config(format!("{name} must be set")))
        };

        let defaults = ExecutionConfig::default();
        let execution = ExecutionConfig {
            solana_max_retries: parse_or(
                var("SOLANA_MAX_RETRIES"),
                "SOLANA_MAX_RETRIES",
                defaults.solana_max_retries,
            )?,
            confirm_poll: Duration::from_millis(parse_or(
                var("CONFIRM_POLL_MS"),
                "CONFIRM_POLL_MS",
                defaults.confirm_poll.as_millis() as u64,
            )?),
            max_transient_errors: parse_or(
                var("MAX_TRANSIENT_ERRORS"),
                "MAX_TRANSIENT_ERRORS",
                defaults.max_transient_errors,
            )?,
        };

        Ok(Self {
            quote_api_url: var("QUOTE_API_URL").unwrap_or_else(|| DEFAULT_QUOTE_API_URL.into()),
            rpc_url: required("RPC_URL")?,
            chain_id: parse_required(required("CHAIN_ID")?, "CHAIN_ID")?,
            token_in: required("TOKEN_IN")?,
            token_out: required("TOKEN_OUT")?,
            amount_in: required("AMOUNT_IN")?,
            sender: var("SENDER"),
            receiver: var("RECEIVER"),
            slippage_bps: parse_or(var("SLIPPAGE_BPS"), "SLIPPAGE_BPS", 50)?,
            private_key: var("PRIVATE_KEY"),
            solana_keypair: var("SOLANA_KEYPAIR"),
            token_in_decimals: var("TOKEN_IN_DECIMALS")
                .map(|raw| parse_required(raw, "TOKEN_IN_DECIMALS"))
                .transpose()?,
            execution,
        })
    }
}

/// Solana keypair from a JSON byte array, a path to one, or base58 text.
pub fn load_solana_keypair(raw: &str) -> Result<Keypair> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(AppError::Config("SOLANA_KEYPAIR is empty".into()));
    }
    let bytes: Vec<u8> = if trimmed.starts_with('[') {
        serde_json::from_str(trimmed)?
    } else if Path::new(trimmed).is_file() {
        serde_json::from_str(&std::fs::read_to_string(trimmed)?)?
    } else {
        bs58::decode(trimmed)
            .into_vec()
            .map_err(|e| AppError::Config(format!("SOLANA_KEYPAIR is not base58: {e}")))?
    };
    Keypair::try_from(bytes.as_slice())
        .map_err(|e| AppError::Config(format!("SOLANA_KEYPAIR is not a keypair: {e}")))
}

fn parse_required<T: FromStr>(raw: String, name: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e| AppError::Config(format!("{name} is invalid ({raw:?}): {e}")))
}

fn parse_or<T: FromStr>(raw: Option<String>, name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(raw) => parse_required(raw, name),
        None => Ok(default),
    }
}
