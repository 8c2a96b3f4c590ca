//! Miscellaneous helper utilities.

use bigdecimal::BigDecimal;
use ethers::types::U256;
use num_traits::Zero;
use std::str::FromStr;
use tracing_subscriber::{EnvFilter, fmt};

/// Initialize `tracing` subscriber with env-based filter.
///
/// If `RUST_LOG` is not set, defaults to `info` level.
pub fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}

/// Convert a human decimal amount ("1.25") into integer base units for an
/// asset with `decimals` places. Rejects negatives, zero, and amounts with more
/// precision than the asset supports.
pub fn to_base_units(amount: &str, decimals: u8) -> Result<U256, String> {
    let value = BigDecimal::from_str(amount.trim())
        .map_err(|e| format!("invalid decimal amount {amount:?}: {e}"))?;
    if value <= BigDecimal::zero() {
        return Err(format!("amount must be positive, got {amount}"));
    }
    let scaled = value * pow10(decimals);
    let whole = scaled.with_scale(0);
    if whole != scaled {
        return Err(format!(
            "amount {amount} has more than {decimals} decimal places"
        ));
    }
    let (digits, _) = whole.as_bigint_and_exponent();
    U256::from_dec_str(&digits.to_string()).map_err(|e| format!("amount out of range: {e}"))
}

/// Parse a JSON-ish decimal string into an `f64` for wire formats that expect numbers.
pub fn decimal_to_f64(amount: &str) -> Option<f64> {
    let value = amount.trim().parse::<f64>().ok()?;
    value.is_finite().then_some(value)
}

fn pow10(decimals: u8) -> BigDecimal {
    let mut acc = BigDecimal::from(1u32);
    for _ in 0..decimals {
        acc = acc * BigDecimal::from(10u32);
    }
    acc
}

/// Parse a wei value given either as decimal or 0x-prefixed hex.
pub fn parse_wei(value: &str) -> Result<U256, String> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(U256::zero());
    }
    let parsed = match value.strip_prefix("0x").or_else(|| value.strip_prefix("0X")) {
        Some(hex) if hex.is_empty() => Ok(U256::zero()),
        Some(hex) => U256::from_str_radix(hex, 16).map_err(|e| e.to_string()),
        None => U256::from_dec_str(value).map_err(|e| e.to_string()),
    };
    parsed.map_err(|e| format!("invalid wei value {value:?}: {e}"))
}
