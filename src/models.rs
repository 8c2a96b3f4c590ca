//! Shared data structures used throughout the application.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Sentinel many EVM aggregators use for the chain's native asset.
pub const EVM_NATIVE_SENTINEL: &str = "0xEeeeeEeeeEeEeeEeEeEeeEEEeeeeEeeeeeeeEEeE";
pub const EVM_ZERO_ADDRESS: &str = "0x0000000000000000000000000000000000000000";
/// Native SOL is addressed by the system program id.
pub const SOLANA_NATIVE_MINT: &str = "11111111111111111111111111111111";

/// Solana cluster ids as used by token lists (mainnet-beta, testnet, devnet).
pub const SOLANA_CHAIN_IDS: [u64; 3] = [101, 102, 103];

/// Transaction model of the chain a request targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChainFamily {
    /// Account/nonce based (EVM).
    Evm,
    /// Versioned transactions bound to a recent blockhash (Solana).
    Solana,
}

impl ChainFamily {
    pub fn from_chain_id(chain_id: u64) -> Self {
        if SOLANA_CHAIN_IDS.contains(&chain_id) {
            ChainFamily::Solana
        } else {
            ChainFamily::Evm
        }
    }
}

/// Parameters of one swap, immutable once handed to the quoting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapRequest {
    /// Human-readable decimal amount, e.g. "1.5".
    pub amount_in: String,
    pub token_in: String,
    pub token_out: String,
    pub sender: String,
    pub receiver: String,
    pub chain_id: u64,
    pub slippage_bps: u32,
}

impl SwapRequest {
    pub fn chain_family(&self) -> ChainFamily {
        ChainFamily::from_chain_id(self.chain_id)
    }
}

/// Opaque transaction descriptor produced by the quoting service.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum ExecutionPayload {
    /// Call parameters for an account-model chain. `value` is in wei, decimal or 0x-hex.
    EvmCall {
        to: String,
        data: String,
        value: String,
    },
    /// Base64 serialized transaction for a versioned-transaction chain.
    #[serde(rename_all = "camelCase")]
    Versioned {
        transaction: String,
        last_valid_block_height: Option<u64>,
    },
}

impl ExecutionPayload {
    pub fn family(&self) -> ChainFamily {
        match self {
            ExecutionPayload::EvmCall { .. } => ChainFamily::Evm,
            ExecutionPayload::Versioned { .. } => ChainFamily::Solana,
        }
    }
}

/// One candidate route. Ranking order of the set is the trial order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QuoteCandidate {
    pub provider: String,
    pub amount_out: String,
    pub price_impact_bps: f64,
    /// Spender to approve; absent for native assets and pre-signed payloads.
    pub approval_address: Option<String>,
    pub execution_payload: ExecutionPayload,
}

/// Per-asset facts needed to decide on and size an approval.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetMetadata {
    pub address: String,
    pub decimals: Option<u8>,
    pub native: bool,
}

impl AssetMetadata {
    pub fn token(address: impl Into<String>, decimals: Option<u8>) -> Self {
        Self {
            address: address.into(),
            decimals,
            native: false,
        }
    }

    pub fn native(address: impl Into<String>, decimals: u8) -> Self {
        Self {
            address: address.into(),
            decimals: Some(decimals),
            native: true,
        }
    }
}

/// Asset metadata keyed by chain and normalized address.
#[derive(Debug, Clone, Default)]
pub struct AssetRegistry {
    entries: HashMap<(u64, String), AssetMetadata>,
}

impl AssetRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry pre-populated with the native sentinels of `chain_id`.
    pub fn with_natives(chain_id: u64) -> Self {
        let mut registry = Self::new();
        match ChainFamily::from_chain_id(chain_id) {
            ChainFamily::Evm => {
                registry.insert(chain_id, AssetMetadata::native(EVM_NATIVE_SENTINEL, 18));
                registry.insert(chain_id, AssetMetadata::native(EVM_ZERO_ADDRESS, 18));
            }
            ChainFamily::Solana => {
                registry.insert(chain_id, AssetMetadata::native(SOLANA_NATIVE_MINT, 9));
            }
        }
        registry
    }

    pub fn insert(&mut self, chain_id: u64, meta: AssetMetadata) {
        let key = (chain_id, normalize_asset(chain_id, &meta.address));
        self.entries.insert(key, meta);
    }

    pub fn get(&self, chain_id: u64, asset: &str) -> Option<&AssetMetadata> {
        self.entries.get(&(chain_id, normalize_asset(chain_id, asset)))
    }

    /// Known metadata, or a non-native token of unknown precision.
    pub fn resolve(&self, chain_id: u64, asset: &str) -> AssetMetadata {
        self.get(chain_id, asset)
            .cloned()
            .unwrap_or_else(|| AssetMetadata::token(asset, None))
    }
}

/// EVM addresses compare case-insensitively; Solana base58 is case-sensitive.
pub fn normalize_asset(chain_id: u64, asset: &str) -> String {
    match ChainFamily::from_chain_id(chain_id) {
        ChainFamily::Evm => asset.trim().to_ascii_lowercase(),
        ChainFamily::Solana => asset.trim().to_string(),
    }
}
