//! Spend-approval tracking for ERC-20 style assets.
//!
//! An approval is a standing on-chain allowance keyed by (asset, spender), so
//! one confirmed approval serves every later candidate with the same spender.

use crate::errors::SwapError;
use crate::models::AssetMetadata;
use crate::utils::to_base_units;
use async_trait::async_trait;
use ethers::types::U256;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

pub mod erc20;

pub use erc20::Erc20Approvals;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "camelCase")]
pub enum ApprovalState {
    NotRequired,
    Required,
    Pending,
    Confirmed,
    Rejected,
    /// Could not be sized or attempted; nothing reached the network.
    Insufficient(String),
    Failed(String),
}

impl ApprovalState {
    /// Whether execution may proceed past the approval step.
    pub fn permits_execution(&self) -> bool {
        matches!(self, ApprovalState::NotRequired | ApprovalState::Confirmed)
    }

    /// Candidate-level error for a state that blocks execution.
    pub fn blocking_error(&self) -> Option<SwapError> {
        match self {
            ApprovalState::Rejected => Some(SwapError::UserRejected),
            ApprovalState::Insufficient(reason) => {
                Some(SwapError::ApprovalInsufficient(reason.clone()))
            }
            ApprovalState::Failed(reason) => Some(SwapError::ApprovalFailed(reason.clone())),
            ApprovalState::Required | ApprovalState::Pending => Some(SwapError::ApprovalFailed(
                "approval did not complete".into(),
            )),
            ApprovalState::NotRequired | ApprovalState::Confirmed => None,
        }
    }
}

/// On-chain allowance operations for the session account.
#[async_trait]
pub trait AllowanceBackend: Send + Sync {
    async fn allowance(&self, asset: &str, spender: &str) -> Result<U256, SwapError>;

    /// Approve exactly `amount` and wait for the receipt; returns the tx id.
    async fn approve(&self, asset: &str, spender: &str, amount: U256) -> Result<String, SwapError>;
}

#[derive(Debug, Clone)]
struct ApprovalRecord {
    state: ApprovalState,
    allowance: U256,
}

/// Session-scoped approval bookkeeping over an [`AllowanceBackend`].
pub struct ApprovalTracker {
    backend: Option<Arc<dyn AllowanceBackend>>,
    records: HashMap<(String, String), ApprovalRecord>,
}

impl ApprovalTracker {
    pub fn new(backend: Arc<dyn AllowanceBackend>) -> Self {
        Self {
            backend: Some(backend),
            records: HashMap::new(),
        }
    }

    /// Tracker for chains without an approval step.
    pub fn disabled() -> Self {
        Self {
            backend: None,
            records: HashMap::new(),
        }
    }

    /// Last recorded state for the pair, if any.
    pub fn state(&self, asset: &str, spender: &str) -> Option<ApprovalState> {
        self.records.get(&key(asset, spender)).map(|r| r.state.clone())
    }

    /// Native assets and candidates without a spender have no approval step.
    pub fn requires_approval(asset: &AssetMetadata, spender: Option<&str>) -> bool {
        !asset.native && spender.is_some_and(|s| !s.trim().is_empty())
    }

    /// Make sure `spender` may move `amount` (human decimal) of `asset`.
    pub async fn ensure_approved(
        &mut self,
        asset: &AssetMetadata,
        spender: Option<&str>,
        amount: &str,
    ) -> ApprovalState {
        let Some(spender) = spender.filter(|_| Self::requires_approval(asset, spender)) else {
            return ApprovalState::NotRequired;
        };

        let required = match asset
            .decimals
            .ok_or_else(|| format!("decimals unknown for asset {}", asset.address))
            .and_then(|decimals| to_base_units(amount, decimals))
        {
            Ok(required) => required,
            Err(reason) => {
                warn!(asset = %asset.address, reason = %reason, "[APPROVAL] cannot size approval");
                return ApprovalState::Insufficient(reason);
            }
        };

        let key = key(&asset.address, spender);
        if let Some(record) = self.records.get(&key) {
            if record.state == ApprovalState::Confirmed && record.allowance >= required {
                info!(asset = %asset.address, spender, "[APPROVAL] reusing session approval");
                return ApprovalState::Confirmed;
            }
        }

        let Some(backend) = self.backend.clone() else {
            return ApprovalState::Insufficient("no approval backend for this chain".into());
        };

        match backend.allowance(&asset.address, spender).await {
            Ok(current) if current >= required => {
                info!(asset = %asset.address, spender, allowance = %current, "[APPROVAL] existing allowance suffices");
                return self.record(key, ApprovalState::Confirmed, current);
            }
            Ok(_) => {}
            Err(e) => {
                warn!(asset = %asset.address, spender, error = %e, "[APPROVAL] allowance read failed, approving anyway");
            }
        }

        self.record(key.clone(), ApprovalState::Pending, U256::zero());
        info!(asset = %asset.address, spender, amount = %required, "[APPROVAL] submitting approval");
        match backend.approve(&asset.address, spender, required).await {
            Ok(tx_id) => {
                info!(asset = %asset.address, spender, tx_id = %tx_id, "[APPROVAL] approval confirmed");
                self.record(key, ApprovalState::Confirmed, required)
            }
            Err(SwapError::UserRejected) => {
                warn!(asset = %asset.address, spender, "[APPROVAL] approval rejected by user");
                self.record(key, ApprovalState::Rejected, U256::zero())
            }
            Err(e) => {
                warn!(asset = %asset.address, spender, error = %e, "[APPROVAL] approval failed");
                self.record(key, ApprovalState::Failed(e.to_string()), U256::zero())
            }
        }
    }

    /// Deduct `amount` spent by a confirmed swap from the session's view of
    /// the allowance, so the next swap checks the chain again.
    pub fn consume(&mut self, asset: &AssetMetadata, spender: &str, amount: &str) {
        let Some(record) = self.records.get_mut(&key(&asset.address, spender)) else {
            return;
        };
        let spent = asset
            .decimals
            .and_then(|decimals| to_base_units(amount, decimals).ok())
            .unwrap_or(record.allowance);
        record.allowance = record.allowance.saturating_sub(spent);
        debug!(asset = %asset.address, spender, remaining = %record.allowance, "[APPROVAL] allowance consumed");
    }

    fn record(&mut self, key: (String, String), state: ApprovalState, allowance: U256) -> ApprovalState {
        self.records.insert(
            key,
            ApprovalRecord {
                state: state.clone(),
                allowance,
            },
        );
        state
    }
}

fn key(asset: &str, spender: &str) -> (String, String) {
    (asset.to_ascii_lowercase(), spender.to_ascii_lowercase())
}
