//! Chain execution backends.
//!
//! Both transaction models are driven through [`ChainAdapter`] so the
//! orchestrator only ever sees sign → submit → confirm.

use crate::errors::SwapError;
use crate::models::{ChainFamily, ExecutionPayload};
use async_trait::async_trait;
use ethers::types::{Bytes, TxHash};
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;

pub mod evm;
pub mod solana;

pub use evm::{EvmAdapter, EvmRpc, EvmSigner};
pub use solana::{SolanaAdapter, SolanaRpc, SolanaSigner, VersionedTxConfig};

/// A payload signed by the session's signer, ready to broadcast.
#[derive(Debug, Clone)]
pub enum SignedPayload {
    Evm {
        raw: Bytes,
        hash: TxHash,
    },
    Versioned {
        transaction: VersionedTransaction,
        last_valid_block_height: u64,
    },
}

/// What the network handed back on broadcast; consumed by `confirm`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmissionHandle {
    Evm {
        hash: TxHash,
    },
    Versioned {
        signature: Signature,
        last_valid_block_height: u64,
    },
}

#[async_trait]
pub trait ChainAdapter: Send + Sync {
    fn family(&self) -> ChainFamily;

    /// Sign with the injected signer. May suspend indefinitely on a human.
    async fn sign(&self, payload: &ExecutionPayload) -> Result<SignedPayload, SwapError>;

    async fn submit(&self, signed: SignedPayload) -> Result<SubmissionHandle, SwapError>;

    /// Resolve to the transaction id once included and successful.
    async fn confirm(&self, handle: SubmissionHandle) -> Result<String, SwapError>;
}
