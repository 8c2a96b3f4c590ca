//! Versioned-transaction (Solana) execution backend.
//!
//! Payloads arrive pre-built and bound to a recent blockhash. Once signed they
//! can only land before `last_valid_block_height`; after that the attempt is
//! expired and the payload is useless.

use super::{ChainAdapter, SignedPayload, SubmissionHandle};
use crate::errors::SwapError;
use crate::models::{ChainFamily, ExecutionPayload};
use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use bincode::serde::{decode_from_slice, encode_to_vec};
use solana_client::client_error::{ClientError, ClientErrorKind};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Blocks a blockhash stays valid for after it was produced.
pub const MAX_PROCESSING_AGE: u64 = 150;

#[derive(Debug, Clone)]
pub struct VersionedTxConfig {
    /// Node-side rebroadcast attempts.
    pub max_retries: usize,
    pub skip_preflight: bool,
    pub poll_interval: Duration,
    /// Consecutive transport errors tolerated while polling.
    pub max_transient_errors: u32,
}

impl Default for VersionedTxConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            skip_preflight: true,
            poll_interval: Duration::from_millis(500),
            max_transient_errors: 5,
        }
    }
}

/// Signing capability of the connected Solana account.
#[async_trait]
pub trait SolanaSigner: Send + Sync {
    fn pubkey(&self) -> Pubkey;

    /// Add this account's signature, leaving other signer slots untouched.
    async fn sign_transaction(
        &self,
        tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, SwapError>;
}

#[async_trait]
impl SolanaSigner for Keypair {
    fn pubkey(&self) -> Pubkey {
        Signer::pubkey(self)
    }

    async fn sign_transaction(
        &self,
        mut tx: VersionedTransaction,
    ) -> Result<VersionedTransaction, SwapError> {
        let required = usize::from(tx.message.header().num_required_signatures);
        let me = Signer::pubkey(self);
        let slot = tx
            .message
            .static_account_keys()
            .iter()
            .take(required)
            .position(|key| *key == me)
            .ok_or_else(|| {
                SwapError::InvalidPayload(format!("{me} is not a required signer of the transaction"))
            })?;
        let signature = self
            .try_sign_message(&tx.message.serialize())
            .map_err(|e| SwapError::Failed(format!("signing failed: {e}")))?;
        if tx.signatures.len() < required {
            tx.signatures.resize(required, Signature::default());
        }
        tx.signatures[slot] = signature;
        Ok(tx)
    }
}

/// The subset of a Solana node the adapter talks to.
#[async_trait]
pub trait SolanaRpc: Send + Sync {
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        config: &VersionedTxConfig,
    ) -> Result<Signature, SwapError>;

    /// `None` while unknown or below the target commitment; `Some(Err)` when it failed on chain.
    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), String>>, SwapError>;

    async fn block_height(&self) -> Result<u64, SwapError>;
}

#[async_trait]
impl SolanaRpc for RpcClient {
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        config: &VersionedTxConfig,
    ) -> Result<Signature, SwapError> {
        let send_config = RpcSendTransactionConfig {
            skip_preflight: config.skip_preflight,
            max_retries: Some(config.max_retries),
            ..RpcSendTransactionConfig::default()
        };
        self.send_transaction_with_config(tx, send_config)
            .await
            .map_err(classify_client_error)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), String>>, SwapError> {
        let response = self
            .get_signature_statuses(&[*signature])
            .await
            .map_err(classify_client_error)?;
        let status = response.value.into_iter().next().flatten();
        Ok(status.and_then(|status| {
            if let Some(err) = status.err.as_ref() {
                return Some(Err(err.to_string()));
            }
            status
                .satisfies_commitment(CommitmentConfig::confirmed())
                .then_some(Ok(()))
        }))
    }

    async fn block_height(&self) -> Result<u64, SwapError> {
        self.get_block_height().await.map_err(classify_client_error)
    }
}

/// Map a solana client error onto the candidate failure taxonomy.
pub fn classify_client_error(err: ClientError) -> SwapError {
    match err.kind() {
        ClientErrorKind::Io(_) | ClientErrorKind::Reqwest(_) => {
            SwapError::TransientNetwork(err.to_string())
        }
        ClientErrorKind::TransactionError(e) => SwapError::OnChainRevert(e.to_string()),
        _ => SwapError::Failed(err.to_string()),
    }
}

/// Decode a base64, bincode-serialized versioned transaction.
pub fn decode_transaction(encoded: &str) -> Result<VersionedTransaction, SwapError> {
    let bytes = BASE64_STANDARD
        .decode(encoded.trim())
        .map_err(|e| SwapError::InvalidPayload(format!("base64 decode failed: {e}")))?;
    let (tx, _) = decode_from_slice::<VersionedTransaction, _>(&bytes, bincode_config())
        .map_err(|e| SwapError::InvalidPayload(format!("transaction decode failed: {e}")))?;
    Ok(tx)
}

pub fn encode_transaction(tx: &VersionedTransaction) -> Result<String, SwapError> {
    let bytes = encode_to_vec(tx, bincode_config())
        .map_err(|e| SwapError::InvalidPayload(format!("transaction encode failed: {e}")))?;
    Ok(BASE64_STANDARD.encode(bytes))
}

fn bincode_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_fixed_int_encoding()
        .with_little_endian()
}

/// Executes base64 versioned transactions for one account.
pub struct SolanaAdapter<R, S> {
    rpc: R,
    signer: S,
    config: VersionedTxConfig,
}

impl<R: SolanaRpc, S: SolanaSigner> SolanaAdapter<R, S> {
    pub fn new(rpc: R, signer: S, config: VersionedTxConfig) -> Self {
        Self {
            rpc,
            signer,
            config,
        }
    }

    pub fn account(&self) -> Pubkey {
        self.signer.pubkey()
    }

    /// Validity bound supplied with the quote, or the widest window the current
    /// height allows.
    async fn validity_bound(&self, quoted: Option<u64>) -> Result<u64, SwapError> {
        match quoted {
            Some(height) => Ok(height),
            None => Ok(self.rpc.block_height().await? + MAX_PROCESSING_AGE),
        }
    }
}

#[async_trait]
impl<R: SolanaRpc, S: SolanaSigner> ChainAdapter for SolanaAdapter<R, S> {
    fn family(&self) -> ChainFamily {
        ChainFamily::Solana
    }

    async fn sign(&self, payload: &ExecutionPayload) -> Result<SignedPayload, SwapError> {
        let ExecutionPayload::Versioned {
            transaction,
            last_valid_block_height,
        } = payload
        else {
            return Err(SwapError::InvalidPayload(
                "expected a versioned transaction payload".into(),
            ));
        };
        let unsigned = decode_transaction(transaction)?;
        let last_valid_block_height = self.validity_bound(*last_valid_block_height).await?;
        let transaction = self.signer.sign_transaction(unsigned).await?;
        debug!(
            blockhash = %transaction.message.recent_blockhash(),
            last_valid_block_height,
            "[SOL] transaction signed"
        );
        Ok(SignedPayload::Versioned {
            transaction,
            last_valid_block_height,
        })
    }

    async fn submit(&self, signed: SignedPayload) -> Result<SubmissionHandle, SwapError> {
        let SignedPayload::Versioned {
            transaction,
            last_valid_block_height,
        } = signed
        else {
            return Err(SwapError::InvalidPayload(
                "expected a signed versioned transaction".into(),
            ));
        };
        let signature = self.rpc.send_transaction(&transaction, &self.config).await?;
        info!(
            signature = %signature,
            skip_preflight = self.config.skip_preflight,
            max_retries = self.config.max_retries,
            "[SOL] transaction submitted"
        );
        Ok(SubmissionHandle::Versioned {
            signature,
            last_valid_block_height,
        })
    }

    async fn confirm(&self, handle: SubmissionHandle) -> Result<String, SwapError> {
        let SubmissionHandle::Versioned {
            signature,
            last_valid_block_height,
        } = handle
        else {
            return Err(SwapError::InvalidPayload(
                "expected a versioned submission handle".into(),
            ));
        };

        let mut transient_errors = 0u32;
        loop {
            match self.poll(&signature, last_valid_block_height).await {
                Ok(Some(settled)) => return settled,
                Ok(None) => transient_errors = 0,
                Err(SwapError::TransientNetwork(reason)) => {
                    transient_errors += 1;
                    if transient_errors > self.config.max_transient_errors {
                        return Err(SwapError::TransientNetwork(reason));
                    }
                    debug!(attempt = transient_errors, reason = %reason, "[SOL] transient poll error");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.config.poll_interval).await;
        }
    }
}

impl<R: SolanaRpc, S: SolanaSigner> SolanaAdapter<R, S> {
    /// One poll round; `None` while pending and still within its validity window.
    async fn poll(
        &self,
        signature: &Signature,
        last_valid_block_height: u64,
    ) -> Result<Option<Result<String, SwapError>>, SwapError> {
        if let Some(status) = self.rpc.signature_status(signature).await? {
            return Ok(Some(settle(signature, status)));
        }
        let block_height = self.rpc.block_height().await?;
        if block_height <= last_valid_block_height {
            return Ok(None);
        }
        // The transaction may have reached commitment between the two reads.
        if let Some(status) = self.rpc.signature_status(signature).await? {
            return Ok(Some(settle(signature, status)));
        }
        warn!(
            signature = %signature,
            block_height,
            last_valid_block_height,
            "[SOL] blockhash expired before confirmation"
        );
        Ok(Some(Err(SwapError::Expired {
            last_valid_block_height,
            block_height,
        })))
    }
}

fn settle(signature: &Signature, status: Result<(), String>) -> Result<String, SwapError> {
    match status {
        Ok(()) => {
            info!(signature = %signature, "[SOL] transaction confirmed");
            Ok(signature.to_string())
        }
        Err(reason) => Err(SwapError::OnChainRevert(reason)),
    }
}
