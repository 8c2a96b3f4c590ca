//! Account-model (EVM) execution backend.

use super::{ChainAdapter, SignedPayload, SubmissionHandle};
use crate::errors::SwapError;
use crate::models::{ChainFamily, ExecutionPayload};
use crate::utils::parse_wei;
use async_trait::async_trait;
use ethers::providers::{Http, Middleware, PendingTransaction, Provider, ProviderError, RpcError};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, BlockNumber, Bytes, TransactionReceipt, TransactionRequest, TxHash, U256, U64,
};
use ethers::utils::keccak256;
use tracing::{debug, info, warn};

/// JSON-RPC error code wallets use for "user rejected the request" (EIP-1193).
const USER_REJECTED_CODE: i64 = 4001;

/// Signing capability of the connected EVM account.
#[async_trait]
pub trait EvmSigner: Send + Sync {
    fn address(&self) -> Address;

    /// RLP-encoded signed transaction.
    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Bytes, SwapError>;
}

#[async_trait]
impl EvmSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign_transaction(&self, tx: &TypedTransaction) -> Result<Bytes, SwapError> {
        let signature = Signer::sign_transaction(self, tx)
            .await
            .map_err(|e| SwapError::Failed(format!("signing failed: {e}")))?;
        Ok(tx.rlp_signed(&signature))
    }
}

/// The subset of an EVM node the adapter talks to.
#[async_trait]
pub trait EvmRpc: Send + Sync {
    /// Fill nonce, gas and fee fields.
    async fn prepare(&self, tx: TypedTransaction) -> Result<TypedTransaction, SwapError>;

    async fn eth_call(&self, tx: &TypedTransaction) -> Result<Bytes, SwapError>;

    async fn send_raw(&self, raw: Bytes) -> Result<TxHash, SwapError>;

    /// Wait for inclusion. `None` means the transaction was dropped.
    async fn wait_for_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>, SwapError>;
}

#[async_trait]
impl EvmRpc for Provider<Http> {
    async fn prepare(&self, mut tx: TypedTransaction) -> Result<TypedTransaction, SwapError> {
        let from = tx
            .from()
            .copied()
            .ok_or_else(|| SwapError::InvalidPayload("transaction has no sender".into()))?;
        let nonce = self
            .get_transaction_count(from, Some(BlockNumber::Pending.into()))
            .await
            .map_err(classify_provider_error)?;
        tx.set_nonce(nonce);
        self.fill_transaction(&mut tx, None)
            .await
            .map_err(classify_provider_error)?;
        Ok(tx)
    }

    async fn eth_call(&self, tx: &TypedTransaction) -> Result<Bytes, SwapError> {
        Middleware::call(self, tx, None)
            .await
            .map_err(classify_provider_error)
    }

    async fn send_raw(&self, raw: Bytes) -> Result<TxHash, SwapError> {
        let pending = self
            .send_raw_transaction(raw)
            .await
            .map_err(classify_provider_error)?;
        Ok(*pending)
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>, SwapError> {
        // Polling interval and retries belong to the provider.
        PendingTransaction::new(hash, self)
            .await
            .map_err(classify_provider_error)
    }
}

/// Map an ethers provider error onto the candidate failure taxonomy.
pub fn classify_provider_error(err: ProviderError) -> SwapError {
    if let Some(response) = err.as_error_response() {
        if response.code == USER_REJECTED_CODE {
            return SwapError::UserRejected;
        }
        if response.message.to_lowercase().contains("revert") {
            return SwapError::OnChainRevert(response.message.clone());
        }
        return SwapError::Failed(format!("rpc rejected: {}", response.message));
    }
    match err {
        ProviderError::HTTPError(e) => SwapError::TransientNetwork(e.to_string()),
        ProviderError::JsonRpcClientError(e) => SwapError::TransientNetwork(e.to_string()),
        other => SwapError::Failed(other.to_string()),
    }
}

/// Executes `{to, data, value}` payloads for one account on one chain.
pub struct EvmAdapter<R, S> {
    rpc: R,
    signer: S,
    chain_id: u64,
}

impl<R: EvmRpc, S: EvmSigner> EvmAdapter<R, S> {
    pub fn new(rpc: R, signer: S, chain_id: u64) -> Self {
        Self {
            rpc,
            signer,
            chain_id,
        }
    }

    pub fn account(&self) -> Address {
        self.signer.address()
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn request(&self, to: Address, data: Bytes, value: U256) -> TypedTransaction {
        TransactionRequest::new()
            .from(self.signer.address())
            .to(to)
            .data(data)
            .value(value)
            .chain_id(self.chain_id)
            .into()
    }

    /// Read-only contract call from the session account.
    pub async fn read(&self, to: Address, data: Bytes) -> Result<Bytes, SwapError> {
        let tx = self.request(to, data, U256::zero());
        self.rpc.eth_call(&tx).await
    }

    /// Build, sign, broadcast and confirm a call in one go.
    pub async fn execute(&self, to: Address, data: Bytes, value: U256) -> Result<String, SwapError> {
        let signed = self.sign_call(to, data, value).await?;
        let handle = self.submit(signed).await?;
        self.confirm(handle).await
    }

    async fn sign_call(&self, to: Address, data: Bytes, value: U256) -> Result<SignedPayload, SwapError> {
        let tx = self.rpc.prepare(self.request(to, data, value)).await?;
        let raw = self.signer.sign_transaction(&tx).await?;
        let hash = TxHash::from(keccak256(&raw));
        debug!(hash = ?hash, nonce = ?tx.nonce(), "[EVM] transaction signed");
        Ok(SignedPayload::Evm { raw, hash })
    }
}

#[async_trait]
impl<R: EvmRpc, S: EvmSigner> ChainAdapter for EvmAdapter<R, S> {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    async fn sign(&self, payload: &ExecutionPayload) -> Result<SignedPayload, SwapError> {
        let ExecutionPayload::EvmCall { to, data, value } = payload else {
            return Err(SwapError::InvalidPayload(
                "expected an EVM call payload".into(),
            ));
        };
        let to: Address = to
            .parse()
            .map_err(|e| SwapError::InvalidPayload(format!("bad `to` address {to:?}: {e}")))?;
        let data: Bytes = data
            .parse()
            .map_err(|e| SwapError::InvalidPayload(format!("bad calldata: {e}")))?;
        let value = parse_wei(value).map_err(SwapError::InvalidPayload)?;
        self.sign_call(to, data, value).await
    }

    async fn submit(&self, signed: SignedPayload) -> Result<SubmissionHandle, SwapError> {
        let SignedPayload::Evm { raw, hash } = signed else {
            return Err(SwapError::InvalidPayload(
                "expected a signed EVM transaction".into(),
            ));
        };
        let accepted = self.rpc.send_raw(raw).await?;
        if accepted != hash {
            warn!(local = ?hash, remote = ?accepted, "[EVM] node reported a different tx hash");
        }
        info!(hash = ?accepted, "[EVM] transaction submitted");
        Ok(SubmissionHandle::Evm { hash: accepted })
    }

    async fn confirm(&self, handle: SubmissionHandle) -> Result<String, SwapError> {
        let SubmissionHandle::Evm { hash } = handle else {
            return Err(SwapError::InvalidPayload(
                "expected an EVM submission handle".into(),
            ));
        };
        match self.rpc.wait_for_receipt(hash).await? {
            None => Err(SwapError::Failed(format!(
                "transaction {hash:?} was dropped before inclusion"
            ))),
            Some(receipt) if receipt.status == Some(U64::zero()) => Err(SwapError::OnChainRevert(
                format!("transaction {hash:?} reverted"),
            )),
            Some(receipt) => {
                info!(hash = ?receipt.transaction_hash, block = ?receipt.block_number, "[EVM] transaction confirmed");
                Ok(format!("{:?}", receipt.transaction_hash))
            }
        }
    }
}
