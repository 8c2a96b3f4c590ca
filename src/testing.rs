//! Hand-written collaborators shared by unit tests.

use crate::approval::AllowanceBackend;
use crate::chain::solana::{SolanaRpc, VersionedTxConfig};
use crate::chain::{ChainAdapter, EvmRpc, EvmSigner, SignedPayload, SubmissionHandle};
use crate::errors::SwapError;
use crate::models::{ChainFamily, ExecutionPayload, QuoteCandidate};
use crate::orchestrator::AbortHandle;
use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer as _};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{Address, Bytes, TransactionReceipt, TxHash, U256, U64};
use ethers::utils::keccak256;
use solana_sdk::hash::Hash;
use solana_sdk::instruction::{AccountMeta, Instruction};
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

const TEST_PRIVATE_KEY: &str = "4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";

pub fn test_wallet(chain_id: u64) -> LocalWallet {
    TEST_PRIVATE_KEY
        .parse::<LocalWallet>()
        .unwrap()
        .with_chain_id(chain_id)
}

/// EVM candidate whose `to` address encodes `amount_out`, so scripted
/// adapters can tell candidates apart.
pub fn evm_candidate(provider: &str, amount_out: &str, approval: Option<&str>) -> QuoteCandidate {
    QuoteCandidate {
        provider: provider.to_string(),
        amount_out: amount_out.to_string(),
        price_impact_bps: 0.0,
        approval_address: approval.map(str::to_string),
        execution_payload: ExecutionPayload::EvmCall {
            to: evm_target(amount_out),
            data: "0x".into(),
            value: "0".into(),
        },
    }
}

pub fn evm_target(amount_out: &str) -> String {
    format!("0x{amount_out:0>40}")
}

pub fn solana_candidate(provider: &str, transaction: String, last_valid: Option<u64>) -> QuoteCandidate {
    QuoteCandidate {
        provider: provider.to_string(),
        amount_out: "1".into(),
        price_impact_bps: 0.0,
        approval_address: None,
        execution_payload: ExecutionPayload::Versioned {
            transaction,
            last_valid_block_height: last_valid,
        },
    }
}

pub fn unsigned_transfer(payer: &Pubkey, blockhash: Hash) -> VersionedTransaction {
    let ix = Instruction::new_with_bytes(
        Pubkey::new_unique(),
        &[1, 2, 3],
        vec![AccountMeta::new(*payer, true)],
    );
    let message = Message::new_with_blockhash(&[ix], Some(payer), &blockhash);
    let required = usize::from(message.header.num_required_signatures);
    VersionedTransaction {
        signatures: vec![Signature::default(); required],
        message: VersionedMessage::Legacy(message),
    }
}

pub fn fast_sol_config() -> VersionedTxConfig {
    VersionedTxConfig {
        poll_interval: Duration::from_millis(1),
        max_transient_errors: 2,
        ..VersionedTxConfig::default()
    }
}

#[derive(Default)]
struct EvmRpcState {
    prepared: Vec<TypedTransaction>,
    sent: Vec<Bytes>,
    call_results: VecDeque<Vec<u8>>,
}

/// In-memory EVM node. Receipts succeed unless configured otherwise.
#[derive(Clone)]
pub struct MockEvmRpc {
    state: Arc<Mutex<EvmRpcState>>,
    receipt_status: Option<u64>,
}

impl Default for MockEvmRpc {
    fn default() -> Self {
        Self {
            state: Arc::default(),
            receipt_status: Some(1),
        }
    }
}

impl MockEvmRpc {
    pub fn with_receipt_status(mut self, status: u64) -> Self {
        self.receipt_status = Some(status);
        self
    }

    pub fn dropping_receipts(mut self) -> Self {
        self.receipt_status = None;
        self
    }

    pub fn with_call_result(self, result: Vec<u8>) -> Self {
        self.state.lock().unwrap().call_results.push_back(result);
        self
    }

    pub fn prepared(&self) -> Vec<TypedTransaction> {
        self.state.lock().unwrap().prepared.clone()
    }

    pub fn sent(&self) -> Vec<Bytes> {
        self.state.lock().unwrap().sent.clone()
    }
}

#[async_trait]
impl EvmRpc for MockEvmRpc {
    async fn prepare(&self, mut tx: TypedTransaction) -> Result<TypedTransaction, SwapError> {
        let mut state = self.state.lock().unwrap();
        tx.set_nonce(U256::from(state.prepared.len()));
        tx.set_gas(U256::from(21_000u64));
        tx.set_gas_price(U256::one());
        state.prepared.push(tx.clone());
        Ok(tx)
    }

    async fn eth_call(&self, _tx: &TypedTransaction) -> Result<Bytes, SwapError> {
        self.state
            .lock()
            .unwrap()
            .call_results
            .pop_front()
            .map(Bytes::from)
            .ok_or_else(|| SwapError::Failed("no scripted call result".into()))
    }

    async fn send_raw(&self, raw: Bytes) -> Result<TxHash, SwapError> {
        let hash = TxHash::from(keccak256(&raw));
        self.state.lock().unwrap().sent.push(raw);
        Ok(hash)
    }

    async fn wait_for_receipt(&self, hash: TxHash) -> Result<Option<TransactionReceipt>, SwapError> {
        Ok(self.receipt_status.map(|status| TransactionReceipt {
            transaction_hash: hash,
            status: Some(U64::from(status)),
            ..Default::default()
        }))
    }
}

/// A wallet whose user declines every request.
#[derive(Default)]
pub struct RejectingEvmSigner;

#[async_trait]
impl EvmSigner for RejectingEvmSigner {
    fn address(&self) -> Address {
        Address::repeat_byte(0x11)
    }

    async fn sign_transaction(&self, _tx: &TypedTransaction) -> Result<Bytes, SwapError> {
        Err(SwapError::UserRejected)
    }
}

/// Allowance backend recording approvals; zero allowance unless configured.
#[derive(Default)]
pub struct MockAllowanceBackend {
    allowance: U256,
    reads: AtomicUsize,
    approvals: Mutex<Vec<(String, String, U256)>>,
    failures: HashMap<String, SwapError>,
}

impl MockAllowanceBackend {
    pub fn with_allowance(mut self, allowance: U256) -> Self {
        self.allowance = allowance;
        self
    }

    pub fn failing_spender(mut self, spender: &str, err: SwapError) -> Self {
        self.failures.insert(spender.to_ascii_lowercase(), err);
        self
    }

    pub fn allowance_reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn approvals(&self) -> Vec<(String, String, U256)> {
        self.approvals.lock().unwrap().clone()
    }
}

#[async_trait]
impl AllowanceBackend for MockAllowanceBackend {
    async fn allowance(&self, _asset: &str, _spender: &str) -> Result<U256, SwapError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.allowance)
    }

    async fn approve(&self, asset: &str, spender: &str, amount: U256) -> Result<String, SwapError> {
        if let Some(err) = self.failures.get(&spender.to_ascii_lowercase()) {
            return Err(err.clone());
        }
        let mut approvals = self.approvals.lock().unwrap();
        approvals.push((asset.to_string(), spender.to_string(), amount));
        Ok(format!("0xapprove{}", approvals.len()))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Sign,
    Submit,
    Confirm,
}

/// EVM adapter whose outcome per candidate is scripted by the payload's `to`.
#[derive(Default)]
pub struct ScriptedAdapter {
    failures: HashMap<String, (Stage, SwapError)>,
    tx_ids: HashMap<String, String>,
    signed: Mutex<Vec<String>>,
    in_flight: Mutex<HashMap<TxHash, String>>,
    abort_on_sign: Mutex<Option<AbortHandle>>,
}

impl ScriptedAdapter {
    pub fn confirming(mut self, amount_out: &str, tx_id: &str) -> Self {
        self.tx_ids.insert(evm_target(amount_out), tx_id.to_string());
        self
    }

    pub fn failing(mut self, amount_out: &str, stage: Stage, err: SwapError) -> Self {
        self.failures.insert(evm_target(amount_out), (stage, err));
        self
    }

    pub fn abort_on_first_sign(&self, handle: AbortHandle) {
        *self.abort_on_sign.lock().unwrap() = Some(handle);
    }

    /// `to` addresses in the order they reached `sign`.
    pub fn signed(&self) -> Vec<String> {
        self.signed.lock().unwrap().clone()
    }

    fn fail_at(&self, to: &str, stage: Stage) -> Result<(), SwapError> {
        match self.failures.get(to) {
            Some((at, err)) if *at == stage => Err(err.clone()),
            _ => Ok(()),
        }
    }
}

#[async_trait]
impl ChainAdapter for ScriptedAdapter {
    fn family(&self) -> ChainFamily {
        ChainFamily::Evm
    }

    async fn sign(&self, payload: &ExecutionPayload) -> Result<SignedPayload, SwapError> {
        let ExecutionPayload::EvmCall { to, .. } = payload else {
            return Err(SwapError::InvalidPayload("scripted adapter is EVM only".into()));
        };
        self.signed.lock().unwrap().push(to.clone());
        if let Some(handle) = self.abort_on_sign.lock().unwrap().take() {
            handle.abort();
        }
        self.fail_at(to, Stage::Sign)?;
        let hash = TxHash::from(keccak256(to.as_bytes()));
        self.in_flight.lock().unwrap().insert(hash, to.clone());
        Ok(SignedPayload::Evm {
            raw: Bytes::from(to.as_bytes().to_vec()),
            hash,
        })
    }

    async fn submit(&self, signed: SignedPayload) -> Result<SubmissionHandle, SwapError> {
        let SignedPayload::Evm { hash, .. } = signed else {
            return Err(SwapError::InvalidPayload("scripted adapter is EVM only".into()));
        };
        let to = self.in_flight.lock().unwrap().get(&hash).cloned().unwrap_or_default();
        self.fail_at(&to, Stage::Submit)?;
        Ok(SubmissionHandle::Evm { hash })
    }

    async fn confirm(&self, handle: SubmissionHandle) -> Result<String, SwapError> {
        let SubmissionHandle::Evm { hash } = handle else {
            return Err(SwapError::InvalidPayload("scripted adapter is EVM only".into()));
        };
        let to = self.in_flight.lock().unwrap().get(&hash).cloned().unwrap_or_default();
        self.fail_at(&to, Stage::Confirm)?;
        Ok(self
            .tx_ids
            .get(&to)
            .cloned()
            .unwrap_or_else(|| format!("{hash:?}")))
    }
}

#[derive(Default)]
struct SolanaRpcState {
    sends: usize,
    status_reads: usize,
    landed: HashSet<Signature>,
}

/// Solana node at a fixed block height. Transactions built on a "landing"
/// blockhash confirm; everything else stays unknown forever.
#[derive(Clone)]
pub struct MockSolanaRpc {
    height: u64,
    landing: HashSet<Hash>,
    /// Status reads that still report landed transactions as unknown.
    status_lag: usize,
    unreachable_after_send: bool,
    state: Arc<Mutex<SolanaRpcState>>,
}

impl MockSolanaRpc {
    pub fn new(height: u64) -> Self {
        Self {
            height,
            landing: HashSet::new(),
            status_lag: 0,
            unreachable_after_send: false,
            state: Arc::default(),
        }
    }

    pub fn landing(mut self, blockhash: Hash) -> Self {
        self.landing.insert(blockhash);
        self
    }

    pub fn status_lagging(mut self, reads: usize) -> Self {
        self.status_lag = reads;
        self
    }

    pub fn status_reads(&self) -> usize {
        self.state.lock().unwrap().status_reads
    }

    pub fn unreachable_after_send(mut self) -> Self {
        self.unreachable_after_send = true;
        self
    }

    pub fn sends(&self) -> usize {
        self.state.lock().unwrap().sends
    }

    fn check_reachable(&self) -> Result<(), SwapError> {
        if self.unreachable_after_send && self.sends() > 0 {
            return Err(SwapError::TransientNetwork("connection refused".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SolanaRpc for MockSolanaRpc {
    async fn send_transaction(
        &self,
        tx: &VersionedTransaction,
        _config: &VersionedTxConfig,
    ) -> Result<Signature, SwapError> {
        let signature = tx.signatures[0];
        let mut state = self.state.lock().unwrap();
        state.sends += 1;
        if self.landing.contains(tx.message.recent_blockhash()) {
            state.landed.insert(signature);
        }
        Ok(signature)
    }

    async fn signature_status(
        &self,
        signature: &Signature,
    ) -> Result<Option<Result<(), String>>, SwapError> {
        self.check_reachable()?;
        let mut state = self.state.lock().unwrap();
        state.status_reads += 1;
        let visible = state.status_reads > self.status_lag;
        Ok((visible && state.landed.contains(signature)).then_some(Ok(())))
    }

    async fn block_height(&self) -> Result<u64, SwapError> {
        self.check_reachable()?;
        Ok(self.height)
    }
}
