//! Drives ranked candidates through approval → sign → submit → confirm.
//!
//! Trials are strictly sequential: allowances and nonces/blockhashes are shared
//! on-chain state, so a second trial never starts before the first resolves.
//! The first candidate to confirm wins.

use crate::approval::{ApprovalState, ApprovalTracker};
use crate::chain::ChainAdapter;
use crate::errors::SwapError;
use crate::models::{AssetMetadata, AssetRegistry, ChainFamily, SwapRequest};
use crate::quote::QuoteCandidateSet;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, watch};
use tracing::{info, warn};

pub mod state;

pub use state::{
    ExecutionResult, OrchestrationOutcome, OrchestratorSnapshot, SwapAttempt, SwapState,
};


/// Account, signing backends and approval bookkeeping of one wallet session.
///
/// Injected into every orchestration instead of living in globals.
pub struct SessionContext {
    account: String,
    adapters: HashMap<ChainFamily, Arc<dyn ChainAdapter>>,
    approvals: Mutex<ApprovalTracker>,
    assets: AssetRegistry,
}

impl SessionContext {
    pub fn new(account: impl Into<String>, approvals: ApprovalTracker, assets: AssetRegistry) -> Self {
        Self {
            account: account.into(),
            adapters: HashMap::new(),
            approvals: Mutex::new(approvals),
            assets,
        }
    }

    pub fn with_adapter(mut self, adapter: Arc<dyn ChainAdapter>) -> Self {
        self.adapters.insert(adapter.family(), adapter);
        self
    }

    pub fn account(&self) -> &str {
        &self.account
    }

    pub fn adapter(&self, family: ChainFamily) -> Option<Arc<dyn ChainAdapter>> {
        self.adapters.get(&family).cloned()
    }

    pub fn assets(&self) -> &AssetRegistry {
        &self.assets
    }
}

/// Requests that an orchestration stop before its next candidate.
#[derive(Clone)]
pub struct AbortHandle(Arc<watch::Sender<bool>>);

impl AbortHandle {
    pub fn abort(&self) {
        self.0.send_replace(true);
    }
}

pub struct SwapOrchestrator {
    session: Arc<SessionContext>,
    request: SwapRequest,
    snapshot: watch::Sender<OrchestratorSnapshot>,
    abort: Arc<watch::Sender<bool>>,
}

impl SwapOrchestrator {
    pub fn new(session: Arc<SessionContext>, request: SwapRequest) -> Self {
        let (snapshot, _) = watch::channel(OrchestratorSnapshot::default());
        let (abort, _) = watch::channel(false);
        Self {
            session,
            request,
            snapshot,
            abort: Arc::new(abort),
        }
    }

    pub fn request(&self) -> &SwapRequest {
        &self.request
    }

    /// Progress feed; every state change is published.
    pub fn subscribe(&self) -> watch::Receiver<OrchestratorSnapshot> {
        self.snapshot.subscribe()
    }

    pub fn snapshot(&self) -> OrchestratorSnapshot {
        self.snapshot.borrow().clone()
    }

    pub fn attempts(&self) -> Vec<SwapAttempt> {
        self.snapshot.borrow().attempts.clone()
    }

    pub fn abort_handle(&self) -> AbortHandle {
        AbortHandle(self.abort.clone())
    }

    fn abort_requested(&self) -> bool {
        *self.abort.borrow()
    }

    /// Try candidates in rank order until one confirms or none remain.
    ///
    /// `&mut self` keeps a second run on the same request from overlapping.
    pub async fn run(&mut self, mut candidates: QuoteCandidateSet) -> OrchestrationOutcome {
        let family = self.request.chain_family();
        let asset = self
            .session
            .assets()
            .resolve(self.request.chain_id, &self.request.token_in);
        self.snapshot.send_replace(OrchestratorSnapshot::default());
        info!(
            chain_id = self.request.chain_id,
            family = ?family,
            account = %self.session.account(),
            candidates = candidates.len(),
            "[SWAP] orchestration started"
        );

        let mut attempts: Vec<SwapAttempt> = Vec::new();
        loop {
            if self.abort_requested() {
                info!(tried = attempts.len(), "[SWAP] cancelled by caller");
                return self.finish(
                    SwapState::Cancelled,
                    OrchestrationOutcome::Cancelled { attempts },
                );
            }

            self.publish(SwapState::SelectingCandidate, None);
            let Some((index, candidate)) = candidates.take_next() else {
                warn!(tried = attempts.len(), "[SWAP] all candidates exhausted");
                return self.finish(
                    SwapState::Exhausted,
                    OrchestrationOutcome::Exhausted { attempts },
                );
            };

            info!(index, provider = %candidate.provider, amount_out = %candidate.amount_out, "[SWAP] trying candidate");
            let attempt = self
                .try_candidate(SwapAttempt::new(index, candidate), family, &asset)
                .await;
            attempts.push(attempt.clone());
            self.snapshot
                .send_modify(|snap| snap.attempts.push(attempt.clone()));

            match &attempt.execution_result {
                ExecutionResult::Confirmed(tx_id) => {
                    info!(index, provider = %attempt.candidate.provider, tx_id = %tx_id, "[SWAP] swap confirmed");
                    return self.finish(
                        SwapState::Success,
                        OrchestrationOutcome::Success {
                            tx_id: tx_id.clone(),
                            provider: attempt.candidate.provider.clone(),
                        },
                    );
                }
                result => {
                    warn!(index, provider = %attempt.candidate.provider, result = ?result, "[SWAP] candidate failed, advancing");
                    self.publish(SwapState::AdvancingToNext { index }, Some(&attempt));
                }
            }
        }
    }

    async fn try_candidate(
        &self,
        mut attempt: SwapAttempt,
        family: ChainFamily,
        asset: &AssetMetadata,
    ) -> SwapAttempt {
        let index = attempt.index;
        // Versioned transactions carry their own transfer authority.
        let spender = attempt
            .candidate
            .approval_address
            .clone()
            .filter(|_| family == ChainFamily::Evm)
            .filter(|s| ApprovalTracker::requires_approval(asset, Some(s.as_str())));
        attempt.approval_state = match spender {
            Some(_) => ApprovalState::Pending,
            None => ApprovalState::NotRequired,
        };
        self.publish(SwapState::Approving { index }, Some(&attempt));

        if let Some(spender) = spender.as_deref() {
            attempt.approval_state = self
                .session
                .approvals
                .lock()
                .await
                .ensure_approved(asset, Some(spender), &self.request.amount_in)
                .await;
            if let Some(err) = attempt.approval_state.blocking_error() {
                attempt.execution_result = ExecutionResult::from_error(err);
                return attempt;
            }
        }

        attempt.execution_result = match self.execute(&attempt, family).await {
            Ok(tx_id) => ExecutionResult::Confirmed(tx_id),
            Err(err) => ExecutionResult::from_error(err),
        };
        if let (ExecutionResult::Confirmed(_), Some(spender)) =
            (&attempt.execution_result, spender.as_deref())
        {
            self.session
                .approvals
                .lock()
                .await
                .consume(asset, spender, &self.request.amount_in);
        }
        attempt
    }

    /// Sign, submit and confirm. Once signing starts the call runs to completion.
    async fn execute(&self, attempt: &SwapAttempt, family: ChainFamily) -> Result<String, SwapError> {
        let index = attempt.index;
        let payload = &attempt.candidate.execution_payload;
        if payload.family() != family {
            return Err(SwapError::InvalidPayload(format!(
                "{:?} payload for a {family:?} request",
                payload.family()
            )));
        }
        let adapter = self
            .session
            .adapter(family)
            .ok_or_else(|| SwapError::Failed(format!("no {family:?} adapter in session")))?;

        self.publish(SwapState::Signing { index }, Some(attempt));
        let signed = adapter.sign(payload).await?;

        self.publish(SwapState::Submitting { index }, Some(attempt));
        let handle = adapter.submit(signed).await?;

        self.publish(SwapState::Confirming { index }, Some(attempt));
        adapter.confirm(handle).await
    }

    fn publish(&self, state: SwapState, active: Option<&SwapAttempt>) {
        self.snapshot.send_modify(|snap| {
            snap.state = state;
            snap.active = active.cloned();
        });
    }

    fn finish(&self, state: SwapState, outcome: OrchestrationOutcome) -> OrchestrationOutcome {
        self.snapshot.send_modify(|snap| {
            snap.state = state;
            snap.active = None;
            snap.outcome = Some(outcome.clone());
        });
        outcome
    }
}
