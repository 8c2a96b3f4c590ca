use crate::approval::ApprovalState;
use crate::errors::SwapError;
use crate::models::QuoteCandidate;

/// Where an orchestration currently is. Indexed states carry the candidate rank.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapState {
    Idle,
    SelectingCandidate,
    Approving { index: usize },
    Signing { index: usize },
    Submitting { index: usize },
    Confirming { index: usize },
    AdvancingToNext { index: usize },
    Success,
    Exhausted,
    Cancelled,
}

impl SwapState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SwapState::Success | SwapState::Exhausted | SwapState::Cancelled
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionResult {
    Pending,
    Confirmed(String),
    Rejected,
    Failed(SwapError),
}

impl ExecutionResult {
    pub fn from_error(err: SwapError) -> Self {
        if err.is_user_rejection() {
            ExecutionResult::Rejected
        } else {
            ExecutionResult::Failed(err)
        }
    }
}

/// One trial of one candidate. Never reused across trials.
#[derive(Debug, Clone, PartialEq)]
pub struct SwapAttempt {
    pub index: usize,
    pub candidate: QuoteCandidate,
    pub approval_state: ApprovalState,
    pub execution_result: ExecutionResult,
}

impl SwapAttempt {
    pub fn new(index: usize, candidate: QuoteCandidate) -> Self {
        Self {
            index,
            candidate,
            approval_state: ApprovalState::Required,
            execution_result: ExecutionResult::Pending,
        }
    }

    pub fn succeeded(&self) -> bool {
        matches!(self.execution_result, ExecutionResult::Confirmed(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrchestrationOutcome {
    Success { tx_id: String, provider: String },
    /// Every candidate failed; one attempt per candidate, in rank order.
    Exhausted { attempts: Vec<SwapAttempt> },
    /// Abandoned by the caller between trials.
    Cancelled { attempts: Vec<SwapAttempt> },
}

impl OrchestrationOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, OrchestrationOutcome::Success { .. })
    }
}

/// Everything a presentation layer needs to render progress.
#[derive(Debug, Clone, PartialEq)]
pub struct OrchestratorSnapshot {
    pub state: SwapState,
    pub active: Option<SwapAttempt>,
    pub attempts: Vec<SwapAttempt>,
    pub outcome: Option<OrchestrationOutcome>,
}

impl Default for OrchestratorSnapshot {
    fn default() -> Self {
        Self {
            state: SwapState::Idle,
            active: None,
            attempts: Vec::new(),
            outcome: None,
        }
    }
}
