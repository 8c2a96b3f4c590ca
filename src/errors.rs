use thiserror::Error;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Environment variable error: {0}")]
    Env(#[from] std::env::VarError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] url::ParseError),

    #[error("Provider error: {0}")]
    Provider(#[from] ethers::providers::ProviderError),

    #[error("Wallet error: {0}")]
    Wallet(#[from] ethers::signers::WalletError),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Serialization error: {0}")]
    SerdeJson(#[from] serde_json::Error),

    #[error("Swap error: {0}")]
    Swap(#[from] SwapError),

    #[error("Other: {0}")]
    Other(String),
}

/// Why a single candidate could not be executed.
///
/// None of these abort an orchestration: the orchestrator records the error on
/// the attempt and moves on to the next candidate.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwapError {
    /// The wallet declined to sign.
    #[error("user rejected the request")]
    UserRejected,

    /// RPC unreachable after transport-level retries.
    #[error("transient network failure: {0}")]
    TransientNetwork(String),

    /// Blockhash validity window passed before the transaction landed.
    #[error("expired")]
    Expired {
        last_valid_block_height: u64,
        block_height: u64,
    },

    #[error("on-chain revert: {0}")]
    OnChainRevert(String),

    /// Approval pre-check failed before anything reached the network.
    #[error("approval insufficient: {0}")]
    ApprovalInsufficient(String),

    #[error("approval failed: {0}")]
    ApprovalFailed(String),

    #[error("invalid execution payload: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    Failed(String),
}

impl SwapError {
    pub fn is_user_rejection(&self) -> bool {
        matches!(self, SwapError::UserRejected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expired_displays_short_reason() {
        let err = SwapError::Expired {
            last_valid_block_height: 10,
            block_height: 11,
        };
        assert_eq!(err.to_string(), "expired");
    }

    #[test]
    fn swap_error_converts_into_app_error() {
        let app: AppError = SwapError::UserRejected.into();
        assert!(matches!(app, AppError::Swap(SwapError::UserRejected)));
    }
}
