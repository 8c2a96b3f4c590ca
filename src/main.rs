use anyhow::{Context, Result, bail};
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer as _};
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_commitment_config::CommitmentConfig;
use solana_sdk::signature::Signer as _;
use std::sync::Arc;
use swap_orchestrator::{
    approval::{ApprovalTracker, Erc20Approvals},
    chain::{EvmAdapter, SolanaAdapter},
    config::{AppConfig, load_solana_keypair},
    models::{AssetMetadata, AssetRegistry, ChainFamily, SwapRequest},
    orchestrator::{OrchestrationOutcome, SessionContext, SwapOrchestrator},
    quote::{HttpQuoteClient, QuoteSource},
    utils,
};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    utils::init_logging();

    let cfg = AppConfig::load()?;
    let family = ChainFamily::from_chain_id(cfg.chain_id);
    tracing::info!(chain_id = cfg.chain_id, family = ?family, "[INIT] swap-orchestrator starting");

    let (session, account) = match family {
        ChainFamily::Evm => evm_session(&cfg).await?,
        ChainFamily::Solana => solana_session(&cfg)?,
    };

    let sender = cfg.sender.clone().unwrap_or(account);
    let request = SwapRequest {
        amount_in: cfg.amount_in.clone(),
        token_in: cfg.token_in.clone(),
        token_out: cfg.token_out.clone(),
        receiver: cfg.receiver.clone().unwrap_or_else(|| sender.clone()),
        sender,
        chain_id: cfg.chain_id,
        slippage_bps: cfg.slippage_bps,
    };

    let quotes = HttpQuoteClient::new(&cfg.quote_api_url)?;
    let candidates = quotes.fetch(&request).await;
    if candidates.is_empty() {
        bail!("no executable quote candidates for this request");
    }

    let mut orchestrator = SwapOrchestrator::new(session, request);
    let mut feed = orchestrator.subscribe();
    let progress = tokio::spawn(async move {
        while feed.changed().await.is_ok() {
            let snapshot = feed.borrow_and_update().clone();
            tracing::info!(
                state = ?snapshot.state,
                provider = snapshot.active.as_ref().map(|a| a.candidate.provider.as_str()),
                tried = snapshot.attempts.len(),
                "[PROGRESS]"
            );
            if snapshot.state.is_terminal() {
                break;
            }
        }
    });

    let outcome = orchestrator.run(candidates).await;
    drop(orchestrator);
    let _ = progress.await;

    match outcome {
        OrchestrationOutcome::Success { tx_id, provider } => {
            tracing::info!(%tx_id, %provider, "[DONE] swap executed");
            Ok(())
        }
        OrchestrationOutcome::Exhausted { attempts } => {
            for attempt in &attempts {
                tracing::warn!(
                    index = attempt.index,
                    provider = %attempt.candidate.provider,
                    approval = ?attempt.approval_state,
                    result = ?attempt.execution_result,
                    "[DONE] attempt"
                );
            }
            bail!("all {} candidates failed", attempts.len())
        }
        OrchestrationOutcome::Cancelled { attempts } => {
            bail!("cancelled after {} attempts", attempts.len())
        }
    }
}

async fn evm_session(cfg: &AppConfig) -> Result<(Arc<SessionContext>, String)> {
    let key = cfg
        .private_key
        .as_deref()
        .context("PRIVATE_KEY must be set for EVM chains")?;
    let wallet = key
        .trim_start_matches("0x")
        .parse::<LocalWallet>()?
        .with_chain_id(cfg.chain_id);
    let account = format!("{:?}", wallet.address());
    let provider = Provider::<Http>::try_from(cfg.rpc_url.as_str())?;

    let adapter = Arc::new(EvmAdapter::new(provider, wallet, cfg.chain_id));
    let erc20 = Arc::new(Erc20Approvals::new(adapter.clone()));

    let mut assets = AssetRegistry::with_natives(cfg.chain_id);
    if assets.get(cfg.chain_id, &cfg.token_in).is_none() {
        let decimals = match cfg.token_in_decimals {
            Some(decimals) => Some(decimals),
            None => match erc20.decimals(&cfg.token_in).await {
                Ok(decimals) => Some(decimals),
                Err(e) => {
                    tracing::warn!(token = %cfg.token_in, error = %e, "[INIT] decimals() unavailable");
                    None
                }
            },
        };
        assets.insert(cfg.chain_id, AssetMetadata::token(&cfg.token_in, decimals));
    }

    let session = SessionContext::new(account.clone(), ApprovalTracker::new(erc20), assets)
        .with_adapter(adapter);
    Ok((Arc::new(session), account))
}

fn solana_session(cfg: &AppConfig) -> Result<(Arc<SessionContext>, String)> {
    let raw = cfg
        .solana_keypair
        .as_deref()
        .context("SOLANA_KEYPAIR must be set for Solana chains")?;
    let keypair = load_solana_keypair(raw)?;
    let account = keypair.pubkey().to_string();
    let rpc = RpcClient::new_with_commitment(cfg.rpc_url.clone(), CommitmentConfig::confirmed());

    let adapter = SolanaAdapter::new(rpc, keypair, cfg.execution.versioned_tx());
    let session = SessionContext::new(
        account.clone(),
        ApprovalTracker::disabled(),
        AssetRegistry::with_natives(cfg.chain_id),
    )
    .with_adapter(Arc::new(adapter));
    Ok((Arc::new(session), account))
}
