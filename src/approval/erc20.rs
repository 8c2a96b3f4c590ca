use super::AllowanceBackend;
use crate::chain::evm::{EvmAdapter, EvmRpc, EvmSigner};
use crate::errors::SwapError;
use async_trait::async_trait;
use ethers::abi::{AbiDecode, AbiEncode};
use ethers::contract::abigen;
use ethers::types::{Address, Bytes, U256};
use std::sync::Arc;

abigen!(
    Erc20,
    r"[
        function approve(address spender, uint256 amount) returns (bool)
        function allowance(address owner, address spender) view returns (uint256)
        function decimals() view returns (uint8)
    ]",
);

/// ERC-20 allowance reads and approvals through the session's EVM adapter.
pub struct Erc20Approvals<R, S> {
    adapter: Arc<EvmAdapter<R, S>>,
}

impl<R: EvmRpc, S: EvmSigner> Erc20Approvals<R, S> {
    pub fn new(adapter: Arc<EvmAdapter<R, S>>) -> Self {
        Self { adapter }
    }

    pub async fn decimals(&self, token: &str) -> Result<u8, SwapError> {
        let token = parse_address(token)?;
        let raw = self
            .adapter
            .read(token, Bytes::from(DecimalsCall.encode()))
            .await?;
        let DecimalsReturn(decimals) = DecimalsReturn::decode(raw.as_ref())
            .map_err(|e| SwapError::Failed(format!("bad decimals() return: {e}")))?;
        Ok(decimals)
    }
}

#[async_trait]
impl<R: EvmRpc, S: EvmSigner> AllowanceBackend for Erc20Approvals<R, S> {
    async fn allowance(&self, asset: &str, spender: &str) -> Result<U256, SwapError> {
        let call = AllowanceCall {
            owner: self.adapter.account(),
            spender: parse_address(spender)?,
        };
        let raw = self
            .adapter
            .read(parse_address(asset)?, Bytes::from(call.encode()))
            .await?;
        let AllowanceReturn(allowance) = AllowanceReturn::decode(raw.as_ref())
            .map_err(|e| SwapError::Failed(format!("bad allowance() return: {e}")))?;
        Ok(allowance)
    }

    async fn approve(&self, asset: &str, spender: &str, amount: U256) -> Result<String, SwapError> {
        let call = ApproveCall {
            spender: parse_address(spender)?,
            amount,
        };
        self.adapter
            .execute(parse_address(asset)?, Bytes::from(call.encode()), U256::zero())
            .await
    }
}

fn parse_address(value: &str) -> Result<Address, SwapError> {
    value
        .trim()
        .parse()
        .map_err(|e| SwapError::InvalidPayload(format!("bad address {value:?}: {e}")))
}
