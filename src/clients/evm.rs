// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! EVM chain client: gateway contract access and transaction submission.

use crate::config::{BroadcastConfig, EvmChainConfig};
use crate::error::{RelayError, RelayResult};
use crate::finality::{EvmFinalityChecker, FinalityChecker};
use ethers::abi::RawLog;
use ethers::contract::{abigen, EthLogDecode, LogMeta};
use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, JsonRpcClient, Middleware, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip2718::TypedTransaction;
use ethers::types::{
    Address, Bytes, Filter, TransactionReceipt, TransactionRequest, TxHash, U256,
};
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

abigen!(
    IAxelarGateway,
    r#"[
        event ContractCall(address indexed sender, string destinationChain, string destinationContractAddress, bytes32 indexed payloadHash, bytes payload)
        event ContractCallWithToken(address indexed sender, string destinationChain, string destinationContractAddress, bytes32 indexed payloadHash, bytes payload, string symbol, uint256 amount)
        event ContractCallApproved(bytes32 indexed commandId, string sourceChain, string sourceAddress, address indexed contractAddress, bytes32 indexed payloadHash, bytes32 sourceTxHash, uint256 sourceEventIndex)
        event ContractCallApprovedWithMint(bytes32 indexed commandId, string sourceChain, string sourceAddress, address indexed contractAddress, bytes32 indexed payloadHash, string symbol, uint256 amount, bytes32 sourceTxHash, uint256 sourceEventIndex)
        function isContractCallApproved(bytes32 commandId, string sourceChain, string sourceAddress, address contractAddress, bytes32 payloadHash) external view returns (bool)
        function isContractCallAndMintApproved(bytes32 commandId, string sourceChain, string sourceAddress, address contractAddress, bytes32 payloadHash, string symbol, uint256 amount) external view returns (bool)
        function isCommandExecuted(bytes32 commandId) external view returns (bool)
    ]"#
);

abigen!(
    IAxelarExecutable,
    r#"[
        function execute(bytes32 commandId, string sourceChain, string sourceAddress, bytes payload) external
        function executeWithToken(bytes32 commandId, string sourceChain, string sourceAddress, bytes payload, string tokenSymbol, uint256 amount) external
    ]"#
);

type EvmMiddleware<P> = SignerMiddleware<Provider<P>, LocalWallet>;

pub struct EvmClient<P: JsonRpcClient> {
    chain: EvmChainConfig,
    client: Arc<EvmMiddleware<P>>,
    gateway_address: Address,
    gateway: IAxelarGateway<EvmMiddleware<P>>,
    finality: EvmFinalityChecker<P>,
    max_retries: u32,
    retry_delay: Duration,
}

impl EvmClient<Http> {
    pub async fn connect(
        chain: EvmChainConfig,
        wallet: LocalWallet,
        broadcast: &BroadcastConfig,
    ) -> anyhow::Result<Self> {
        let provider = Provider::<Http>::try_from(chain.rpc_url.as_str())?;
        Self::new(chain, provider, wallet, broadcast).await
    }
}

impl<P> EvmClient<P>
where
    P: JsonRpcClient + Clone + 'static,
{
    pub async fn new(
        chain: EvmChainConfig,
        provider: Provider<P>,
        wallet: LocalWallet,
        broadcast: &BroadcastConfig,
    ) -> anyhow::Result<Self> {
        let chain_numeric_id = provider.get_chainid().await?.as_u64();
        let wallet = wallet.with_chain_id(chain_numeric_id);
        let gateway_address = Address::from_str(&chain.gateway)
            .map_err(|e| anyhow::anyhow!("invalid gateway address {}: {}", chain.gateway, e))?;

        let mut finality = EvmFinalityChecker::new(
            Arc::new(provider.clone()),
            &chain.id,
            chain.finality_blocks,
            chain.finality_blocks,
        );
        if !chain.native_finality {
            finality = finality.with_block_counting();
        }

        let client = Arc::new(SignerMiddleware::new(provider, wallet));
        let gateway = IAxelarGateway::new(gateway_address, client.clone());

        Ok(Self {
            chain,
            client,
            gateway_address,
            gateway,
            finality,
            max_retries: broadcast.max_retries,
            retry_delay: broadcast.retry_delay(),
        })
    }
}

impl<P> EvmClient<P>
where
    P: JsonRpcClient + 'static,
{
    pub fn chain_id(&self) -> &str {
        &self.chain.id
    }

    pub fn config(&self) -> &EvmChainConfig {
        &self.chain
    }

    pub fn gateway_address(&self) -> Address {
        self.gateway_address
    }

    pub fn sender_address(&self) -> Address {
        self.client.signer().address()
    }

    pub async fn latest_height(&self) -> RelayResult<u64> {
        Ok(self.finality.latest_height().await?)
    }

    pub async fn finalized_height(&self) -> RelayResult<u64> {
        Ok(self.finality.finalized_height().await?)
    }

    /// Whether the block at `height` is final, with the lagging-validator
    /// buffer applied.
    pub async fn is_final(&self, height: u64) -> RelayResult<bool> {
        Ok(self.finality.is_final(height).await?)
    }

    /// Decoded gateway logs in the given inclusive block range.
    pub async fn gateway_logs(
        &self,
        from_block: u64,
        to_block: u64,
    ) -> RelayResult<Vec<(IAxelarGatewayEvents, LogMeta)>> {
        let filter = Filter::new()
            .address(self.gateway_address)
            .from_block(from_block)
            .to_block(to_block);

        let logs = self
            .client
            .get_logs(&filter)
            .await
            .map_err(|e| RelayError::Provider(format!("get_logs failed: {}", e)))?;

        let mut decoded = Vec::with_capacity(logs.len());
        for log in logs {
            let meta = LogMeta::from(&log);
            let raw = RawLog {
                topics: log.topics.clone(),
                data: log.data.to_vec(),
            };
            match IAxelarGatewayEvents::decode_log(&raw) {
                Ok(event) => decoded.push((event, meta)),
                // Gateways emit more event types than the relayer handles
                Err(_) => continue,
            }
        }
        Ok(decoded)
    }

    /// Position of the log within its transaction's receipt. The hub keys
    /// events by this index, not by the block-level log index.
    pub async fn log_index_in_tx(
        &self,
        tx_hash: TxHash,
        block_log_index: U256,
    ) -> RelayResult<u64> {
        let receipt = self
            .client
            .get_transaction_receipt(tx_hash)
            .await
            .map_err(|e| RelayError::Provider(format!("get_transaction_receipt failed: {}", e)))?
            .ok_or_else(|| {
                RelayError::Provider(format!("no receipt for tx {:?}", tx_hash))
            })?;

        receipt
            .logs
            .iter()
            .position(|l| l.log_index == Some(block_log_index))
            .map(|i| i as u64)
            .ok_or_else(|| {
                RelayError::Provider(format!(
                    "log index {} not present in receipt of {:?}",
                    block_log_index, tx_hash
                ))
            })
    }

    // warning: only meaningful after the command has been relayed to the
    // gateway; the approval flag is false both before approval and after
    // execution.
    pub async fn is_contract_call_executed(
        &self,
        command_id: [u8; 32],
        source_chain: &str,
        source_address: &str,
        contract_address: Address,
        payload_hash: [u8; 32],
    ) -> RelayResult<bool> {
        let approved = self
            .gateway
            .is_contract_call_approved(
                command_id,
                source_chain.to_string(),
                source_address.to_string(),
                contract_address,
                payload_hash,
            )
            .call()
            .await
            .map_err(|e| RelayError::Provider(format!("isContractCallApproved failed: {}", e)))?;
        Ok(!approved)
    }

    // warning: same caveat as `is_contract_call_executed`.
    #[allow(clippy::too_many_arguments)]
    pub async fn is_contract_call_with_token_executed(
        &self,
        command_id: [u8; 32],
        source_chain: &str,
        source_address: &str,
        contract_address: Address,
        payload_hash: [u8; 32],
        symbol: &str,
        amount: U256,
    ) -> RelayResult<bool> {
        let approved = self
            .gateway
            .is_contract_call_and_mint_approved(
                command_id,
                source_chain.to_string(),
                source_address.to_string(),
                contract_address,
                payload_hash,
                symbol.to_string(),
                amount,
            )
            .call()
            .await
            .map_err(|e| {
                RelayError::Provider(format!("isContractCallAndMintApproved failed: {}", e))
            })?;
        Ok(!approved)
    }

    /// Submit a signed command batch's execute data straight to the gateway.
    pub async fn gateway_execute(&self, execute_data: Vec<u8>) -> RelayResult<TransactionReceipt> {
        let tx = TransactionRequest::new()
            .to(self.gateway_address)
            .data(Bytes::from(execute_data));
        self.submit_tx(tx.into()).await
    }

    /// Invoke the destination contract's execute entry point.
    pub async fn execute(
        &self,
        contract_address: Address,
        command_id: [u8; 32],
        source_chain: &str,
        source_address: &str,
        payload: Vec<u8>,
    ) -> RelayResult<TransactionReceipt> {
        let executable = IAxelarExecutable::new(contract_address, self.client.clone());
        let call = executable.execute(
            command_id,
            source_chain.to_string(),
            source_address.to_string(),
            Bytes::from(payload),
        );
        self.submit_tx(call.tx).await
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn execute_with_token(
        &self,
        contract_address: Address,
        command_id: [u8; 32],
        source_chain: &str,
        source_address: &str,
        payload: Vec<u8>,
        symbol: &str,
        amount: U256,
    ) -> RelayResult<TransactionReceipt> {
        let executable = IAxelarExecutable::new(contract_address, self.client.clone());
        let call = executable.execute_with_token(
            command_id,
            source_chain.to_string(),
            source_address.to_string(),
            Bytes::from(payload),
            symbol.to_string(),
            amount,
        );
        self.submit_tx(call.tx).await
    }

    /// Send a transaction with bounded retries and a fixed inter-attempt
    /// delay. Gas limit gets 2x headroom over the estimate.
    async fn submit_tx(&self, tx: TypedTransaction) -> RelayResult<TransactionReceipt> {
        let mut attempt = 0u32;
        loop {
            if attempt >= self.max_retries {
                return Err(RelayError::MaxRetriesExceeded { attempts: attempt });
            }
            match self.try_submit(tx.clone()).await {
                Ok(receipt) => return Ok(receipt),
                Err(e) => {
                    error!(
                        "[{}] submit_tx failed (attempt {}): {} to: {:?}",
                        self.chain.id,
                        attempt + 1,
                        e,
                        tx.to()
                    );
                    attempt += 1;
                    tokio::time::sleep(self.retry_delay).await;
                    debug!("[{}] Retrying tx: {}", self.chain.id, attempt);
                }
            }
        }
    }

    async fn try_submit(&self, mut tx: TypedTransaction) -> RelayResult<TransactionReceipt> {
        let gas = self
            .client
            .estimate_gas(&tx, None)
            .await
            .map_err(|e| RelayError::Provider(format!("estimate_gas failed: {}", e)))?;
        tx.set_gas(gas.saturating_mul(U256::from(2)));

        let pending = self
            .client
            .send_transaction(tx, None)
            .await
            .map_err(|e| RelayError::Provider(format!("send_transaction failed: {}", e)))?;

        let receipt = pending
            .await
            .map_err(|e| RelayError::Provider(format!("pending tx failed: {}", e)))?
            .ok_or_else(|| {
                warn!("[{}] transaction dropped from mempool", self.chain.id);
                RelayError::Provider("transaction dropped from mempool".to_string())
            })?;
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ethers::abi::AbiEncode;
    use ethers::contract::EthEvent;
    use ethers::types::{H256, U64};

    #[test]
    fn test_gateway_event_signatures_decode() {
        // A ContractCall log as the gateway would emit it: topic0 is the
        // event signature, sender and payload hash are indexed.
        let sender = Address::repeat_byte(0x11);
        let payload: Bytes = vec![0xde, 0xad].into();
        let payload_hash = H256::repeat_byte(0x22);

        let data = ethers::abi::encode(&[
            ethers::abi::Token::String("cosmoshub-1".to_string()),
            ethers::abi::Token::String("cosmos1contract".to_string()),
            ethers::abi::Token::Bytes(payload.to_vec()),
        ]);

        let raw = RawLog {
            topics: vec![
                ContractCallFilter::signature(),
                H256::from(sender),
                payload_hash,
            ],
            data,
        };

        let decoded = IAxelarGatewayEvents::decode_log(&raw).unwrap();
        match decoded {
            IAxelarGatewayEvents::ContractCallFilter(ev) => {
                assert_eq!(ev.sender, sender);
                assert_eq!(ev.destination_chain, "cosmoshub-1");
                assert_eq!(ev.destination_contract_address, "cosmos1contract");
                assert_eq!(ev.payload_hash, payload_hash.0);
                assert_eq!(ev.payload, payload);
            }
            other => panic!("decoded wrong event: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_log_does_not_decode() {
        let raw = RawLog {
            topics: vec![H256::repeat_byte(0x99)],
            data: vec![],
        };
        assert!(IAxelarGatewayEvents::decode_log(&raw).is_err());
    }

    #[test]
    fn test_command_id_encoding_is_32_bytes() {
        let command_id = [7u8; 32];
        assert_eq!(command_id.encode().len(), 32);
    }

    #[test]
    fn test_log_meta_block_number() {
        let log = ethers::types::Log {
            address: Address::zero(),
            topics: vec![],
            data: Bytes::new(),
            block_hash: Some(H256::zero()),
            block_number: Some(U64::from(42u64)),
            transaction_hash: Some(H256::repeat_byte(1)),
            transaction_index: Some(U64::zero()),
            log_index: Some(U256::from(3)),
            transaction_log_index: None,
            log_type: None,
            removed: None,
        };
        let meta = LogMeta::from(&log);
        assert_eq!(meta.block_number.as_u64(), 42);
        assert_eq!(meta.log_index, U256::from(3));
    }
}
