// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Hub -> destination-chain pipeline.
//!
//! A hub-side submission is routed, its pending commands signed and batched,
//! and the batch executed against the destination gateway (on networks where
//! the hub's own relayers don't do it). The final leg fires when the gateway
//! approves the call: the destination contract's execute entry point is
//! invoked, unless a read shows it already ran.

use crate::clients::evm::EvmClient;
use crate::error::{RelayError, RelayResult};
use crate::events::{decode_hex, CanonicalEvent, EventKind};
use crate::node::RelayerContext;
use crate::types::{Direction, RelayRecord, RelayStatus};
use ethers::providers::JsonRpcClient;
use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::{info, warn};

/// Hub-side contract call submission: route, sign, batch, execute.
pub async fn handle_submitted_event<P>(
    ctx: &RelayerContext<P>,
    destination: Arc<EvmClient<P>>,
    event: &CanonicalEvent,
) -> RelayResult<()>
where
    P: JsonRpcClient + 'static,
{
    let message_id = event.message_id()?;
    let dest_chain = event.destination_chain.as_str();

    let record = RelayRecord::new(
        &message_id,
        Direction::Outbound,
        &event.source_chain,
        dest_chain,
    )
    .with_payload(event.payload()?, event.payload_hash()?)
    .with_source_tx(&event.tx_hash);
    if ctx.store.create_if_absent(record).await? {
        ctx.metrics.relays_created.inc();
    }

    let payload = event.payload()?;
    if let Some(tx) = ctx.hub.route_message(&message_id, &payload).await? {
        info!("RouteMessage {}: {}", message_id, tx.tx_hash);
        ctx.store.record_hub_tx(&message_id, &tx.tx_hash).await?;
    }
    ctx.store
        .advance_status(&message_id, RelayStatus::Routed)
        .await?;

    let pending = ctx.hub.querier().pending_commands(dest_chain).await?;
    info!(
        "PendingCommands for {}: {}",
        dest_chain,
        pending.len()
    );
    if pending.is_empty() {
        // Not ready yet; a later event or reconciliation resumes from here
        return Ok(());
    }
    ctx.store
        .advance_status(&message_id, RelayStatus::PendingSign)
        .await?;

    let sign = ctx.hub.sign_commands(dest_chain).await?;
    ctx.store.record_hub_tx(&message_id, &sign.tx_hash).await?;
    ctx.store
        .advance_status(&message_id, RelayStatus::Signed)
        .await?;

    let batch_id = sign
        .batched_commands_id
        .clone()
        .ok_or(RelayError::BatchIdMissing)?;
    info!("BatchCommandId: {}", batch_id);

    let execute_data = ctx.hub.execute_data_for_batch(dest_chain, &batch_id).await?;
    ctx.store
        .advance_status(&message_id, RelayStatus::Batched)
        .await?;

    if ctx.config.run_mode.hub_executes_batches() {
        warn!("Skipping gateway execute for {}; the hub's relayers own that step", batch_id);
        return Ok(());
    }

    let receipt = destination.gateway_execute(execute_data).await?;
    let dest_tx = format!("{:?}", receipt.transaction_hash);
    info!("Execute: {}", dest_tx);
    ctx.store
        .record_destination_tx(&message_id, &dest_tx)
        .await?;
    ctx.store
        .advance_status(&message_id, RelayStatus::Executed)
        .await?;
    Ok(())
}

/// Gateway approved a contract call: deliver it to the destination contract,
/// unless a contract read shows someone already did.
pub async fn handle_approved_event<P>(
    ctx: &RelayerContext<P>,
    destination: Arc<EvmClient<P>>,
    event: &CanonicalEvent,
) -> RelayResult<()>
where
    P: JsonRpcClient + 'static,
{
    let command_id = event.command_id()?;
    let payload_hash = event.payload_hash()?;
    let payload_hash_bytes: [u8; 32] = decode_hex(&payload_hash)?
        .try_into()
        .map_err(|_| RelayError::Parse("payload hash is not 32 bytes".to_string()))?;
    let contract_str = event.contract_address()?;
    let contract_address: Address = contract_str
        .parse()
        .map_err(|e| RelayError::Parse(format!("invalid contract address: {}", e)))?;
    let source_address = event.source_address()?;
    let with_token = event.kind == EventKind::ContractCallApprovedWithMint;

    let records = ctx.store.find_by_payload_hash(&payload_hash).await?;
    if records.is_empty() {
        info!(
            "Cannot find payload for payload hash {}, nothing to execute",
            payload_hash
        );
        return Ok(());
    }

    let (symbol, amount) = if with_token {
        let amount = U256::from_dec_str(&event.amount()?)
            .map_err(|e| RelayError::Parse(format!("invalid amount: {}", e)))?;
        (event.symbol()?, amount)
    } else {
        (String::new(), U256::zero())
    };

    for record in records {
        let Some(payload) = record.payload.clone() else {
            continue;
        };
        if record.status == RelayStatus::Completed {
            continue;
        }

        let executed = if with_token {
            destination
                .is_contract_call_with_token_executed(
                    command_id,
                    &event.source_chain,
                    &source_address,
                    contract_address,
                    payload_hash_bytes,
                    &symbol,
                    amount,
                )
                .await?
        } else {
            destination
                .is_contract_call_executed(
                    command_id,
                    &event.source_chain,
                    &source_address,
                    contract_address,
                    payload_hash_bytes,
                )
                .await?
        };

        if executed {
            info!(
                "Already executed relay {} with command {}, marking success",
                record.id,
                hex::encode(command_id)
            );
            ctx.store
                .advance_status(&record.id, RelayStatus::Completed)
                .await?;
            continue;
        }

        if ctx.config.skips_contract(&contract_str) {
            info!(
                "Skipping contract {} for testing, payload hash {}",
                contract_str, payload_hash
            );
            continue;
        }

        let result = if with_token {
            destination
                .execute_with_token(
                    contract_address,
                    command_id,
                    &event.source_chain,
                    &source_address,
                    payload,
                    &symbol,
                    amount,
                )
                .await
        } else {
            destination
                .execute(
                    contract_address,
                    command_id,
                    &event.source_chain,
                    &source_address,
                    payload,
                )
                .await
        };

        match result {
            Ok(receipt) => {
                let dest_tx = format!("{:?}", receipt.transaction_hash);
                info!("Executed relay {}: {}", record.id, dest_tx);
                ctx.store.record_destination_tx(&record.id, &dest_tx).await?;
                ctx.store
                    .advance_status(&record.id, RelayStatus::Completed)
                    .await?;
            }
            Err(e) => {
                warn!("Execute failed for relay {}: {}, marking failed", record.id, e);
                ctx.store
                    .advance_status(&record.id, RelayStatus::Failed)
                    .await?;
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{test_context, TestHarness};
    use crate::types::{HubTxResponse, PendingCommand};
    use serde_json::{Map, Value};

    fn submitted_event(message_id: &str) -> CanonicalEvent {
        let mut args = Map::new();
        args.insert("message_id".into(), Value::String(message_id.to_string()));
        args.insert("payload".into(), Value::String("0xdead".to_string()));
        args.insert("payload_hash".into(), Value::String("0xbeef".to_string()));
        args.insert(
            "contract_address".into(),
            Value::String("0x9f3a2f1f2e8f0dd1e2a6b1e2c3d4e5f607182930".to_string()),
        );
        CanonicalEvent {
            kind: EventKind::HubContractCall,
            chain: "hub".to_string(),
            tx_hash: "AB12".to_string(),
            log_index: 0,
            block_height: 50,
            source_chain: "cosmoshub-1".to_string(),
            destination_chain: "avalanche".to_string(),
            args,
        }
    }

    fn ok_tx(hash: &str) -> HubTxResponse {
        HubTxResponse {
            tx_hash: hash.to_string(),
            raw_log: "[]".to_string(),
            batched_commands_id: None,
        }
    }

    async fn destination(harness: &TestHarness) -> Arc<EvmClient<ethers::providers::MockProvider>> {
        harness.ctx.router.client("avalanche").unwrap()
    }

    #[tokio::test]
    async fn test_submitted_stops_when_no_pending_commands() {
        let harness = test_context().await;
        harness.broadcaster.push_response(Ok(ok_tx("ROUTE"))).await;
        // MockQuerier returns no pending commands by default

        let dest = destination(&harness).await;
        handle_submitted_event(&harness.ctx, dest, &submitted_event("0xmsg-1"))
            .await
            .unwrap();

        let record = harness.ctx.store.get("0xmsg-1").await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Routed);
        // Only the route broadcast went out; no sign attempt
        assert_eq!(harness.broadcaster.call_count().await, 1);
    }

    #[tokio::test]
    async fn test_submitted_signs_when_commands_pending_and_mainnet_stops_at_batch() {
        let harness = crate::test_utils::test_context_with_mode(crate::config::RunMode::Mainnet).await;
        harness.broadcaster.push_response(Ok(ok_tx("ROUTE"))).await;
        harness
            .broadcaster
            .push_response(Ok(HubTxResponse {
                tx_hash: "SIGN".to_string(),
                raw_log: "[]".to_string(),
                batched_commands_id: Some("0xbatch".to_string()),
            }))
            .await;
        harness
            .querier
            .set_pending_commands(
                "avalanche",
                vec![PendingCommand {
                    id: "cmd".to_string(),
                    command_type: "approveContractCall".to_string(),
                    params: Default::default(),
                }],
            )
            .await;
        harness
            .querier
            .push_batch(crate::clients::hub::BatchedCommands {
                status: crate::types::BatchStatus::Signed,
                execute_data: Some(vec![9, 9]),
            })
            .await;

        let dest = destination(&harness).await;
        handle_submitted_event(&harness.ctx, dest, &submitted_event("0xmsg-2"))
            .await
            .unwrap();

        let record = harness.ctx.store.get("0xmsg-2").await.unwrap().unwrap();
        // Mainnet: the hub's relayers execute; we stop after the batch
        assert_eq!(record.status, RelayStatus::Batched);
        assert_eq!(record.hub_tx.as_deref(), Some("SIGN"));
        assert!(record.destination_tx.is_none());
        assert_eq!(harness.broadcaster.call_count().await, 2);
    }

    #[tokio::test]
    async fn test_submitted_sign_failure_is_hard_error() {
        let harness = test_context().await;
        harness.broadcaster.push_response(Ok(ok_tx("ROUTE"))).await;
        harness
            .broadcaster
            .push_response(Ok(HubTxResponse {
                tx_hash: "SIGN".to_string(),
                raw_log: "sign commands failed: no active keygen".to_string(),
                batched_commands_id: None,
            }))
            .await;
        harness
            .querier
            .set_pending_commands(
                "avalanche",
                vec![PendingCommand {
                    id: "cmd".to_string(),
                    command_type: "approveContractCall".to_string(),
                    params: Default::default(),
                }],
            )
            .await;

        let dest = destination(&harness).await;
        let result = handle_submitted_event(&harness.ctx, dest, &submitted_event("0xmsg-3")).await;
        assert!(matches!(result, Err(RelayError::SignRejected(_))));
    }

    fn approved_event(payload_hash: &str) -> CanonicalEvent {
        let mut args = Map::new();
        args.insert(
            "command_id".into(),
            Value::String(format!("0x{}", hex::encode([1u8; 32]))),
        );
        args.insert("payload_hash".into(), Value::String(payload_hash.to_string()));
        args.insert(
            "contract_address".into(),
            Value::String("0x9f3a2f1f2e8f0dd1e2a6b1e2c3d4e5f607182930".to_string()),
        );
        args.insert("source_address".into(), Value::String("cosmos1abc".to_string()));
        CanonicalEvent {
            kind: EventKind::ContractCallApproved,
            chain: "avalanche".to_string(),
            tx_hash: "0xaa".to_string(),
            log_index: 1,
            block_height: 10,
            source_chain: "cosmoshub-1".to_string(),
            destination_chain: "avalanche".to_string(),
            args,
        }
    }

    #[tokio::test]
    async fn test_approved_without_known_payload_is_a_noop() {
        let harness = test_context().await;
        let unknown_hash = format!("0x{}", hex::encode([0xaa_u8; 32]));

        let dest = destination(&harness).await;
        // No record committed to this payload hash: nothing to execute, and
        // nothing touches the (empty) mock provider.
        handle_approved_event(&harness.ctx, dest, &approved_event(&unknown_hash))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_approved_already_executed_completes_without_broadcast() {
        let harness = test_context().await;
        let payload_hash = format!("0x{}", hex::encode([0xcb_u8; 32]));
        let record = RelayRecord::new("0xmsg-8", Direction::Outbound, "cosmoshub-1", "avalanche")
            .with_payload(vec![1, 2], payload_hash.clone());
        harness.ctx.store.create_if_absent(record).await.unwrap();

        // Gateway read: isContractCallApproved returns false, meaning the
        // call was approved and already executed by someone else.
        harness
            .evm_mock
            .push::<String, String>(
                "0x0000000000000000000000000000000000000000000000000000000000000000"
                    .to_string(),
            )
            .unwrap();

        let dest = destination(&harness).await;
        handle_approved_event(&harness.ctx, dest, &approved_event(&payload_hash))
            .await
            .unwrap();

        let record = harness.ctx.store.get("0xmsg-8").await.unwrap().unwrap();
        assert_eq!(record.status, RelayStatus::Completed);
        assert!(record.destination_tx.is_none());
        assert_eq!(harness.broadcaster.call_count().await, 0);
    }

    #[tokio::test]
    async fn test_approved_with_completed_record_skips_gateway_read() {
        let harness = test_context().await;
        let payload_hash = format!("0x{}", hex::encode([0xca_u8; 32]));
        let record = RelayRecord::new("0xmsg-9", Direction::Outbound, "cosmoshub-1", "avalanche")
            .with_payload(vec![1, 2], payload_hash.clone());
        harness.ctx.store.create_if_absent(record).await.unwrap();
        harness
            .ctx
            .store
            .advance_status("0xmsg-9", RelayStatus::Completed)
            .await
            .unwrap();

        let dest = destination(&harness).await;
        // Would hit the (empty) mock provider if it tried the gateway read;
        // the completed record short-circuits before any contract call.
        handle_approved_event(&harness.ctx, dest, &approved_event(&payload_hash))
            .await
            .unwrap();
    }
}
