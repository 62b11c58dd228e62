// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Canonical, directionless event records produced by the event stream layer.

use crate::clients::evm::IAxelarGatewayEvents;
use crate::error::{RelayError, RelayResult};
use ethers::contract::LogMeta;
use serde_json::{Map, Value};
use std::fmt;

/// The event vocabulary the relay pipeline understands. EVM kinds are
/// observed on gateway contracts, hub kinds on the hub's event bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Gateway `ContractCall` on an EVM chain (EVM -> hub direction)
    ContractCall,
    /// Gateway `ContractCallWithToken` on an EVM chain
    ContractCallWithToken,
    /// Gateway `ContractCallApproved` on an EVM chain (hub -> EVM direction)
    ContractCallApproved,
    /// Gateway `ContractCallApprovedWithMint` on an EVM chain
    ContractCallApprovedWithMint,
    /// Hub-side contract call submission (hub -> EVM direction)
    HubContractCall,
    /// Hub-side contract call submission with token
    HubContractCallWithToken,
    /// Hub reports an EVM-origin event as fully processed
    HubEventCompleted,
    /// IBC packet sent onward from the hub; the inbound flow is complete
    HubPacketDelivered,
}

impl EventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::ContractCall => "contract_call",
            EventKind::ContractCallWithToken => "contract_call_with_token",
            EventKind::ContractCallApproved => "contract_call_approved",
            EventKind::ContractCallApprovedWithMint => "contract_call_approved_with_mint",
            EventKind::HubContractCall => "hub_contract_call",
            EventKind::HubContractCallWithToken => "hub_contract_call_with_token",
            EventKind::HubEventCompleted => "hub_event_completed",
            EventKind::HubPacketDelivered => "hub_packet_delivered",
        }
    }

    pub fn with_token(&self) -> bool {
        matches!(
            self,
            EventKind::ContractCallWithToken
                | EventKind::ContractCallApprovedWithMint
                | EventKind::HubContractCallWithToken
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One observed on-chain or hub event, immutable once emitted. `tx_hash`
/// plus `log_index` forms the natural idempotency key across re-delivery.
#[derive(Debug, Clone)]
pub struct CanonicalEvent {
    pub kind: EventKind,
    /// Chain the event was observed on.
    pub chain: String,
    pub tx_hash: String,
    /// Index of the log within its transaction (not the block).
    pub log_index: u64,
    pub block_height: u64,
    pub source_chain: String,
    pub destination_chain: String,
    pub args: Map<String, Value>,
}

impl CanonicalEvent {
    /// De-duplication key; re-observing the same `(tx_hash, log_index)` must
    /// never create a second relay record.
    pub fn event_id(&self) -> String {
        format!("{}-{}", self.tx_hash, self.log_index)
    }

    fn arg_str(&self, key: &str) -> RelayResult<&str> {
        self.args
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| RelayError::Parse(format!("event missing arg `{}`", key)))
    }

    /// Hex-encoded call payload (`0x`-prefixed) decoded to bytes.
    pub fn payload(&self) -> RelayResult<Vec<u8>> {
        decode_hex(self.arg_str("payload")?)
    }

    pub fn payload_hash(&self) -> RelayResult<String> {
        Ok(self.arg_str("payload_hash")?.to_string())
    }

    /// Hub-assigned message id for hub-origin submissions.
    pub fn message_id(&self) -> RelayResult<String> {
        Ok(self.arg_str("message_id")?.to_string())
    }

    pub fn contract_address(&self) -> RelayResult<String> {
        Ok(self.arg_str("contract_address")?.to_string())
    }

    pub fn source_address(&self) -> RelayResult<String> {
        Ok(self.arg_str("source_address")?.to_string())
    }

    pub fn command_id(&self) -> RelayResult<[u8; 32]> {
        let bytes = decode_hex(self.arg_str("command_id")?)?;
        bytes
            .try_into()
            .map_err(|_| RelayError::Parse("command_id is not 32 bytes".to_string()))
    }

    pub fn symbol(&self) -> RelayResult<String> {
        Ok(self.arg_str("symbol")?.to_string())
    }

    pub fn amount(&self) -> RelayResult<String> {
        Ok(self.arg_str("amount")?.to_string())
    }

    /// Hub-side event id carried by completion events (`{tx_hash}-{index}`).
    pub fn completed_event_id(&self) -> RelayResult<String> {
        Ok(self.arg_str("event_id")?.to_string())
    }

    /// Convert a decoded gateway log into a canonical event. `log_index` is
    /// the position of the log within its transaction, which is what the hub
    /// keys its events by.
    pub fn from_gateway_event(
        chain: &str,
        event: &IAxelarGatewayEvents,
        meta: &LogMeta,
        log_index: u64,
    ) -> Self {
        let tx_hash = format!("{:?}", meta.transaction_hash);
        let block_height = meta.block_number.as_u64();
        let mut args = Map::new();

        let (kind, source_chain, destination_chain) = match event {
            IAxelarGatewayEvents::ContractCallFilter(ev) => {
                args.insert("sender".into(), Value::String(format!("{:?}", ev.sender)));
                args.insert(
                    "contract_address".into(),
                    Value::String(ev.destination_contract_address.clone()),
                );
                args.insert(
                    "payload".into(),
                    Value::String(encode_hex(&ev.payload)),
                );
                args.insert(
                    "payload_hash".into(),
                    Value::String(encode_hex(&ev.payload_hash)),
                );
                (
                    EventKind::ContractCall,
                    chain.to_string(),
                    ev.destination_chain.clone(),
                )
            }
            IAxelarGatewayEvents::ContractCallWithTokenFilter(ev) => {
                args.insert("sender".into(), Value::String(format!("{:?}", ev.sender)));
                args.insert(
                    "contract_address".into(),
                    Value::String(ev.destination_contract_address.clone()),
                );
                args.insert(
                    "payload".into(),
                    Value::String(encode_hex(&ev.payload)),
                );
                args.insert(
                    "payload_hash".into(),
                    Value::String(encode_hex(&ev.payload_hash)),
                );
                args.insert("symbol".into(), Value::String(ev.symbol.clone()));
                args.insert("amount".into(), Value::String(ev.amount.to_string()));
                (
                    EventKind::ContractCallWithToken,
                    chain.to_string(),
                    ev.destination_chain.clone(),
                )
            }
            IAxelarGatewayEvents::ContractCallApprovedFilter(ev) => {
                args.insert(
                    "command_id".into(),
                    Value::String(encode_hex(&ev.command_id)),
                );
                args.insert("source_address".into(), Value::String(ev.source_address.clone()));
                args.insert(
                    "contract_address".into(),
                    Value::String(format!("{:?}", ev.contract_address)),
                );
                args.insert(
                    "payload_hash".into(),
                    Value::String(encode_hex(&ev.payload_hash)),
                );
                args.insert(
                    "source_tx_hash".into(),
                    Value::String(encode_hex(&ev.source_tx_hash)),
                );
                args.insert(
                    "source_event_index".into(),
                    Value::String(ev.source_event_index.to_string()),
                );
                (
                    EventKind::ContractCallApproved,
                    ev.source_chain.clone(),
                    chain.to_string(),
                )
            }
            IAxelarGatewayEvents::ContractCallApprovedWithMintFilter(ev) => {
                args.insert(
                    "command_id".into(),
                    Value::String(encode_hex(&ev.command_id)),
                );
                args.insert("source_address".into(), Value::String(ev.source_address.clone()));
                args.insert(
                    "contract_address".into(),
                    Value::String(format!("{:?}", ev.contract_address)),
                );
                args.insert(
                    "payload_hash".into(),
                    Value::String(encode_hex(&ev.payload_hash)),
                );
                args.insert("symbol".into(), Value::String(ev.symbol.clone()));
                args.insert("amount".into(), Value::String(ev.amount.to_string()));
                args.insert(
                    "source_tx_hash".into(),
                    Value::String(encode_hex(&ev.source_tx_hash)),
                );
                args.insert(
                    "source_event_index".into(),
                    Value::String(ev.source_event_index.to_string()),
                );
                (
                    EventKind::ContractCallApprovedWithMint,
                    ev.source_chain.clone(),
                    chain.to_string(),
                )
            }
        };

        Self {
            kind,
            chain: chain.to_string(),
            tx_hash,
            log_index,
            block_height,
            source_chain,
            destination_chain,
            args,
        }
    }
}

pub fn encode_hex(bytes: impl AsRef<[u8]>) -> String {
    format!("0x{}", hex::encode(bytes.as_ref()))
}

pub fn decode_hex(s: &str) -> RelayResult<Vec<u8>> {
    hex::decode(s.trim_start_matches("0x"))
        .map_err(|e| RelayError::Parse(format!("invalid hex: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event() -> CanonicalEvent {
        let mut args = Map::new();
        args.insert("payload".into(), Value::String("0xdeadbeef".into()));
        args.insert("payload_hash".into(), Value::String("0xaa".into()));
        CanonicalEvent {
            kind: EventKind::ContractCall,
            chain: "avalanche".to_string(),
            tx_hash: "0xabc".to_string(),
            log_index: 2,
            block_height: 100,
            source_chain: "avalanche".to_string(),
            destination_chain: "cosmoshub".to_string(),
            args,
        }
    }

    #[test]
    fn test_event_id_is_tx_hash_and_log_index() {
        assert_eq!(sample_event().event_id(), "0xabc-2");
    }

    #[test]
    fn test_payload_accessor_decodes_hex() {
        assert_eq!(sample_event().payload().unwrap(), vec![0xde, 0xad, 0xbe, 0xef]);
    }

    #[test]
    fn test_missing_arg_is_parse_error() {
        let event = sample_event();
        assert!(matches!(event.message_id(), Err(RelayError::Parse(_))));
        assert!(matches!(event.command_id(), Err(RelayError::Parse(_))));
    }

    #[test]
    fn test_hex_roundtrip() {
        let bytes = vec![0u8, 1, 254, 255];
        assert_eq!(decode_hex(&encode_hex(&bytes)).unwrap(), bytes);
        assert!(decode_hex("0xzz").is_err());
    }
}
