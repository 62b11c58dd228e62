// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Hub event attribute parsing.
//!
//! Hub subscriptions deliver events as a flat map of dotted attribute keys
//! to value lists. Values arrive quoted, and byte fields base64-encoded.
//! Parse failures are dropped by the caller; hub event delivery is
//! best-effort and a malformed message can never be fixed by retrying.

use crate::error::{RelayError, RelayResult};
use crate::events::{encode_hex, CanonicalEvent, EventKind};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{Map, Value};
use std::collections::HashMap;

pub const CONTRACT_CALL_SUBMITTED_KEY: &str = "axelar.axelarnet.v1beta1.ContractCallSubmitted";
pub const CONTRACT_CALL_WITH_TOKEN_SUBMITTED_KEY: &str =
    "axelar.axelarnet.v1beta1.ContractCallWithTokenSubmitted";
pub const EVM_EVENT_COMPLETED_KEY: &str = "axelar.evm.v1beta1.EVMEventCompleted";

pub type EventAttrs = HashMap<String, Vec<String>>;

pub fn remove_quote(s: &str) -> String {
    s.replace(['"', '\''], "")
}

pub fn decode_base64(s: &str) -> RelayResult<Vec<u8>> {
    BASE64
        .decode(s)
        .map_err(|e| RelayError::Parse(format!("invalid base64: {}", e)))
}

fn attr_first<'a>(attrs: &'a EventAttrs, key: &str) -> RelayResult<&'a str> {
    attrs
        .get(key)
        .and_then(|v| v.first())
        .map(|s| s.as_str())
        .ok_or_else(|| RelayError::Parse(format!("missing attribute `{}`", key)))
}

fn tx_hash(attrs: &EventAttrs) -> String {
    attrs
        .get("tx.hash")
        .and_then(|v| v.first())
        .map(|s| remove_quote(s))
        .unwrap_or_default()
}

fn tx_height(attrs: &EventAttrs) -> u64 {
    attrs
        .get("tx.height")
        .and_then(|v| v.first())
        .and_then(|s| remove_quote(s).parse().ok())
        .unwrap_or(0)
}

/// Parse one hub message's attributes into canonical events for `kind`.
/// Completion events can carry several event ids at once, hence the Vec.
pub fn parse_hub_event(
    hub_chain: &str,
    kind: EventKind,
    attrs: &EventAttrs,
) -> RelayResult<Vec<CanonicalEvent>> {
    match kind {
        EventKind::HubContractCall => Ok(vec![parse_contract_call_submitted(
            hub_chain,
            attrs,
            CONTRACT_CALL_SUBMITTED_KEY,
            EventKind::HubContractCall,
        )?]),
        EventKind::HubContractCallWithToken => Ok(vec![parse_contract_call_submitted(
            hub_chain,
            attrs,
            CONTRACT_CALL_WITH_TOKEN_SUBMITTED_KEY,
            EventKind::HubContractCallWithToken,
        )?]),
        EventKind::HubEventCompleted => parse_event_completed(hub_chain, attrs),
        EventKind::HubPacketDelivered => Ok(vec![parse_packet_delivered(hub_chain, attrs)?]),
        other => Err(RelayError::Parse(format!(
            "{} is not a hub event kind",
            other
        ))),
    }
}

fn parse_contract_call_submitted(
    hub_chain: &str,
    attrs: &EventAttrs,
    key: &str,
    kind: EventKind,
) -> RelayResult<CanonicalEvent> {
    let field = |name: &str| attr_first(attrs, &format!("{}.{}", key, name));

    let message_id = remove_quote(field("message_id")?);
    let sender = remove_quote(field("sender")?);
    let source_chain = remove_quote(field("source_chain")?);
    let destination_chain = remove_quote(field("destination_chain")?);
    let contract_address = remove_quote(field("contract_address")?);
    let payload = decode_base64(&remove_quote(field("payload")?))?;
    let payload_hash = decode_base64(&remove_quote(field("payload_hash")?))?;

    let mut args = Map::new();
    args.insert("message_id".into(), Value::String(message_id));
    args.insert("sender".into(), Value::String(sender));
    args.insert("contract_address".into(), Value::String(contract_address));
    args.insert("payload".into(), Value::String(encode_hex(&payload)));
    args.insert(
        "payload_hash".into(),
        Value::String(encode_hex(&payload_hash)),
    );

    if kind.with_token() {
        let asset: Value = serde_json::from_str(&remove_quote(field("asset")?))
            .map_err(|e| RelayError::Parse(format!("invalid asset json: {}", e)))?;
        let amount = asset
            .get("amount")
            .map(|v| match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .ok_or_else(|| RelayError::Parse("asset has no amount".to_string()))?;
        let denom = asset
            .get("denom")
            .and_then(|v| v.as_str())
            .ok_or_else(|| RelayError::Parse("asset has no denom".to_string()))?;
        args.insert("amount".into(), Value::String(amount));
        args.insert("symbol".into(), Value::String(denom.to_string()));
    }

    Ok(CanonicalEvent {
        kind,
        chain: hub_chain.to_string(),
        tx_hash: tx_hash(attrs),
        log_index: 0,
        block_height: tx_height(attrs),
        source_chain,
        destination_chain,
        args,
    })
}

fn parse_event_completed(hub_chain: &str, attrs: &EventAttrs) -> RelayResult<Vec<CanonicalEvent>> {
    let key = format!("{}.event_id", EVM_EVENT_COMPLETED_KEY);
    let ids = attrs
        .get(&key)
        .ok_or_else(|| RelayError::Parse(format!("missing attribute `{}`", key)))?;

    let mut events = Vec::with_capacity(ids.len());
    for raw_id in ids {
        let event_id = remove_quote(raw_id);
        let mut args = Map::new();
        args.insert("event_id".into(), Value::String(event_id.clone()));

        // The destination is recovered from the relay record; completion
        // events only carry the originating event id.
        events.push(CanonicalEvent {
            kind: EventKind::HubEventCompleted,
            chain: hub_chain.to_string(),
            tx_hash: tx_hash(attrs),
            log_index: 0,
            block_height: tx_height(attrs),
            source_chain: String::new(),
            destination_chain: String::new(),
            args,
        });
    }
    Ok(events)
}

fn parse_packet_delivered(hub_chain: &str, attrs: &EventAttrs) -> RelayResult<CanonicalEvent> {
    let packet_data = attr_first(attrs, "send_packet.packet_data")?;
    let data: Value = serde_json::from_str(packet_data)
        .map_err(|e| RelayError::Parse(format!("invalid packet_data: {}", e)))?;

    let sequence = attr_first(attrs, "send_packet.packet_sequence")?;
    let memo = data
        .get("memo")
        .map(|v| match v {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default();

    let mut args = Map::new();
    args.insert(
        "sequence".into(),
        Value::String(remove_quote(sequence)),
    );
    args.insert("memo".into(), Value::String(memo));
    if let Some(denom) = data.get("denom").and_then(|v| v.as_str()) {
        args.insert("denom".into(), Value::String(denom.to_string()));
    }
    if let Some(amount) = data.get("amount").and_then(|v| v.as_str()) {
        args.insert("amount".into(), Value::String(amount.to_string()));
    }

    Ok(CanonicalEvent {
        kind: EventKind::HubPacketDelivered,
        chain: hub_chain.to_string(),
        tx_hash: tx_hash(attrs),
        log_index: 0,
        block_height: tx_height(attrs),
        source_chain: hub_chain.to_string(),
        destination_chain: String::new(),
        args,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attrs(entries: &[(&str, &[&str])]) -> EventAttrs {
        entries
            .iter()
            .map(|(k, vs)| {
                (
                    k.to_string(),
                    vs.iter().map(|v| v.to_string()).collect::<Vec<_>>(),
                )
            })
            .collect()
    }

    #[test]
    fn test_remove_quote() {
        assert_eq!(remove_quote("\"hello\""), "hello");
        assert_eq!(remove_quote("'x'"), "x");
        assert_eq!(remove_quote("plain"), "plain");
    }

    #[test]
    fn test_parse_contract_call_submitted() {
        let payload_b64 = BASE64.encode([0xde, 0xad]);
        let hash_b64 = BASE64.encode([0xbe, 0xef]);
        let attrs = attrs(&[
            (
                "axelar.axelarnet.v1beta1.ContractCallSubmitted.message_id",
                &["\"0xmsg-1\""],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallSubmitted.sender",
                &["\"cosmos1sender\""],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallSubmitted.source_chain",
                &["\"cosmoshub-1\""],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallSubmitted.destination_chain",
                &["\"avalanche\""],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallSubmitted.contract_address",
                &["\"0xcontract\""],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallSubmitted.payload",
                &[payload_b64.as_str()],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallSubmitted.payload_hash",
                &[hash_b64.as_str()],
            ),
            ("tx.hash", &["ABCDEF"]),
            ("tx.height", &["\"123\""]),
        ]);

        let events = parse_hub_event("hub", EventKind::HubContractCall, &attrs).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.message_id().unwrap(), "0xmsg-1");
        assert_eq!(event.destination_chain, "avalanche");
        assert_eq!(event.payload().unwrap(), vec![0xde, 0xad]);
        assert_eq!(event.payload_hash().unwrap(), "0xbeef");
        assert_eq!(event.block_height, 123);
        assert_eq!(event.tx_hash, "ABCDEF");
    }

    #[test]
    fn test_parse_with_token_includes_asset() {
        let payload_b64 = BASE64.encode([0x01]);
        let hash_b64 = BASE64.encode([0x02]);
        let attrs = attrs(&[
            (
                "axelar.axelarnet.v1beta1.ContractCallWithTokenSubmitted.message_id",
                &["\"0xmsg-2\""],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallWithTokenSubmitted.sender",
                &["\"cosmos1sender\""],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallWithTokenSubmitted.source_chain",
                &["\"cosmoshub-1\""],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallWithTokenSubmitted.destination_chain",
                &["\"fantom\""],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallWithTokenSubmitted.contract_address",
                &["\"0xcontract\""],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallWithTokenSubmitted.payload",
                &[payload_b64.as_str()],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallWithTokenSubmitted.payload_hash",
                &[hash_b64.as_str()],
            ),
            (
                "axelar.axelarnet.v1beta1.ContractCallWithTokenSubmitted.asset",
                &["{\"amount\":\"1000\",\"denom\":\"uusdc\"}"],
            ),
            ("tx.hash", &["FFFF"]),
        ]);

        let events =
            parse_hub_event("hub", EventKind::HubContractCallWithToken, &attrs).unwrap();
        let event = &events[0];
        assert_eq!(event.symbol().unwrap(), "uusdc");
        assert_eq!(event.amount().unwrap(), "1000");
    }

    #[test]
    fn test_parse_event_completed_fans_out() {
        let attrs = attrs(&[
            (
                "axelar.evm.v1beta1.EVMEventCompleted.event_id",
                &["\"0xaaa-1\"", "\"0xbbb-2\""],
            ),
            ("tx.hash", &["CAFE"]),
        ]);

        let events = parse_hub_event("hub", EventKind::HubEventCompleted, &attrs).unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].completed_event_id().unwrap(), "0xaaa-1");
        assert_eq!(events[1].completed_event_id().unwrap(), "0xbbb-2");
    }

    #[test]
    fn test_missing_attribute_is_parse_error() {
        let attrs = attrs(&[("tx.hash", &["AAAA"])]);
        assert!(matches!(
            parse_hub_event("hub", EventKind::HubContractCall, &attrs),
            Err(RelayError::Parse(_))
        ));
    }

    #[test]
    fn test_parse_packet_delivered() {
        let attrs = attrs(&[
            (
                "send_packet.packet_data",
                &["{\"amount\":\"5\",\"denom\":\"uusdc\",\"memo\":\"hello\"}"],
            ),
            ("send_packet.packet_sequence", &["\"42\""]),
            ("tx.hash", &["BEEF"]),
        ]);

        let events = parse_hub_event("hub", EventKind::HubPacketDelivered, &attrs).unwrap();
        let event = &events[0];
        assert_eq!(event.args.get("memo").unwrap(), "hello");
        assert_eq!(event.args.get("sequence").unwrap(), "42");
    }
}
