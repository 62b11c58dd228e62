// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Hub event listener.
//!
//! Connects to the hub node over websocket, subscribes one query per topic,
//! and pushes parsed canonical events downstream. Connection loss triggers
//! reconnect with unbounded backoff and a full re-subscribe; per-message
//! parse failures are logged and dropped, since hub event delivery is
//! best-effort.

use crate::events::{CanonicalEvent, EventKind};
use crate::listener::parse::{self, EventAttrs};
use crate::metrics::RelayerMetrics;
use backoff::backoff::Backoff;
use backoff::ExponentialBackoff;
use futures::stream::select_all;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;
use tendermint_rpc::query::{EventType, Query};
use tendermint_rpc::{SubscriptionClient, Url, WebSocketClient};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// One subscription topic: the query sent to the hub, and the kind of
/// canonical event its messages parse into.
#[derive(Debug, Clone)]
pub struct HubTopic {
    pub kind: EventKind,
    query: Query,
    query_string: String,
}

impl HubTopic {
    fn new(kind: EventKind, query: Query) -> Self {
        let query_string = query.to_string();
        Self {
            kind,
            query,
            query_string,
        }
    }

    pub fn contract_call_submitted() -> Self {
        let key = format!("{}.message_id", parse::CONTRACT_CALL_SUBMITTED_KEY);
        Self::new(
            EventKind::HubContractCall,
            Query::from(EventType::Tx).and_exists(key.as_str()),
        )
    }

    pub fn contract_call_with_token_submitted() -> Self {
        let key = format!(
            "{}.message_id",
            parse::CONTRACT_CALL_WITH_TOKEN_SUBMITTED_KEY
        );
        Self::new(
            EventKind::HubContractCallWithToken,
            Query::from(EventType::Tx).and_exists(key.as_str()),
        )
    }

    pub fn evm_event_completed() -> Self {
        let key = format!("{}.event_id", parse::EVM_EVENT_COMPLETED_KEY);
        Self::new(
            EventKind::HubEventCompleted,
            Query::from(EventType::NewBlock).and_exists(key.as_str()),
        )
    }

    pub fn packet_delivered() -> Self {
        Self::new(
            EventKind::HubPacketDelivered,
            Query::from(EventType::Tx).and_exists("send_packet.packet_sequence"),
        )
    }

    /// The topics a relayer instance subscribes to.
    pub fn default_topics() -> Vec<HubTopic> {
        vec![
            Self::contract_call_submitted(),
            Self::contract_call_with_token_submitted(),
            Self::evm_event_completed(),
            Self::packet_delivered(),
        ]
    }

    pub fn query_string(&self) -> &str {
        &self.query_string
    }
}

enum ConnectionEnd {
    Cancelled,
    /// Transport failed; `subscribed` reports whether the connection got far
    /// enough to matter for backoff reset.
    Lost { subscribed: bool, reason: String },
}

pub struct HubListener {
    chain_id: String,
    ws_url: String,
    topics: Vec<HubTopic>,
    metrics: Option<Arc<RelayerMetrics>>,
}

impl HubListener {
    pub fn new(chain_id: impl Into<String>, ws_url: impl Into<String>) -> Self {
        Self {
            chain_id: chain_id.into(),
            ws_url: ws_url.into(),
            topics: HubTopic::default_topics(),
            metrics: None,
        }
    }

    pub fn with_topics(mut self, topics: Vec<HubTopic>) -> Self {
        self.topics = topics;
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<RelayerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub async fn run(self, tx: mpsc::Sender<CanonicalEvent>, cancel: CancellationToken) {
        let url: Url = match self.ws_url.parse() {
            Ok(url) => url,
            Err(e) => {
                error!("[{}] Invalid hub websocket url {}: {}", self.chain_id, self.ws_url, e);
                return;
            }
        };

        let mut backoff = ExponentialBackoff {
            max_elapsed_time: None,
            max_interval: Duration::from_secs(60),
            ..Default::default()
        };

        loop {
            if cancel.is_cancelled() {
                break;
            }

            match self.run_connection(&url, &tx, &cancel).await {
                ConnectionEnd::Cancelled => break,
                ConnectionEnd::Lost { subscribed, reason } => {
                    if subscribed {
                        backoff.reset();
                    }
                    let delay = backoff
                        .next_backoff()
                        .unwrap_or_else(|| Duration::from_secs(60));
                    warn!(
                        "[{}] Hub subscription lost ({}); reconnecting in {:?}",
                        self.chain_id, reason, delay
                    );
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(delay) => {}
                    }
                }
            }
        }
        info!("[{}] Hub listener stopped", self.chain_id);
    }

    async fn run_connection(
        &self,
        url: &Url,
        tx: &mpsc::Sender<CanonicalEvent>,
        cancel: &CancellationToken,
    ) -> ConnectionEnd {
        let (client, driver) = match WebSocketClient::new(url.clone()).await {
            Ok(pair) => pair,
            Err(e) => {
                return ConnectionEnd::Lost {
                    subscribed: false,
                    reason: format!("connect failed: {}", e),
                }
            }
        };
        let driver_handle = tokio::spawn(driver.run());

        let mut subscriptions = Vec::with_capacity(self.topics.len());
        for topic in &self.topics {
            debug!("[{}] subscribing to query: {}", self.chain_id, topic.query_string());
            match client.subscribe(topic.query.clone()).await {
                Ok(subscription) => subscriptions.push(subscription),
                Err(e) => {
                    let _ = client.close();
                    let _ = driver_handle.await;
                    return ConnectionEnd::Lost {
                        subscribed: false,
                        reason: format!("subscribe failed: {}", e),
                    };
                }
            }
        }
        info!(
            "[{}] Listening to {} hub event topics",
            self.chain_id,
            self.topics.len()
        );

        let mut stream = select_all(subscriptions);
        let end = loop {
            tokio::select! {
                _ = cancel.cancelled() => break ConnectionEnd::Cancelled,
                next = stream.next() => {
                    match next {
                        Some(Ok(event)) => {
                            let attrs: EventAttrs =
                                event.events.unwrap_or_default().into_iter().collect();
                            self.dispatch(&event.query, &attrs, tx).await;
                            if tx.is_closed() {
                                break ConnectionEnd::Cancelled;
                            }
                        }
                        Some(Err(e)) => {
                            break ConnectionEnd::Lost {
                                subscribed: true,
                                reason: e.to_string(),
                            }
                        }
                        None => {
                            break ConnectionEnd::Lost {
                                subscribed: true,
                                reason: "subscription stream ended".to_string(),
                            }
                        }
                    }
                }
            }
        };

        drop(stream);
        let _ = client.close();
        let _ = driver_handle.await;
        end
    }

    /// Match the message's query against the subscribed topics before
    /// parsing; messages for unknown queries are ignored.
    async fn dispatch(
        &self,
        event_query: &str,
        attrs: &EventAttrs,
        tx: &mpsc::Sender<CanonicalEvent>,
    ) {
        let Some(topic) = self
            .topics
            .iter()
            .find(|t| t.query_string() == event_query)
        else {
            debug!("[{}] message for unsubscribed query: {}", self.chain_id, event_query);
            return;
        };

        debug!("[{}] Received {} event", self.chain_id, topic.kind);
        match parse::parse_hub_event(&self.chain_id, topic.kind, attrs) {
            Ok(events) => {
                for event in events {
                    if let Some(ref m) = self.metrics {
                        m.events_received
                            .with_label_values(&[self.chain_id.as_str(), event.kind.as_str()])
                            .inc();
                    }
                    let _ = tx.send(event).await;
                }
            }
            Err(e) => {
                // Best-effort: a message that does not parse never will
                debug!(
                    "[{}] Failed to parse {} event: {}",
                    self.chain_id, topic.kind, e
                );
                if let Some(ref m) = self.metrics {
                    m.events_dropped.with_label_values(&["parse"]).inc();
                }
            }
        }
    }
}
