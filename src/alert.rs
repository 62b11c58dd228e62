// Copyright (c) EVM-Cosmos Relayer Authors
// SPDX-License-Identifier: Apache-2.0

//! Rate-limited operator notifications.
//!
//! Every distinct diagnostic message is deduplicated by content hash with a
//! class-specific cooldown, so repeated reconciliation passes over the same
//! stuck transfer do not spam the channel.

use crate::config::TelegramConfig;
use crate::error::RelayResult;
use crate::metrics::RelayerMetrics;
use async_trait::async_trait;
use ethers::utils::keccak256;
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::{info, warn};

const MAX_SEND_RETRIES: u32 = 3;
const SEND_RETRY_DELAY_SECS: u64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AlertClass {
    Critical,
    Notify,
    Info,
}

impl AlertClass {
    /// Cooldown before the same message is delivered again. Critical
    /// conditions re-fire sooner.
    pub fn snooze_window(&self) -> Duration {
        match self {
            AlertClass::Critical => Duration::from_secs(2 * 60 * 60),
            AlertClass::Notify => Duration::from_secs(6 * 60 * 60),
            AlertClass::Info => Duration::from_secs(24 * 60 * 60),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AlertClass::Critical => "critical",
            AlertClass::Notify => "notify",
            AlertClass::Info => "info",
        }
    }
}

/// Notification delivery capability.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, class: AlertClass, message: &str) -> RelayResult<()>;
}

/// Check-or-set TTL map used for snoozing repeated messages.
struct SnoozeCache {
    entries: RwLock<HashMap<[u8; 32], Instant>>,
}

impl SnoozeCache {
    fn new() -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
        }
    }

    /// Returns `true` if the key is currently snoozed; otherwise snoozes it
    /// for `ttl` and returns `false`.
    async fn check_or_set(&self, key: [u8; 32], ttl: Duration) -> bool {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        if let Some(expiry) = entries.get(&key) {
            if *expiry > now {
                return true;
            }
        }
        entries.insert(key, now + ttl);
        // Expired entries accumulate slowly; prune while we hold the lock
        entries.retain(|_, expiry| *expiry > now);
        false
    }
}

/// Deduplicating front-end over a [`Notifier`].
pub struct AlertDispatcher {
    notifier: Arc<dyn Notifier>,
    snooze: SnoozeCache,
    metrics: Option<Arc<RelayerMetrics>>,
}

impl AlertDispatcher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self {
            notifier,
            snooze: SnoozeCache::new(),
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<RelayerMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Send unless an identical message went out within the class's
    /// cooldown window. Delivery failures are logged, never propagated:
    /// alerting must not break reconciliation.
    pub async fn send(&self, class: AlertClass, message: &str) {
        let key = keccak256(message.as_bytes());
        if self.snooze.check_or_set(key, class.snooze_window()).await {
            info!("alert snoozed: {}", hex::encode(&key[..8]));
            if let Some(ref m) = self.metrics {
                m.alerts_snoozed.inc();
            }
            return;
        }

        if let Err(e) = self.notifier.send(class, message).await {
            warn!("failed to deliver {} alert: {}", class.as_str(), e);
        } else if let Some(ref m) = self.metrics {
            m.alerts_sent.with_label_values(&[class.as_str()]).inc();
        }
    }
}

/// Telegram notification sender
pub struct TelegramNotifier {
    config: TelegramConfig,
    client: reqwest::Client,
    api_base: String,
}

impl TelegramNotifier {
    pub fn new(config: TelegramConfig) -> Self {
        let api_base = format!("https://api.telegram.org/bot{}", config.bot_token);
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .unwrap_or_default();
        Self {
            config,
            client,
            api_base,
        }
    }

    fn format_message(&self, class: AlertClass, message: &str) -> String {
        let marker = match class {
            AlertClass::Critical => "🚨",
            AlertClass::Notify => "⚠️",
            AlertClass::Info => "ℹ️",
        };
        let mut text = format!("<b>[evm-cosmos-relayer]</b> {}\n{}", marker, message);
        if !self.config.notify_users.is_empty() {
            text.push_str(&format!("\ncc: {}", self.config.notify_users.join(" ")));
        }
        text
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, class: AlertClass, message: &str) -> RelayResult<()> {
        if self.config.bot_token.is_empty() || self.config.channel_id.is_empty() {
            info!(
                "Telegram not configured, would send: {}",
                &message[..message.len().min(200)]
            );
            return Ok(());
        }

        let text = self.format_message(class, message);
        for attempt in 0..MAX_SEND_RETRIES {
            match self
                .client
                .post(format!("{}/sendMessage", self.api_base))
                .json(&json!({
                    "chat_id": self.config.channel_id,
                    "text": text,
                    "parse_mode": "HTML",
                    "disable_web_page_preview": true,
                }))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => return Ok(()),
                Ok(resp) => {
                    warn!(
                        "Telegram send attempt {}/{} failed: {}",
                        attempt + 1,
                        MAX_SEND_RETRIES,
                        resp.status()
                    );
                }
                Err(e) => {
                    warn!(
                        "Telegram send attempt {}/{} failed: {:?}",
                        attempt + 1,
                        MAX_SEND_RETRIES,
                        e
                    );
                }
            }

            if attempt < MAX_SEND_RETRIES - 1 {
                tokio::time::sleep(Duration::from_secs(
                    SEND_RETRY_DELAY_SECS * (attempt as u64 + 1),
                ))
                .await;
            }
        }

        warn!(
            "Failed to send Telegram message after {} attempts",
            MAX_SEND_RETRIES
        );
        Ok(())
    }
}
