//! # Polling engine
//!
//! The periodic scan that turns expected invoices into processed ones. Every tick lists the bucket, matches
//! filenames against the PO numbers currently in the registry, fetches and persists anything new, and notifies the
//! player through the delivery hook. Filename extraction is advisory; the registry is the authority, and the engine
//! never fetches an object nobody asked for.
//!
//! Ticks are single-flight by construction: the loop awaits the current scan before the timer is polled again, and a
//! timer tick that fires while a scan is still running is dropped rather than queued. Emptiness of the registry
//! gates a tick (nothing is expected, so nothing is listed) but never stops the loop.
use std::{sync::Arc, time::Duration};

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use chrono::Utc;
use gig_common::helpers::{elide, iso8601};
use log::*;
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{interval, MissedTickBehavior},
};

use crate::{
    events::{DeliveryHooks, InvoiceReadyEvent},
    gateway::{GatewayError, ObjectStoreGateway},
    helpers::{extract_po_number, looks_like_invoice},
    registry::ExpectedInvoiceRegistry,
    store::InvoiceStore,
    types::{ExpectedInvoice, InvoiceRecord, MaxRetries, ObjectMeta, PoNumber, S3Metadata},
};

/// Configuration for the polling engine.
#[derive(Clone, Debug)]
pub struct PollerConfig {
    pub poll_interval: Duration,
    pub max_retries: MaxRetries,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self { poll_interval: Duration::from_millis(10_000), max_retries: MaxRetries::Unlimited }
    }
}

/// What one tick accomplished. Only used for logging and tests.
#[derive(Clone, Debug, Default)]
pub struct TickSummary {
    pub listed: usize,
    pub processed: Vec<PoNumber>,
    pub renotified: Vec<PoNumber>,
    pub expired: Vec<PoNumber>,
}

impl TickSummary {
    pub fn total_matched(&self) -> usize {
        self.processed.len() + self.renotified.len()
    }
}

pub struct PollingEngine {
    gateway: Arc<dyn ObjectStoreGateway>,
    store: InvoiceStore,
    registry: ExpectedInvoiceRegistry,
    hooks: DeliveryHooks,
    config: PollerConfig,
}

impl PollingEngine {
    pub fn new(
        gateway: Arc<dyn ObjectStoreGateway>,
        store: InvoiceStore,
        registry: ExpectedInvoiceRegistry,
        hooks: DeliveryHooks,
        config: PollerConfig,
    ) -> Self {
        Self { gateway, store, registry, hooks, config }
    }

    /// Starts the polling loop. Do not await the returned JoinHandle directly; it runs until `shutdown` flips to
    /// `true`, at which point an in-flight scan completes and no new one is scheduled.
    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut timer = interval(self.config.poll_interval);
            // A tick that comes due while a scan is still running is dropped, not queued.
            timer.set_missed_tick_behavior(MissedTickBehavior::Skip);
            info!(
                "📡 Invoice polling engine started. Scanning bucket '{}' every {:?} (retry budget: {})",
                self.gateway.bucket(),
                self.config.poll_interval,
                self.config.max_retries
            );
            loop {
                tokio::select! {
                    _ = timer.tick() => {
                        match self.run_tick().await {
                            Ok(summary) if summary.total_matched() > 0 || !summary.expired.is_empty() => {
                                info!(
                                    "📡 Scan complete: {} objects listed, {} processed, {} re-notified, {} expired",
                                    summary.listed,
                                    summary.processed.len(),
                                    summary.renotified.len(),
                                    summary.expired.len()
                                );
                            },
                            Ok(summary) => trace!("📡 Scan complete: {} objects listed, nothing to do", summary.listed),
                            Err(e) => warn!("📡 Scan failed ({e}). Retrying on the next tick"),
                        }
                    },
                    _ = shutdown.changed() => {
                        if *shutdown.borrow() {
                            break;
                        }
                    },
                }
            }
            info!("📡 Invoice polling engine stopped");
        })
    }

    /// One full scan. Public so tests (and administrative tooling) can drive the engine without the timer.
    pub async fn run_tick(&self) -> Result<TickSummary, GatewayError> {
        let mut summary = TickSummary::default();
        if self.registry.is_empty() {
            trace!("📡 No invoices are expected; skipping the scan");
            return Ok(summary);
        }
        let objects = self.gateway.list_objects().await?;
        summary.listed = objects.len();
        for object in &objects {
            let filename = object_basename(&object.key);
            if !looks_like_invoice(filename) {
                continue;
            }
            let Some(po_number) = extract_po_number(filename) else { continue };
            // Strict expected-only rule: an unregistered PO is not an invoice for this system, no matter how
            // promising the filename looks.
            let Some(entry) = self.registry.lookup(&po_number) else {
                trace!("📡 '{}' matches {po_number}, which nobody is expecting. Skipping", object.key);
                continue;
            };
            if self.store.has(&po_number) {
                if self.renotify(&po_number).await {
                    summary.renotified.push(po_number);
                }
            } else if self.process_object(object, entry).await {
                summary.processed.push(po_number);
            }
        }
        if let MaxRetries::Finite(max) = self.config.max_retries {
            // Only completed scans count against the retry budget; a failed listing returned early above.
            for entry in self.registry.sweep_unmatched(max) {
                warn!(
                    "📡 {} expired after {} scans without an artifact. Player '{}' will not be notified",
                    entry.po_number, entry.attempts, entry.player_id
                );
                summary.expired.push(entry.po_number.clone());
                if let Some(hook) = &self.hooks.on_registration_expired {
                    hook(entry).await;
                }
            }
        }
        Ok(summary)
    }

    /// The record already exists on disk (written by a prior run or process). Notify the player from the stored
    /// record and retire the registration. No fetch happens.
    async fn renotify(&self, po_number: &PoNumber) -> bool {
        let record = match self.store.get(po_number).await {
            Ok(record) => record,
            Err(e) => {
                error!("📡 {po_number} is marked processed but its record would not load ({e}). Retrying next tick");
                return false;
            },
        };
        debug!("📡 {po_number} was already processed. Re-notifying and retiring the registration");
        let delivered = self.deliver(InvoiceReadyEvent { record, renotified: true }).await;
        if !delivered {
            warn!("📡 Re-notification for {po_number} found no live session. The player can still request the PDF");
        }
        self.registry.consume(po_number);
        true
    }

    /// First sighting of this PO's artifact: fetch, persist, notify, consume. Fetch and persistence failures leave
    /// the registration in place so the next tick retries; a failed delivery does not, because the record is
    /// already on disk and retrieval is player-initiated from here on.
    async fn process_object(&self, object: &ObjectMeta, entry: ExpectedInvoice) -> bool {
        let po_number = entry.po_number.clone();
        let bytes = match self.gateway.fetch_object(&object.key).await {
            Ok(bytes) => bytes,
            Err(GatewayError::NotFound(_)) => {
                debug!("📡 '{}' vanished between listing and fetch. {po_number} stays registered", object.key);
                return false;
            },
            Err(e) => {
                warn!("📡 Could not fetch '{}' ({e}). {po_number} stays registered", object.key);
                return false;
            },
        };
        let base64_data = BASE64.encode(&bytes);
        trace!("📡 '{}' encoded for {po_number}: {}", object.key, elide(&base64_data, 40));
        let record = InvoiceRecord {
            invoice_number: po_number.clone(),
            player_id: Some(entry.player_id.clone()),
            base64_data,
            filename: object_basename(&object.key).to_string(),
            file_size: bytes.len() as u64,
            processed_at: Utc::now(),
            s3_metadata: S3Metadata {
                s3_key: object.key.clone(),
                s3_size: object.size,
                s3_last_modified: object.last_modified.map(iso8601),
            },
            summary: entry.order_data.summary.clone(),
            saved_at: None,
            file_path: None,
        };
        let stored = match self.store.put(&record).await {
            Ok(stored) => stored,
            Err(e) => {
                error!("📡 Could not persist the record for {po_number} ({e}). Retrying next tick");
                return false;
            },
        };
        info!("📡 Invoice {po_number} processed: '{}' ({} bytes) for player '{}'", object.key, stored.file_size, entry.player_id);
        let delivered = self.deliver(InvoiceReadyEvent { record: stored, renotified: false }).await;
        if !delivered {
            warn!("📡 No live session received the notification for {po_number}. Retrieval is on demand now");
        }
        self.registry.consume(&po_number);
        true
    }

    async fn deliver(&self, event: InvoiceReadyEvent) -> bool {
        match &self.hooks.on_invoice_ready {
            Some(hook) => hook(event).await,
            None => {
                warn!("📡 No delivery hook is installed; invoice notifications go nowhere");
                false
            },
        }
    }
}

fn object_basename(key: &str) -> &str {
    key.rsplit('/').next().unwrap_or(key)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn basename_strips_key_prefixes() {
        assert_eq!(object_basename("invoice_1030.pdf"), "invoice_1030.pdf");
        assert_eq!(object_basename("2024/may/invoice_1030.pdf"), "invoice_1030.pdf");
        assert_eq!(object_basename(""), "");
    }
}
