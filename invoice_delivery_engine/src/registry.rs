//! # Expected-invoice registry
//!
//! The in-memory map of PO numbers the system is waiting on. The order flow admits entries (via the session router's
//! `register_expected_invoice` handler); the polling engine drains them. For any PO number at most one entry exists
//! at a time; re-registering replaces the prior entry, last write wins.
//!
//! All operations take a single mutex and hold it only for map manipulation. No I/O happens under the lock.
use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard},
};

use log::*;

use crate::types::{ExpectedInvoice, OrderData, PlayerId, PoNumber};

#[derive(Clone, Default)]
pub struct ExpectedInvoiceRegistry {
    entries: Arc<Mutex<HashMap<PoNumber, ExpectedInvoice>>>,
}

impl ExpectedInvoiceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> Option<MutexGuard<'_, HashMap<PoNumber, ExpectedInvoice>>> {
        match self.entries.lock() {
            Ok(guard) => Some(guard),
            Err(e) => {
                error!("📋 Error getting lock on the expected-invoice map: {e}");
                None
            },
        }
    }

    /// Unconditional upsert. A replaced entry is logged, since it usually means the order flow re-announced a PO
    /// under a different player.
    pub fn register(&self, po_number: PoNumber, player_id: PlayerId, order_data: OrderData) {
        let Some(mut entries) = self.lock() else { return };
        let entry = ExpectedInvoice::new(po_number.clone(), player_id.clone(), order_data);
        if let Some(old) = entries.insert(po_number.clone(), entry) {
            warn!("📋 {po_number} was re-registered. Delivery now goes to '{player_id}' instead of '{}'", old.player_id);
        } else {
            debug!("📋 {po_number} registered for player '{player_id}'. {} invoices now expected", entries.len());
        }
    }

    pub fn lookup(&self, po_number: &PoNumber) -> Option<ExpectedInvoice> {
        self.lock()?.get(po_number).cloned()
    }

    /// Atomic read-and-delete. Once consumed, an entry is gone for good; the on-disk record carries everything the
    /// retrieval path still needs.
    pub fn consume(&self, po_number: &PoNumber) -> Option<ExpectedInvoice> {
        let entry = self.lock()?.remove(po_number);
        if entry.is_some() {
            debug!("📋 {po_number} consumed from the registry");
        }
        entry
    }

    /// Best-effort linear scan, used only when a processed record carries no direct PO → player binding.
    pub fn find_by_player(&self, player_id: &PlayerId) -> Option<ExpectedInvoice> {
        self.lock()?.values().find(|e| &e.player_id == player_id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bumps the miss counter on every remaining entry and removes those that have now gone `max_attempts` completed
    /// scans without their artifact appearing. The polling engine calls this once per completed scan, and only when
    /// running with a finite retry budget.
    pub fn sweep_unmatched(&self, max_attempts: u32) -> Vec<ExpectedInvoice> {
        let Some(mut entries) = self.lock() else { return Vec::new() };
        for entry in entries.values_mut() {
            entry.attempts += 1;
        }
        let expired: Vec<PoNumber> =
            entries.values().filter(|e| e.attempts >= max_attempts).map(|e| e.po_number.clone()).collect();
        expired.iter().filter_map(|po| entries.remove(po)).collect()
    }
}
