//! Lifecycle hooks for the invoice delivery engine.
//!
//! Consumers subscribe at construction time by installing async callbacks on a [`DeliveryHooks`] value, which the
//! polling engine carries for its whole life. The delivery hook is the bridge to the WebSocket tier: it is awaited
//! inline so the engine observes whether a live session actually received the notification.
use std::{future::Future, pin::Pin, sync::Arc};

use crate::types::{ExpectedInvoice, InvoiceRecord};

/// An async callback of one argument. The boxed-future shape lets hooks be stored in plain structs and cloned
/// freely across the engine's tasks.
pub type Hook<E, R> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = R> + Send>> + Send + Sync>;

/// Notification that a processed invoice is ready for its player. Returns `true` if a live session received the
/// `invoice_ready` frame, `false` otherwise. The return value is advisory: the record is already on disk either
/// way, and the player can always retrieve it on demand.
pub type DeliveryHook = Hook<InvoiceReadyEvent, bool>;

/// Fired when a registration is expired by a finite retry budget without its artifact ever appearing.
pub type ExpiryHook = Hook<ExpectedInvoice, ()>;

#[derive(Clone, Debug)]
pub struct InvoiceReadyEvent {
    pub record: InvoiceRecord,
    /// True when the record already existed on disk and this is a re-notification rather than first processing.
    pub renotified: bool,
}

/// The set of callbacks a consumer installs on the polling engine. Use the builder-style setters:
///
/// ```no_run
/// # use invoice_delivery_engine::events::DeliveryHooks;
/// let mut hooks = DeliveryHooks::default();
/// hooks
///     .on_invoice_ready(|event| Box::pin(async move { println!("{} ready", event.record.invoice_number); true }))
///     .on_registration_expired(|entry| Box::pin(async move { println!("{} expired", entry.po_number) }));
/// ```
#[derive(Clone, Default)]
pub struct DeliveryHooks {
    pub on_invoice_ready: Option<DeliveryHook>,
    pub on_registration_expired: Option<ExpiryHook>,
}

impl DeliveryHooks {
    pub fn on_invoice_ready<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(InvoiceReadyEvent) -> Pin<Box<dyn Future<Output = bool> + Send>>) + Send + Sync + 'static {
        self.on_invoice_ready = Some(Arc::new(f));
        self
    }

    pub fn on_registration_expired<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ExpectedInvoice) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_registration_expired = Some(Arc::new(f));
        self
    }
}
