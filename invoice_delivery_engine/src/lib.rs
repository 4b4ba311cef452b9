//! Invoice Delivery Engine
//!
//! The invoice delivery engine is the core of the Game Invoice Gateway. Players place orders; each order produces a
//! purchase-order (PO) number which is announced to the engine as an *expected invoice*. The engine then watches an
//! object store for a matching PDF artifact, persists it locally, and notifies the player's live session through a
//! delivery hook.
//!
//! The library is divided into four co-operating subsystems:
//! 1. The [`gateway`] module: a thin adapter over an S3-compatible object store. The production backend is
//!    [`gateway::S3Gateway`]; an in-memory backend is provided for tests and local development.
//! 2. The [`store`] module: the durable, one-file-per-invoice ledger on the local filesystem. A record's existence on
//!    disk is the authoritative "already processed" signal, mirrored by an in-memory dedup cache.
//! 3. The [`registry`] module: the in-memory map of expected invoices, admitted by the order flow and drained by the
//!    polling engine. The registry is the authority on which PO numbers this system cares about; the polling engine
//!    never touches unsolicited objects.
//! 4. The [`poller`] module: the periodic scan that ties the other three together and drives one-shot processing of
//!    each invoice artifact.
//!
//! Consumers react to engine activity by installing hooks at construction time (see [`events`]). The delivery hook is
//! how the WebSocket tier learns that an invoice is ready for a player.
pub mod events;
pub mod gateway;
pub mod helpers;
pub mod poller;
pub mod registry;
pub mod store;
pub mod types;

pub use poller::{PollerConfig, PollingEngine, TickSummary};
pub use registry::ExpectedInvoiceRegistry;
pub use store::{InvoiceStore, StorageError};
