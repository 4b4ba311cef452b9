//! # Game control server
//!
//! The WebSocket tier of the Game Invoice Gateway. It is responsible for:
//! * accepting player sessions on `/game-control` and indexing them by player id,
//! * admitting expected-invoice registrations arriving over the inter-service channel,
//! * delivering `invoice_ready` notifications when the polling engine processes an artifact,
//! * serving `invoice_pdf` payloads on demand,
//! * fanning out game-status changes, and forwarding orders and game-over events to the external HTTP sinks.
//!
//! ## Configuration
//! The server is configured via `GIG_*` environment variables. See [config](config/index.html) for the full list.
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod integrations;
pub mod routes;
pub mod server;
pub mod ws;
