//! # Game-control channel client
//!
//! The inter-service WebSocket client sibling services (most importantly the REST order surface) use to reach the
//! game control server. The connection is supervised: it reconnects with capped exponential back-off, queues
//! outbound frames while disconnected and flushes them on connect, and keeps the link honest with heartbeat pings.
//! Two missed pongs force a reconnect.
//!
//! Consumers subscribe to the connection's lifecycle at construction time by handing over a channel; every state
//! change and inbound frame arrives as a [`ChannelEvent`].
mod client;

pub use client::{ChannelEvent, ClientConfig, ControlChannel};
