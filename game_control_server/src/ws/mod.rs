//! # Session router & delivery
//!
//! Two co-operating actors make up the WebSocket tier:
//!
//! ## WsSession
//! One [`session::WsSession`] actor per connection. It parses inbound frames, enforces the
//! register-before-anything-else rule, and writes outbound frames to its socket. Sessions never talk to each other
//! directly.
//!
//! ## SessionRouter
//! A single [`router::SessionRouter`] actor owning the player ↔ session maps and the game status. Because both maps
//! and the status live inside one actor, they change under a single serialized mailbox and can never diverge; the
//! actor boundary plays the role a mutex would. Broadcasts snapshot the recipients and push frames onto session
//! mailboxes; the router never blocks on a socket.
pub mod router;
pub mod session;

use actix::prelude::*;
pub use router::SessionRouter;
pub use session::WsSession;

use crate::data_objects::ServerFrame;

/// A frame on its way out to one session's socket.
#[derive(Message, Debug, Clone)]
#[rtype(result = "()")]
pub struct Outbound(pub ServerFrame);
