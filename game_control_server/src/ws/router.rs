use std::collections::HashMap;

use actix::{
    dev::{MessageResponse, OneshotSender},
    prelude::*,
};
use chrono::{DateTime, Utc};
use gig_common::helpers::iso8601;
use invoice_delivery_engine::{
    events::InvoiceReadyEvent,
    types::{PlayerId, PoNumber},
    ExpectedInvoiceRegistry, InvoiceStore,
};
use log::*;
use serde_json::Value;

use super::Outbound;
use crate::data_objects::{GameState, ServerFrame};

// -----------------------------------------    Messages      --------------------------------------------------------

/// A new connection attaching to the router. Answered with the current game status so the session can complete its
/// welcome sequence.
#[derive(Message, Debug)]
#[rtype(result = "GameStatusSnapshot")]
pub struct Connect {
    pub conn_id: u64,
    pub addr: Recipient<Outbound>,
}

#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct Disconnect {
    pub conn_id: u64,
}

/// A `register` frame: binds a player id to a connection. Re-registration moves the binding to the new connection
/// and silently unbinds the old one (which stays connected until it closes on its own).
#[derive(Message, Debug)]
#[rtype(result = "GameStatusSnapshot")]
pub struct RegisterSession {
    pub conn_id: u64,
    pub player_id: PlayerId,
}

/// The polling engine's delivery callback. Resolves the player, sends `invoice_ready`, and reports whether a live
/// session was found. Never retries; a player without a session fetches the invoice on demand later.
#[derive(Message, Debug)]
#[rtype(result = "bool")]
pub struct DeliverInvoice(pub InvoiceReadyEvent);

/// A `request_invoice` frame from a session. The player is resolved through the reverse map, so a session that was
/// displaced by a re-registration can no longer fetch invoices.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct RequestInvoice {
    pub conn_id: u64,
    pub invoice_number: PoNumber,
}

/// A game-status change, from a `game_event` frame or the admin panel. Fanned out to every open session.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct UpdateGameStatus {
    pub state: GameState,
    pub updated_by: String,
}

/// A `send-to` frame: route a direct message to the target player, and acknowledge to the sender.
#[derive(Message, Debug)]
#[rtype(result = "()")]
pub struct SendDirect {
    pub conn_id: u64,
    pub target: PlayerId,
    pub message: Value,
}

// -----------------------------------------   Game status    --------------------------------------------------------

#[derive(Clone, Debug)]
pub struct GameStatusSnapshot {
    pub state: GameState,
    pub last_updated: DateTime<Utc>,
    pub updated_by: String,
}

impl GameStatusSnapshot {
    pub fn frame(&self) -> ServerFrame {
        ServerFrame::GameStatus {
            status: self.state,
            last_updated: iso8601(self.last_updated),
            updated_by: self.updated_by.clone(),
        }
    }
}

impl Default for GameStatusSnapshot {
    fn default() -> Self {
        Self { state: GameState::Start, last_updated: Utc::now(), updated_by: "system".to_string() }
    }
}

impl<A, M> MessageResponse<A, M> for GameStatusSnapshot
where
    A: Actor,
    M: Message<Result = GameStatusSnapshot>,
{
    fn handle(self, _ctx: &mut A::Context, tx: Option<OneshotSender<GameStatusSnapshot>>) {
        if let Some(tx) = tx {
            let _ = tx.send(self);
        }
    }
}

// -----------------------------------------     Router       --------------------------------------------------------

pub struct SessionRouter {
    /// Every open connection, registered or not. Broadcast targets.
    connections: HashMap<u64, Recipient<Outbound>>,
    /// Forward map: player → connection. At most one connection per player.
    players: HashMap<PlayerId, u64>,
    /// Reverse map: connection → player. Kept in lockstep with `players`.
    ids: HashMap<u64, PlayerId>,
    status: GameStatusSnapshot,
    registry: ExpectedInvoiceRegistry,
    store: InvoiceStore,
}

impl SessionRouter {
    pub fn new(registry: ExpectedInvoiceRegistry, store: InvoiceStore) -> Self {
        Self {
            connections: HashMap::new(),
            players: HashMap::new(),
            ids: HashMap::new(),
            status: GameStatusSnapshot::default(),
            registry,
            store,
        }
    }

    fn broadcast(&self, frame: ServerFrame) {
        trace!("🎮 Broadcasting {frame:?} to {} sessions", self.connections.len());
        for recipient in self.connections.values() {
            // A full or closed mailbox is that session's problem; it gets cleaned up on its close event.
            recipient.do_send(Outbound(frame.clone()));
        }
    }

    fn send_to_conn(&self, conn_id: u64, frame: ServerFrame) {
        if let Some(recipient) = self.connections.get(&conn_id) {
            recipient.do_send(Outbound(frame));
        }
    }
}

impl Actor for SessionRouter {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        info!("🎮 Session router started");
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("🎮 Session router stopped");
    }
}

impl Handler<Connect> for SessionRouter {
    type Result = GameStatusSnapshot;

    fn handle(&mut self, msg: Connect, _ctx: &mut Self::Context) -> Self::Result {
        self.connections.insert(msg.conn_id, msg.addr);
        debug!("🎮 Session {} connected. {} sessions open", msg.conn_id, self.connections.len());
        self.status.clone()
    }
}

impl Handler<Disconnect> for SessionRouter {
    type Result = ();

    fn handle(&mut self, msg: Disconnect, _ctx: &mut Self::Context) -> Self::Result {
        self.connections.remove(&msg.conn_id);
        if let Some(player_id) = self.ids.remove(&msg.conn_id) {
            // Only drop the forward entry if it still points at this connection; a re-registration may already
            // have moved the player elsewhere.
            if self.players.get(&player_id) == Some(&msg.conn_id) {
                self.players.remove(&player_id);
                debug!("🎮 Player '{player_id}' went offline");
            }
        }
        debug!("🎮 Session {} closed. {} sessions open", msg.conn_id, self.connections.len());
    }
}

impl Handler<RegisterSession> for SessionRouter {
    type Result = GameStatusSnapshot;

    fn handle(&mut self, msg: RegisterSession, _ctx: &mut Self::Context) -> Self::Result {
        let RegisterSession { conn_id, player_id } = msg;
        if let Some(old_conn) = self.players.insert(player_id.clone(), conn_id) {
            if old_conn != conn_id {
                self.ids.remove(&old_conn);
                debug!("🎮 Player '{player_id}' re-registered. Session {old_conn} is detached but left open");
            }
        }
        if let Some(previous_player) = self.ids.insert(conn_id, player_id.clone()) {
            if previous_player != player_id && self.players.get(&previous_player) == Some(&conn_id) {
                self.players.remove(&previous_player);
            }
        }
        info!("🎮 Player '{player_id}' registered on session {conn_id}. {} players online", self.players.len());
        self.status.clone()
    }
}

impl Handler<DeliverInvoice> for SessionRouter {
    type Result = bool;

    fn handle(&mut self, msg: DeliverInvoice, _ctx: &mut Self::Context) -> Self::Result {
        let record = msg.0.record;
        let po_number = record.invoice_number.clone();
        // The record's own binding wins; the registry is the fallback for records persisted before player context
        // was written to disk.
        let player_id = record
            .player_id
            .clone()
            .or_else(|| self.registry.lookup(&po_number).map(|entry| entry.player_id));
        let Some(player_id) = player_id else {
            warn!("🎮 No player is bound to {po_number}; cannot deliver");
            return false;
        };
        let Some(recipient) = self.players.get(&player_id).and_then(|conn| self.connections.get(conn)) else {
            info!("🎮 Player '{player_id}' has no live session. Invoice {po_number} awaits an explicit request");
            return false;
        };
        recipient.do_send(Outbound(ServerFrame::invoice_ready(&record)));
        info!("🎮 invoice_ready for {po_number} sent to player '{player_id}'");
        true
    }
}

impl Handler<RequestInvoice> for SessionRouter {
    type Result = ResponseFuture<()>;

    fn handle(&mut self, msg: RequestInvoice, _ctx: &mut Self::Context) -> Self::Result {
        let RequestInvoice { conn_id, invoice_number } = msg;
        let Some(recipient) = self.connections.get(&conn_id).cloned() else {
            return Box::pin(async {});
        };
        let Some(player_id) = self.ids.get(&conn_id).cloned() else {
            debug!("🎮 Session {conn_id} requested {invoice_number} without being registered. Ignoring");
            return Box::pin(async {});
        };
        let store = self.store.clone();
        let registry = self.registry.clone();
        Box::pin(async move {
            match store.get(&invoice_number).await {
                Ok(record) => {
                    // The registration usually died when the invoice was delivered, so fall back through the
                    // player's other registrations and finally the record itself.
                    let summary = registry
                        .lookup(&invoice_number)
                        .and_then(|entry| entry.order_data.summary)
                        .or_else(|| registry.find_by_player(&player_id).and_then(|entry| entry.order_data.summary))
                        .or_else(|| record.summary.clone());
                    debug!("🎮 Sending invoice_pdf for {invoice_number} to player '{player_id}'");
                    recipient.do_send(Outbound(ServerFrame::invoice_pdf(&record, summary)));
                },
                Err(e) => {
                    debug!("🎮 Player '{player_id}' requested {invoice_number}, which is not retrievable: {e}");
                    recipient.do_send(Outbound(ServerFrame::invoice_not_found(invoice_number.as_str())));
                },
            }
        })
    }
}

impl Handler<UpdateGameStatus> for SessionRouter {
    type Result = ();

    fn handle(&mut self, msg: UpdateGameStatus, _ctx: &mut Self::Context) -> Self::Result {
        info!("🎮 Game status set to '{}' by {}", msg.state, msg.updated_by);
        self.status = GameStatusSnapshot { state: msg.state, last_updated: Utc::now(), updated_by: msg.updated_by };
        self.broadcast(self.status.frame());
    }
}

impl Handler<SendDirect> for SessionRouter {
    type Result = ();

    fn handle(&mut self, msg: SendDirect, _ctx: &mut Self::Context) -> Self::Result {
        let SendDirect { conn_id, target, message } = msg;
        let Some(sender) = self.ids.get(&conn_id).cloned() else {
            debug!("🎮 Session {conn_id} tried to send a direct message without being registered. Ignoring");
            return;
        };
        let target_recipient = self.players.get(&target).and_then(|conn| self.connections.get(conn));
        match target_recipient {
            Some(recipient) => {
                recipient.do_send(Outbound(ServerFrame::DirectMessage {
                    from_user_id: sender.as_str().to_string(),
                    message,
                }));
                self.send_to_conn(conn_id, ServerFrame::SendResponse {
                    status: "success".to_string(),
                    target_user_id: target.as_str().to_string(),
                    message: format!("Message delivered to {target}"),
                });
            },
            None => {
                self.send_to_conn(conn_id, ServerFrame::SendResponse {
                    status: "error".to_string(),
                    target_user_id: target.as_str().to_string(),
                    message: format!("{target} is not online"),
                });
            },
        }
    }
}
