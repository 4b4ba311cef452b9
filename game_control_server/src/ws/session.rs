use std::time::{Duration, Instant};

use actix::{fut, prelude::*};
use actix_web_actors::ws;
use invoice_delivery_engine::types::{PlayerId, PoNumber};
use log::*;
use serde_json::Value;

use super::{
    router::{Connect, Disconnect, RegisterSession, RequestInvoice, SendDirect, UpdateGameStatus},
    Outbound,
};
use crate::{
    data_objects::{
        parse_frame, FrameError, GameEventFrame, InboundFrame, RegisterExpectedInvoiceFrame, ServerFrame,
    },
    server::AppContext,
};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(5);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(30);

/// One actor per WebSocket connection on `/game-control`.
///
/// The session is deliberately thin: it parses frames, answers the ones it can answer locally, and hands everything
/// that touches shared state to the router. Until a `register` frame arrives, every player frame is ignored; the
/// admin panel is the exception, since it is a control plane of its own and never registers as a player.
pub struct WsSession {
    conn_id: u64,
    player_id: Option<PlayerId>,
    app: AppContext,
    hb: Instant,
}

impl WsSession {
    pub fn new(app: AppContext) -> Self {
        Self { conn_id: rand::random(), player_id: None, app, hb: Instant::now() }
    }

    fn heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.hb) > CLIENT_TIMEOUT {
                warn!("🎮 Session {} missed its heartbeats. Closing", act.conn_id);
                ctx.stop();
                return;
            }
            ctx.ping(b"");
        });
    }

    fn send_frame(&self, ctx: &mut ws::WebsocketContext<Self>, frame: ServerFrame) {
        match serde_json::to_string(&frame) {
            Ok(text) => ctx.text(text),
            Err(e) => error!("🎮 Could not serialize an outbound frame: {e}"),
        }
    }

    fn dispatch(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match parse_frame(text) {
            Ok(frame) => self.handle_frame(frame, ctx),
            Err(FrameError::Protocol(reason)) => {
                debug!("🎮 Session {} sent an unintelligible frame ({reason}). Dropping it", self.conn_id);
            },
            Err(FrameError::UnknownType(frame_type)) => {
                debug!("🎮 Session {} sent an unrecognised frame type '{frame_type}'. Ignoring", self.conn_id);
            },
            Err(FrameError::Validation { frame_type, reason }) => {
                debug!("🎮 Session {} sent an invalid '{frame_type}' frame: {reason}", self.conn_id);
                if let Some(frame) = validation_response(&frame_type, &reason) {
                    self.send_frame(ctx, frame);
                }
            },
        }
    }

    fn handle_frame(&mut self, frame: InboundFrame, ctx: &mut ws::WebsocketContext<Self>) {
        match frame {
            InboundFrame::Admin(action) => {
                info!("🎮 Admin panel issued '{action:?}' on session {}", self.conn_id);
                self.app
                    .router
                    .do_send(UpdateGameStatus { state: action.to_state(), updated_by: "admin-panel".to_string() });
            },
            InboundFrame::Register(frame) => self.handle_register(frame.user_id, ctx),
            _ if self.player_id.is_none() => {
                debug!("🎮 Session {} sent a frame before registering. Ignoring it", self.conn_id);
            },
            InboundFrame::RegisterExpectedInvoice(frame) => self.handle_register_expected_invoice(frame, ctx),
            InboundFrame::RequestInvoice(frame) => {
                self.app
                    .router
                    .do_send(RequestInvoice { conn_id: self.conn_id, invoice_number: PoNumber::from(frame.invoice_number) });
            },
            InboundFrame::GameEvent(GameEventFrame::GameOver { payload }) => self.forward_game_over(payload),
            InboundFrame::GameEvent(GameEventFrame::StatusChange(state)) => {
                let updated_by =
                    self.player_id.as_ref().map(|p| p.as_str().to_string()).unwrap_or_else(|| "game_event".to_string());
                self.app.router.do_send(UpdateGameStatus { state, updated_by });
            },
            InboundFrame::Order { data } => self.forward_order(data, ctx),
            InboundFrame::SendTo(frame) => {
                self.app.router.do_send(SendDirect {
                    conn_id: self.conn_id,
                    target: PlayerId::from(frame.target_user_id),
                    message: frame.message,
                });
            },
        }
    }

    fn handle_register(&mut self, user_id: String, ctx: &mut ws::WebsocketContext<Self>) {
        let player_id = PlayerId::from(user_id);
        self.player_id = Some(player_id.clone());
        let conn_id = self.conn_id;
        self.app
            .router
            .send(RegisterSession { conn_id, player_id: player_id.clone() })
            .into_actor(self)
            .then(move |res, act, ctx| {
                match res {
                    Ok(status) => {
                        act.send_frame(ctx, ServerFrame::RegisterResponse {
                            status: "success".to_string(),
                            user_id: player_id.as_str().to_string(),
                            message: format!("Registered as {player_id}"),
                        });
                        act.send_frame(ctx, status.frame());
                    },
                    Err(e) => error!("🎮 Session {conn_id} could not register with the router: {e}"),
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn handle_register_expected_invoice(
        &mut self,
        frame: RegisterExpectedInvoiceFrame,
        ctx: &mut ws::WebsocketContext<Self>,
    ) {
        let Some(player) = frame.effective_player().map(|p| p.to_string()) else {
            self.send_frame(ctx, ServerFrame::RegisterExpectedInvoiceResponse {
                status: "error".to_string(),
                invoice_number: frame.invoice_number.clone(),
                player_id: String::new(),
                message: "A playerId (or userId) is required to register an expected invoice".to_string(),
            });
            return;
        };
        let po_number = PoNumber::from(frame.invoice_number.clone());
        self.app.registry.register(po_number.clone(), PlayerId::from(player.clone()), frame.order_data);
        self.send_frame(ctx, ServerFrame::RegisterExpectedInvoiceResponse {
            status: "success".to_string(),
            invoice_number: frame.invoice_number,
            player_id: player.clone(),
            message: format!("Expecting {po_number} for player {player}"),
        });
    }

    /// Game-over payloads are forwarded verbatim; the sink's answer is nobody's business but the sink's.
    fn forward_game_over(&self, payload: Value) {
        let api = self.app.sinks.clone();
        let conn_id = self.conn_id;
        actix::spawn(async move {
            if let Err(e) = api.post_game_over(&payload).await {
                error!("🎮 Could not forward the game-over event from session {conn_id}: {e}");
            }
        });
    }

    fn forward_order(&self, data: Value, ctx: &mut ws::WebsocketContext<Self>) {
        let api = self.app.sinks.clone();
        let customer_name = data.get("customerName").and_then(Value::as_str).map(str::to_string);
        let customer_email = data.get("customerEmail").and_then(Value::as_str).map(str::to_string);
        let item_count = data.get("items").and_then(Value::as_array).map(|items| items.len() as u64);
        ctx.spawn(
            async move {
                match api.process_order(&data).await {
                    Ok(body) => ServerFrame::OrderResponse {
                        status: "success".to_string(),
                        message: body
                            .get("message")
                            .and_then(Value::as_str)
                            .unwrap_or("Order accepted")
                            .to_string(),
                        order_id: body.get("orderId").and_then(order_id_string),
                        customer_name,
                        customer_email,
                        item_count,
                        error: None,
                    },
                    Err(e) => ServerFrame::OrderResponse {
                        status: "error".to_string(),
                        message: "The order could not be processed".to_string(),
                        order_id: None,
                        customer_name: None,
                        customer_email: None,
                        item_count: None,
                        error: Some(e.to_string()),
                    },
                }
            }
            .into_actor(self)
            .map(|frame, act, ctx| act.send_frame(ctx, frame)),
        );
    }
}

/// Order ids come back from the sink as strings or numbers depending on its mood.
fn order_id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// The error response frame for a known frame kind with an invalid body. Fire-and-forget kinds get nothing.
fn validation_response(frame_type: &str, reason: &str) -> Option<ServerFrame> {
    match frame_type {
        "register" => Some(ServerFrame::RegisterResponse {
            status: "error".to_string(),
            user_id: String::new(),
            message: format!("Invalid register frame: {reason}"),
        }),
        "register_expected_invoice" => Some(ServerFrame::RegisterExpectedInvoiceResponse {
            status: "error".to_string(),
            invoice_number: String::new(),
            player_id: String::new(),
            message: format!("Invalid register_expected_invoice frame: {reason}"),
        }),
        "request_invoice" => Some(ServerFrame::InvoiceResponse {
            status: "error".to_string(),
            invoice_number: String::new(),
            message: format!("Invalid request_invoice frame: {reason}"),
        }),
        "order" => Some(ServerFrame::OrderResponse {
            status: "error".to_string(),
            message: format!("Invalid order frame: {reason}"),
            order_id: None,
            customer_name: None,
            customer_email: None,
            item_count: None,
            error: Some(reason.to_string()),
        }),
        "send-to" => Some(ServerFrame::SendResponse {
            status: "error".to_string(),
            target_user_id: String::new(),
            message: format!("Invalid send-to frame: {reason}"),
        }),
        _ => None,
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        debug!("🎮 Session {} opened", self.conn_id);
        self.heartbeat(ctx);
        let conn_id = self.conn_id;
        self.app
            .router
            .send(Connect { conn_id, addr: ctx.address().recipient() })
            .into_actor(self)
            .then(|res, act, ctx| {
                match res {
                    Ok(status) => {
                        // The welcome and current game status go out before any inbound frame is looked at;
                        // `wait` holds the mailbox until both are queued on the socket.
                        act.send_frame(ctx, ServerFrame::welcome());
                        act.send_frame(ctx, status.frame());
                    },
                    Err(e) => {
                        error!("🎮 Session {} could not attach to the router: {e}", act.conn_id);
                        ctx.stop();
                    },
                }
                fut::ready(())
            })
            .wait(ctx);
    }

    fn stopping(&mut self, _ctx: &mut Self::Context) -> Running {
        self.app.router.do_send(Disconnect { conn_id: self.conn_id });
        debug!("🎮 Session {} closed", self.conn_id);
        Running::Stop
    }
}

impl Handler<Outbound> for WsSession {
    type Result = ();

    fn handle(&mut self, msg: Outbound, ctx: &mut Self::Context) -> Self::Result {
        self.send_frame(ctx, msg.0);
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => self.dispatch(text.trim(), ctx),
            Ok(ws::Message::Ping(payload)) => {
                self.hb = Instant::now();
                ctx.pong(&payload);
            },
            Ok(ws::Message::Pong(_)) => {
                self.hb = Instant::now();
            },
            Ok(ws::Message::Binary(_)) => {
                debug!("🎮 Session {} sent a binary frame. This protocol is text-only; ignoring", self.conn_id);
            },
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            },
            Ok(ws::Message::Continuation(_)) => {
                // Frames big enough to fragment have no business on this channel.
                ctx.stop();
            },
            Ok(ws::Message::Nop) => {},
            Err(e) => {
                warn!("🎮 Session {} errored: {e}", self.conn_id);
                ctx.stop();
            },
        }
    }
}
