use std::{collections::VecDeque, time::Duration};

use actix::{io::SinkWrite, prelude::*};
use actix_codec::Framed;
use anyhow::{anyhow, Result};
use awc::{
    error::WsProtocolError,
    ws::{Codec, Frame, Message},
    BoxedSocket, Client,
};
use bytes::Bytes;
use futures::stream::{SplitSink, StreamExt};
use log::*;
use serde_json::{json, Value};
use tokio::sync::mpsc::UnboundedSender;

/// Connection settings for the game-control channel.
#[derive(Clone, Debug)]
pub struct ClientConfig {
    /// Full WebSocket URL, e.g. `ws://127.0.0.1:8330/game-control`.
    pub url: String,
    /// When set, a `register` frame for this id is sent first thing on every (re)connect, so the gateway always
    /// knows who this service is before any queued traffic is flushed.
    pub service_id: Option<String>,
    pub heartbeat_interval: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl ClientConfig {
    pub fn new<S: Into<String>>(url: S) -> Self {
        Self {
            url: url.into(),
            service_id: None,
            heartbeat_interval: Duration::from_secs(10),
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
        }
    }
}

/// Lifecycle and traffic events, delivered on the channel handed to [`ControlChannel::connect`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ChannelEvent {
    Connected,
    Disconnected,
    /// One inbound text frame, verbatim.
    Frame(String),
}

/// Cloneable handle to the supervised connection. Sends never block: frames written while the link is down are
/// queued and flushed, in order, once it comes back.
#[derive(Clone)]
pub struct ControlChannel {
    addr: Addr<ControlChannelClient>,
}

impl ControlChannel {
    /// Starts the client actor and begins connecting immediately. Must be called from within an actix system.
    pub fn connect(config: ClientConfig, events: UnboundedSender<ChannelEvent>) -> Self {
        let addr = ControlChannelClient::new(config, events).start();
        Self { addr }
    }

    pub fn send_frame(&self, frame: Value) -> Result<()> {
        self.addr.try_send(SendFrame(frame)).map_err(|e| anyhow!("The channel actor is gone: {e}"))
    }

    pub fn register(&self, user_id: &str) -> Result<()> {
        self.send_frame(register_frame(user_id))
    }

    /// Announces a PO number to the gateway so the invoice watcher starts looking for its artifact.
    pub fn register_expected_invoice(&self, invoice_number: &str, player_id: &str, order_data: Value) -> Result<()> {
        self.send_frame(expected_invoice_frame(invoice_number, player_id, order_data))
    }

    pub fn request_invoice(&self, invoice_number: &str) -> Result<()> {
        self.send_frame(json!({ "type": "request_invoice", "invoiceNumber": invoice_number }))
    }
}

fn register_frame(user_id: &str) -> Value {
    json!({ "type": "register", "userId": user_id })
}

fn expected_invoice_frame(invoice_number: &str, player_id: &str, order_data: Value) -> Value {
    json!({
        "type": "register_expected_invoice",
        "invoiceNumber": invoice_number,
        "playerId": player_id,
        "orderData": order_data,
    })
}

fn next_backoff(current: Duration, max: Duration) -> Duration {
    (current * 2).min(max)
}

// -----------------------------------------      Actor       --------------------------------------------------------

#[derive(Message)]
#[rtype(result = "()")]
struct SendFrame(Value);

type WsWriter = SinkWrite<Message, SplitSink<Framed<BoxedSocket, Codec>, Message>>;

struct ControlChannelClient {
    config: ClientConfig,
    events: UnboundedSender<ChannelEvent>,
    writer: Option<WsWriter>,
    reader: Option<SpawnHandle>,
    queue: VecDeque<String>,
    backoff: Duration,
    awaiting_pongs: u32,
}

impl ControlChannelClient {
    fn new(config: ClientConfig, events: UnboundedSender<ChannelEvent>) -> Self {
        let backoff = config.initial_backoff;
        Self { config, events, writer: None, reader: None, queue: VecDeque::new(), backoff, awaiting_pongs: 0 }
    }

    fn connect(&mut self, ctx: &mut Context<Self>) {
        let url = self.config.url.clone();
        info!("🔌 Connecting to {url}");
        Client::new()
            .ws(url.as_str())
            .connect()
            .into_actor(self)
            .map(|res, act, ctx| match res {
                Ok((response, framed)) => {
                    debug!("🔌 Connected to {} ({})", act.config.url, response.status());
                    let (sink, stream) = framed.split();
                    act.reader = Some(ctx.add_stream(stream));
                    act.writer = Some(SinkWrite::new(sink, ctx));
                    act.backoff = act.config.initial_backoff;
                    act.awaiting_pongs = 0;
                    let _ = act.events.send(ChannelEvent::Connected);
                    if let Some(service_id) = act.config.service_id.clone() {
                        act.write_text(register_frame(&service_id).to_string());
                    }
                    act.flush_queue();
                },
                Err(e) => {
                    warn!("🔌 Connection to {} failed: {e}", act.config.url);
                    act.schedule_reconnect(ctx);
                },
            })
            .wait(ctx);
    }

    fn teardown(&mut self, ctx: &mut Context<Self>) {
        if let Some(mut writer) = self.writer.take() {
            writer.close();
        }
        if let Some(handle) = self.reader.take() {
            ctx.cancel_future(handle);
        }
        self.awaiting_pongs = 0;
        let _ = self.events.send(ChannelEvent::Disconnected);
    }

    fn schedule_reconnect(&mut self, ctx: &mut Context<Self>) {
        let delay = self.backoff;
        self.backoff = next_backoff(self.backoff, self.config.max_backoff);
        debug!("🔌 Reconnecting in {delay:?}");
        ctx.run_later(delay, |act, ctx| act.connect(ctx));
    }

    fn write_text(&mut self, text: String) {
        match self.writer.as_mut() {
            Some(writer) => {
                if let Err(Message::Text(rejected)) = writer.write(Message::Text(text.into())) {
                    // The sink is closing under us; hold the frame for the next connection.
                    self.queue.push_back(rejected.to_string());
                }
            },
            None => {
                trace!("🔌 Channel is down; queueing the frame ({} waiting)", self.queue.len() + 1);
                self.queue.push_back(text);
            },
        }
    }

    fn flush_queue(&mut self) {
        if self.queue.is_empty() {
            return;
        }
        info!("🔌 Flushing {} queued frames", self.queue.len());
        // Drain a snapshot: anything rejected mid-flush lands back on the queue for the next connection.
        let pending: Vec<String> = self.queue.drain(..).collect();
        for text in pending {
            self.write_text(text);
        }
    }

    fn heartbeat(&self, ctx: &mut Context<Self>) {
        ctx.run_interval(self.config.heartbeat_interval, |act, ctx| {
            if act.writer.is_none() {
                return;
            }
            if act.awaiting_pongs >= 2 {
                warn!("🔌 Two heartbeats went unanswered. Forcing a reconnect");
                act.teardown(ctx);
                act.schedule_reconnect(ctx);
                return;
            }
            act.awaiting_pongs += 1;
            if let Some(writer) = act.writer.as_mut() {
                let _ = writer.write(Message::Ping(Bytes::from_static(b"")));
            }
        });
    }
}

impl Actor for ControlChannelClient {
    type Context = Context<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        self.heartbeat(ctx);
        self.connect(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        info!("🔌 Control channel client stopped");
    }
}

impl Handler<SendFrame> for ControlChannelClient {
    type Result = ();

    fn handle(&mut self, msg: SendFrame, _ctx: &mut Self::Context) -> Self::Result {
        self.write_text(msg.0.to_string());
    }
}

impl StreamHandler<Result<Frame, WsProtocolError>> for ControlChannelClient {
    fn handle(&mut self, msg: Result<Frame, WsProtocolError>, _ctx: &mut Self::Context) {
        match msg {
            Ok(Frame::Text(payload)) => match String::from_utf8(payload.to_vec()) {
                Ok(text) => {
                    trace!("🔌 Inbound frame: {text}");
                    let _ = self.events.send(ChannelEvent::Frame(text));
                },
                Err(e) => warn!("🔌 Dropping a non-UTF-8 text frame: {e}"),
            },
            Ok(Frame::Ping(payload)) => {
                if let Some(writer) = self.writer.as_mut() {
                    let _ = writer.write(Message::Pong(payload));
                }
            },
            Ok(Frame::Pong(_)) => {
                self.awaiting_pongs = 0;
            },
            Ok(Frame::Close(reason)) => {
                info!("🔌 Server closed the channel: {reason:?}");
            },
            Ok(_) => {},
            Err(e) => {
                warn!("🔌 Protocol error on the channel: {e}");
            },
        }
    }

    /// The read side ended: the connection is gone, however it died.
    fn finished(&mut self, ctx: &mut Self::Context) {
        warn!("🔌 Connection to {} lost", self.config.url);
        self.teardown(ctx);
        self.schedule_reconnect(ctx);
    }
}

impl actix::io::WriteHandler<WsProtocolError> for ControlChannelClient {
    fn error(&mut self, err: WsProtocolError, _ctx: &mut Self::Context) -> Running {
        warn!("🔌 Write error on the channel: {err}");
        Running::Continue
    }
}
