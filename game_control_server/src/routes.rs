//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go into a separate
//! module. Keep this module neat and tidy 🙏
use actix_web::{get, web, HttpRequest, HttpResponse, Responder};
use actix_web_actors::ws;
use log::*;

use crate::{server::AppContext, ws::WsSession};

#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻 Received health check request");
    HttpResponse::Ok().body("👍\n")
}

/// Upgrades a connection into a [`WsSession`] actor on the game-control channel.
pub async fn game_control(
    req: HttpRequest,
    stream: web::Payload,
    app: web::Data<AppContext>,
) -> Result<HttpResponse, actix_web::Error> {
    let peer = req.peer_addr().map(|a| a.to_string()).unwrap_or_else(|| "unknown".to_string());
    debug!("💻 New game-control connection from {peer}");
    ws::start(WsSession::new(app.get_ref().clone()), &req, stream)
}
