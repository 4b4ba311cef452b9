use std::{sync::Arc, time::Duration};

use actix::{Actor, Addr};
use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use invoice_delivery_engine::{
    events::DeliveryHooks,
    gateway::{FilesystemGateway, ObjectStoreGateway, S3Gateway},
    ExpectedInvoiceRegistry, InvoiceStore, PollerConfig, PollingEngine,
};
use log::*;
use tokio::sync::watch;

use crate::{
    config::ServerConfig,
    errors::ServerError,
    integrations::SinkApi,
    routes,
    ws::{
        router::{DeliverInvoice, SessionRouter},
    },
};

/// Everything a request handler or session actor needs, constructed once at process init and injected through
/// actix's app data. The invoice store is deliberately absent: sessions read invoices through the router, which
/// owns the only retrieval path.
#[derive(Clone)]
pub struct AppContext {
    pub router: Addr<SessionRouter>,
    pub registry: ExpectedInvoiceRegistry,
    pub sinks: Arc<SinkApi>,
}

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let store = InvoiceStore::new(&config.storage_dir)
        .await
        .map_err(|e| ServerError::InitializeError(format!("Could not open the invoice store: {e}")))?;
    let registry = ExpectedInvoiceRegistry::new();

    let gateway: Arc<dyn ObjectStoreGateway> = match &config.local_bucket_dir {
        Some(dir) => {
            info!("🚀️ Using the local directory {} as the invoice bucket", dir.display());
            Arc::new(
                FilesystemGateway::new(dir)
                    .await
                    .map_err(|e| ServerError::InitializeError(e.to_string()))?,
            )
        },
        None => Arc::new(S3Gateway::connect(config.object_store.clone()).await),
    };
    match gateway.check_connectivity().await {
        Ok(()) => info!("🚀️ Object store bucket '{}' is reachable", gateway.bucket()),
        Err(e) if config.max_retries.is_finite() => {
            return Err(ServerError::InitializeError(format!(
                "{e}. Refusing to start with a finite retry budget (GIG_MAX_RETRIES={})",
                config.max_retries
            )));
        },
        Err(e) => warn!("🚀️ {e}. Starting anyway; the polling engine retries every tick"),
    }

    let sinks =
        Arc::new(SinkApi::new(config.sinks.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?);
    let router = SessionRouter::new(registry.clone(), store.clone()).start();

    let mut hooks = DeliveryHooks::default();
    let delivery_router = router.clone();
    hooks.on_invoice_ready(move |event| {
        let router = delivery_router.clone();
        Box::pin(async move {
            match router.send(DeliverInvoice(event)).await {
                Ok(delivered) => delivered,
                Err(e) => {
                    error!("🎮 The delivery callback could not reach the session router: {e}");
                    false
                },
            }
        })
    });
    hooks.on_registration_expired(|entry| {
        Box::pin(async move {
            warn!(
                "🎮 Registration for {} (player '{}') expired before its invoice ever appeared",
                entry.po_number, entry.player_id
            );
        })
    });

    let poller = PollingEngine::new(gateway, store.clone(), registry.clone(), hooks, PollerConfig {
        poll_interval: Duration::from_millis(config.poll_interval_ms),
        max_retries: config.max_retries,
    });
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let poller_handle = poller.start(shutdown_rx);

    let context = AppContext { router, registry, sinks };
    let (ws_server, http_server) = create_server_instances(&config, context)?;
    info!(
        "🚀️ Game control listening on {}:{} (WebSocket) and {}:{} (HTTP)",
        config.host, config.ws_port, config.host, config.http_port
    );
    let result = tokio::try_join!(ws_server, http_server);

    // Listeners are down. Let an in-flight scan finish, schedule nothing new, then leave.
    let _ = shutdown_tx.send(true);
    if let Err(e) = poller_handle.await {
        error!("🚀️ The polling engine did not shut down cleanly: {e}");
    }
    result.map(|_| ()).map_err(ServerError::from)
}

pub fn create_server_instances(config: &ServerConfig, context: AppContext) -> Result<(Server, Server), ServerError> {
    let ws_server = HttpServer::new(move || {
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %U").log_target("game_control"))
            .app_data(web::Data::new(context.clone()))
            .service(routes::health)
            .service(web::resource("/game-control").route(web::get().to(routes::game_control)))
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.ws_port))?
    .run();

    let http_server = HttpServer::new(move || {
        App::new().wrap(Logger::new("%t (%D ms) %s %a %U").log_target("status_listener")).service(routes::health)
    })
    .bind((config.host.as_str(), config.http_port))?
    .run();

    Ok((ws_server, http_server))
}
