use std::{future::Future, pin::Pin, time::Duration};

use actix_web::{dev::Server, http::KeepAlive, middleware::Logger, web, App, HttpServer};
use cryptopay::CryptoPayApi;
use log::*;
use pronto_engine::{
    events::{EventHandlers, EventHooks, EventProducers},
    AccountApi,
    OrderFlowApi,
    PaymentsApi,
    SqliteDatabase,
};

use crate::{
    auth::TokenIssuer,
    config::ServerConfig,
    errors::ServerError,
    expiry_worker::start_expiry_worker,
    notifier::Notifier,
    routes,
};

const EVENT_BUFFER_SIZE: usize = 32;
const MAX_DB_CONNECTIONS: u32 = 25;

/// Boots the full service: database (with migrations), event handlers, the notification hook,
/// the expiry worker, and the HTTP server. Blocks until the server exits, then stops the worker
/// cleanly.
pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, config.market.clone(), MAX_DB_CONNECTIONS)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    db.migrate().await.map_err(|e| ServerError::InitializeError(e.to_string()))?;

    let notifier = Notifier::new(config.notifier.clone(), AccountApi::new(db.clone()))?;
    let mut hooks = EventHooks::default();
    hooks.on_order_created(move |event| {
        let notifier = notifier.clone();
        Box::pin(async move { notifier.handle_event(event).await }) as Pin<Box<dyn Future<Output = ()> + Send>>
    });
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;

    let worker =
        start_expiry_worker(db.clone(), producers.clone(), Duration::from_secs(config.sweep_interval_secs));

    let srv = create_server_instance(config, db, producers)?;
    let result = srv.await.map_err(|e| ServerError::BackendError(e.to_string()));

    // Cooperative shutdown: the worker finishes (or rolls back) its current pass before exiting.
    if let Err(e) = worker.stop().await {
        warn!("🕰️ Expiry worker did not shut down cleanly: {e}");
    }
    result
}

/// Builds the HTTP server around an already-initialised database. Split from [`run_server`] so
/// tests can assemble the same application against a throwaway store.
pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let gateway = CryptoPayApi::new(config.cryptopay.clone()).map_err(|e| ServerError::InitializeError(e.to_string()))?;
    let issuer = TokenIssuer::new(&config.auth);
    let market = config.market.clone();
    let srv = HttpServer::new(move || {
        let orders_api = OrderFlowApi::new(db.clone(), producers.clone());
        let accounts_api = AccountApi::new(db.clone());
        let payments_api = PaymentsApi::new(db.clone());
        App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("pronto::access_log"))
            .app_data(web::Data::new(orders_api))
            .app_data(web::Data::new(accounts_api))
            .app_data(web::Data::new(payments_api))
            .app_data(web::Data::new(issuer.clone()))
            .app_data(web::Data::new(gateway.clone()))
            .app_data(web::Data::new(market.clone()))
            .service(routes::health)
            .service(routes::auth)
            .service(routes::cryptopay_webhook)
            .service(
                web::scope("/api")
                    .service(routes::me)
                    .service(routes::update_notifications)
                    .service(routes::create_order)
                    .service(routes::list_orders)
                    .service(routes::get_order)
                    .service(routes::update_order)
                    .service(routes::delete_order)
                    .service(routes::take_order)
                    .service(routes::respond_to_order)
                    .service(routes::close_order)
                    .service(routes::complete_order)
                    .service(routes::my_balance)
                    .service(routes::balance_history)
                    .service(routes::recharge_balance)
                    .service(routes::create_invoice)
                    .service(routes::payment_status),
            )
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
