//! Endpoint-test scaffolding: a throwaway database per test context plus request helpers that
//! assemble the same application the real server runs.
use actix_web::{http::StatusCode, test, web, App};
use cryptopay::{CryptoPayApi, CryptoPayConfig};
use pronto_common::{Rubles, Secret};
use pronto_engine::{
    db_types::NewUser,
    events::EventProducers,
    traits::{AccountManagement, PaymentsDatabase},
    AccountApi,
    MarketConfig,
    OrderFlowApi,
    PaymentsApi,
    SqliteDatabase,
};
use tempfile::TempDir;

use crate::{
    auth::{login_token_signature, TokenIssuer},
    config::AuthConfig,
    routes,
};

pub const TEST_IDENTITY_SECRET: &str = "identity-secret-for-endpoint-tests";
pub const TEST_JWT_SECRET: &str = "0123456789abcdef0123456789abcdef";
pub const TEST_GATEWAY_TOKEN: &str = "12345:TESTTOKEN";

pub struct TestContext {
    pub db: SqliteDatabase,
    pub issuer: TokenIssuer,
    pub gateway: CryptoPayApi,
    pub market: MarketConfig,
    _tmp: TempDir,
}

impl TestContext {
    pub async fn new() -> Self {
        Self::with_market(MarketConfig::default()).await
    }

    pub async fn with_market(market: MarketConfig) -> Self {
        let _ = env_logger::try_init();
        let tmp = tempfile::tempdir().expect("Could not create temp dir");
        let url = format!("sqlite://{}/endpoint_test.db", tmp.path().display());
        let db = SqliteDatabase::new_with_url(&url, market.clone(), 5).await.expect("Could not create test database");
        db.migrate().await.expect("Could not run migrations");
        let auth_config = AuthConfig {
            identity_secret: Secret::new(TEST_IDENTITY_SECRET.to_string()),
            jwt_secret: Secret::new(TEST_JWT_SECRET.to_string()),
            token_lifetime_minutes: 60,
        };
        let issuer = TokenIssuer::new(&auth_config);
        // Unroutable base URL: anything that actually calls out fails fast.
        let gateway_config = CryptoPayConfig::new("http://127.0.0.1:1", Secret::new(TEST_GATEWAY_TOKEN.to_string()));
        let gateway = CryptoPayApi::new(gateway_config).expect("Could not build gateway client");
        Self { db, issuer, gateway, market, _tmp: tmp }
    }

    /// Registers the same app data and routes as `create_server_instance`.
    pub fn configure(&self) -> impl FnOnce(&mut web::ServiceConfig) {
        let orders_api = OrderFlowApi::new(self.db.clone(), EventProducers::default());
        let accounts_api = AccountApi::new(self.db.clone());
        let payments_api = PaymentsApi::new(self.db.clone());
        let issuer = self.issuer.clone();
        let gateway = self.gateway.clone();
        let market = self.market.clone();
        move |cfg: &mut web::ServiceConfig| {
            cfg.app_data(web::Data::new(orders_api))
                .app_data(web::Data::new(accounts_api))
                .app_data(web::Data::new(payments_api))
                .app_data(web::Data::new(issuer))
                .app_data(web::Data::new(gateway))
                .app_data(web::Data::new(market))
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
                );
        }
    }

    /// Swaps the gateway client, e.g. for an unconfigured-provider scenario.
    pub fn with_gateway(mut self, gateway: CryptoPayApi) -> Self {
        self.gateway = gateway;
        self
    }

    pub async fn seed_user(&self, id: i64, balance: i64) {
        self.db.fetch_or_create_user_account(NewUser::new(id)).await.expect("Could not create user");
        if balance > 0 {
            self.db.recharge(id, Rubles::from(balance), "test_seed").await.expect("Could not seed balance");
        }
    }

    pub fn token_for(&self, user_id: i64) -> String {
        self.issuer.issue_token(user_id, None).expect("Could not issue token")
    }

    /// A correctly signed login token body for the `/auth` endpoint.
    pub fn login_body(&self, user_id: i64, username: Option<&str>) -> serde_json::Value {
        let issued_at = chrono::Utc::now().timestamp();
        let signature = login_token_signature(TEST_IDENTITY_SECRET, user_id, username, issued_at);
        serde_json::json!({
            "user_id": user_id,
            "username": username,
            "issued_at": issued_at,
            "signature": signature,
        })
    }
}

fn with_token(mut req: test::TestRequest, token: Option<&str>) -> test::TestRequest {
    if let Some(token) = token {
        req = req.insert_header(("Authorization", format!("Bearer {token}")));
    }
    req
}

pub async fn get(ctx: &TestContext, token: Option<&str>, path: &str) -> (StatusCode, serde_json::Value) {
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let req = with_token(test::TestRequest::get().uri(path), token);
    let response = test::call_service(&app, req.to_request()).await;
    into_json(response).await
}

pub async fn post(
    ctx: &TestContext,
    token: Option<&str>,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let req = with_token(test::TestRequest::post().uri(path).set_json(body), token);
    let response = test::call_service(&app, req.to_request()).await;
    into_json(response).await
}

/// POST without a body, for the action endpoints (take/respond/close/complete).
pub async fn post_empty(ctx: &TestContext, token: Option<&str>, path: &str) -> (StatusCode, serde_json::Value) {
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let req = with_token(test::TestRequest::post().uri(path), token);
    let response = test::call_service(&app, req.to_request()).await;
    into_json(response).await
}

pub async fn put(
    ctx: &TestContext,
    token: Option<&str>,
    path: &str,
    body: serde_json::Value,
) -> (StatusCode, serde_json::Value) {
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let req = with_token(test::TestRequest::put().uri(path).set_json(body), token);
    let response = test::call_service(&app, req.to_request()).await;
    into_json(response).await
}

pub async fn delete(ctx: &TestContext, token: Option<&str>, path: &str) -> (StatusCode, serde_json::Value) {
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let req = with_token(test::TestRequest::delete().uri(path), token);
    let response = test::call_service(&app, req.to_request()).await;
    into_json(response).await
}

/// Raw POST with explicit headers, for webhook deliveries.
pub async fn post_raw(
    ctx: &TestContext,
    path: &str,
    body: Vec<u8>,
    headers: &[(&str, &str)],
) -> (StatusCode, serde_json::Value) {
    let app = test::init_service(App::new().configure(ctx.configure())).await;
    let mut req = test::TestRequest::post().uri(path).set_payload(body);
    for (name, value) in headers {
        req = req.insert_header((*name, *value));
    }
    let response = test::call_service(&app, req.to_request()).await;
    into_json(response).await
}

async fn into_json(
    response: actix_web::dev::ServiceResponse<impl actix_web::body::MessageBody>,
) -> (StatusCode, serde_json::Value) {
    let status = response.status();
    let bytes = test::read_body(response).await;
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}
