//! Request handler definitions
//!
//! Define each route and its handler here. Handlers that are more than a line or two MUST go
//! into a separate module. Keep this module neat and tidy 🙏
//!
//! Every handler is async: all store access and outbound calls are suspension points, so a slow
//! database or provider never blocks a worker thread.
use std::collections::HashMap;

use actix_web::{delete, get, post, put, web, HttpRequest, HttpResponse, Responder};
use cryptopay::{CryptoPayApi, WebhookUpdate, INVOICE_PAID};
use log::*;
use pronto_common::Rubles;
use pronto_engine::{
    db_types::{NewOrder, NewUser, OrderId},
    order_objects::{NewInvoice, OrderQueryFilter},
    traits::{NotificationPrefs, OrderFlowError},
    AccountApi,
    MarketConfig,
    OrderFlowApi,
    PaymentsApi,
    SqliteDatabase,
};

use crate::{
    auth::{AuthenticatedUser, LoginToken, MaybeAuthenticated, TokenIssuer},
    data_objects::{
        AuthResponse,
        BalanceResponse,
        CreateInvoiceRequest,
        CreateInvoiceResponse,
        CreateOrderRequest,
        ListOrdersQuery,
        OrderListResponse,
        OrderResponse,
        PaymentStatusResponse,
        RechargeRequest,
        RechargeResponse,
        TakeOrderResponse,
        UpdateOrderBody,
        WebhookAck,
    },
    errors::ServerError,
};

type OrderApi = OrderFlowApi<SqliteDatabase>;
type Accounts = AccountApi<SqliteDatabase>;
type Payments = PaymentsApi<SqliteDatabase>;

// ----------------------------------------------   Health  ----------------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

// ----------------------------------------------    Auth   ----------------------------------------------------------
/// Exchanges a signed login token from the identity handshake for an access token. The user row
/// is created on first contact.
#[post("/auth")]
pub async fn auth(
    body: web::Json<LoginToken>,
    issuer: web::Data<TokenIssuer>,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    trace!("💻️ Received auth request");
    let login = body.into_inner();
    issuer.verify_login_token(&login)?;
    let mut user = NewUser::new(login.user_id);
    if let Some(username) = &login.username {
        user = user.with_username(username);
    }
    let account = accounts.fetch_or_create_user_account(user).await?;
    let access_token = issuer.issue_token(account.id, account.username.clone())?;
    debug!("💻️ Issued access token for user #{}", account.id);
    Ok(HttpResponse::Ok().json(AuthResponse { access_token }))
}

// ----------------------------------------------    Users  ----------------------------------------------------------
#[get("/users/me")]
pub async fn me(user: AuthenticatedUser, accounts: web::Data<Accounts>) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET users/me for #{}", user.id);
    let mut new_user = NewUser::new(user.id);
    if let Some(username) = &user.username {
        new_user = new_user.with_username(username);
    }
    let account = accounts.fetch_or_create_user_account(new_user).await?;
    Ok(HttpResponse::Ok().json(account))
}

#[put("/users/me/notifications")]
pub async fn update_notifications(
    user: AuthenticatedUser,
    body: web::Json<NotificationPrefs>,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ PUT users/me/notifications for #{}", user.id);
    accounts.fetch_or_create_user_account(NewUser::new(user.id)).await?;
    let account = accounts.update_notification_prefs(user.id, body.into_inner()).await?;
    Ok(HttpResponse::Ok().json(account))
}

// ----------------------------------------------   Orders  ----------------------------------------------------------
/// Creates a new order. Free for clients; the matching notification fan-out runs in the
/// background and never delays this request.
#[post("/orders")]
pub async fn create_order(
    user: AuthenticatedUser,
    body: web::Json<CreateOrderRequest>,
    orders_api: web::Data<OrderApi>,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ POST orders for client #{}", user.id);
    let request = body.into_inner();
    let category = request.validated_category()?;
    let mut new_user = NewUser::new(user.id);
    if let Some(username) = &user.username {
        new_user = new_user.with_username(username);
    }
    accounts.fetch_or_create_user_account(new_user).await?;
    let order =
        NewOrder::new(user.id, category, &request.description, &request.city, &request.contact);
    let order = orders_api.create_order(order).await?;
    Ok(HttpResponse::Created().json(OrderResponse::for_owner(order, &[])))
}

/// Lists orders. No authentication needed for browsing; contacts are always nulled in the list
/// view.
#[get("/orders")]
pub async fn list_orders(
    query: web::Query<ListOrdersQuery>,
    user: MaybeAuthenticated,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    let params = query.into_inner();
    let mut filter = OrderQueryFilter::default();
    if let Some(category) = &params.category {
        filter.category = Some(category.parse().map_err(|e| ServerError::InvalidRequest(format!("{e}")))?);
    }
    if let Some(city) = &params.city {
        filter.city = Some(city.clone());
    }
    if let Some(status) = &params.status {
        filter.status = Some(vec![status.parse().map_err(|e| ServerError::InvalidRequest(format!("{e}")))?]);
    }
    if params.mine {
        filter.client_id = user.user_id();
    }
    let limit = params.limit.unwrap_or(50).clamp(1, 100);
    let offset = params.offset.unwrap_or(0).max(0);
    filter = filter.with_pagination(limit, offset);
    let (orders, total) = accounts.search_orders(filter).await?;

    let ids: Vec<OrderId> = orders.iter().map(|o| o.id.clone()).collect();
    let mut takes_by_order: HashMap<OrderId, Vec<_>> = HashMap::new();
    for take in accounts.fetch_takes_for_orders(&ids).await? {
        takes_by_order.entry(take.order_id.clone()).or_default().push(take);
    }
    let orders = orders
        .into_iter()
        .map(|order| {
            let takes = takes_by_order.remove(&order.id).unwrap_or_default();
            OrderResponse::redacted(order, &takes)
        })
        .collect();
    Ok(HttpResponse::Ok().json(OrderListResponse { orders, total }))
}

/// Fetches one order. The contact is visible to the owning client and to executors holding a
/// take; everyone else sees it nulled.
#[get("/orders/{order_id}")]
pub async fn get_order(
    path: web::Path<String>,
    user: MaybeAuthenticated,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    let (order, takes) =
        accounts.fetch_order_with_takes(&order_id).await?.ok_or(OrderFlowError::OrderNotFound)?;
    Ok(HttpResponse::Ok().json(OrderResponse::with_visibility(order, &takes, user.user_id())))
}

/// Edits an order. Only possible while no executor has taken it; the city is locked for good.
#[put("/orders/{order_id}")]
pub async fn update_order(
    user: AuthenticatedUser,
    path: web::Path<String>,
    body: web::Json<UpdateOrderBody>,
    orders_api: web::Data<OrderApi>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ PUT orders/{order_id} by client #{}", user.id);
    let patch = body.into_inner().validate()?;
    let order = orders_api.update_order(&order_id, user.id, patch).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::for_owner(order, &[])))
}

#[delete("/orders/{order_id}")]
pub async fn delete_order(
    user: AuthenticatedUser,
    path: web::Path<String>,
    orders_api: web::Data<OrderApi>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ DELETE orders/{order_id} by client #{}", user.id);
    orders_api.delete_order(&order_id, user.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

/// An executor claims a paid slot on the order and receives the contact in return.
#[post("/orders/{order_id}/take")]
pub async fn take_order(
    user: AuthenticatedUser,
    path: web::Path<String>,
    orders_api: web::Data<OrderApi>,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ POST orders/{order_id}/take by executor #{}", user.id);
    accounts.fetch_or_create_user_account(NewUser::new(user.id)).await?;
    let outcome = orders_api.take_order(&order_id, user.id).await?;
    Ok(HttpResponse::Ok().json(TakeOrderResponse {
        success: true,
        contact: outcome.contact,
        executor_count: outcome.take_count,
        new_balance: outcome.new_balance,
    }))
}

/// The client confirms they engaged an executor, stopping the no-response clock.
#[post("/orders/{order_id}/respond")]
pub async fn respond_to_order(
    user: AuthenticatedUser,
    path: web::Path<String>,
    orders_api: web::Data<OrderApi>,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ POST orders/{order_id}/respond by client #{}", user.id);
    let order = orders_api.respond_to_order(&order_id, user.id).await?;
    let takes = accounts.fetch_takes_for_orders(std::slice::from_ref(&order_id)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::for_owner(order, &takes)))
}

/// The client closes the order without completion. The takers keep what they paid for.
#[post("/orders/{order_id}/close")]
pub async fn close_order(
    user: AuthenticatedUser,
    path: web::Path<String>,
    orders_api: web::Data<OrderApi>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ POST orders/{order_id}/close by client #{}", user.id);
    orders_api.close_order(&order_id, user.id).await?;
    Ok(HttpResponse::NoContent().finish())
}

#[post("/orders/{order_id}/complete")]
pub async fn complete_order(
    user: AuthenticatedUser,
    path: web::Path<String>,
    orders_api: web::Data<OrderApi>,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    let order_id = OrderId::from(path.into_inner());
    debug!("💻️ POST orders/{order_id}/complete by client #{}", user.id);
    let order = orders_api.complete_order(&order_id, user.id).await?;
    let takes = accounts.fetch_takes_for_orders(std::slice::from_ref(&order_id)).await?;
    Ok(HttpResponse::Ok().json(OrderResponse::for_owner(order, &takes)))
}

// ----------------------------------------------  Balance   ---------------------------------------------------------
#[get("/balance")]
pub async fn my_balance(user: AuthenticatedUser, accounts: web::Data<Accounts>) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET balance for #{}", user.id);
    let balance = accounts.balance(user.id).await?;
    Ok(HttpResponse::Ok().json(BalanceResponse { balance }))
}

#[get("/balance/history")]
pub async fn balance_history(
    user: AuthenticatedUser,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET balance history for #{}", user.id);
    let history = accounts.balance_history(user.id).await?;
    Ok(HttpResponse::Ok().json(history))
}

/// Direct balance top-up, outside the invoice flow.
#[post("/balance/recharge")]
pub async fn recharge_balance(
    user: AuthenticatedUser,
    body: web::Json<RechargeRequest>,
    payments: web::Data<Payments>,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    let request = body.into_inner();
    debug!("💻️ POST balance/recharge of {} for #{}", request.amount, user.id);
    accounts.fetch_or_create_user_account(NewUser::new(user.id)).await?;
    let (new_balance, transaction_id) =
        payments.recharge(user.id, Rubles::from(request.amount), &request.method).await?;
    Ok(HttpResponse::Ok().json(RechargeResponse { success: true, new_balance, transaction_id }))
}

/// Mints an invoice at the payment provider and persists it in pending state.
#[post("/balance/create-invoice")]
pub async fn create_invoice(
    user: AuthenticatedUser,
    body: web::Json<CreateInvoiceRequest>,
    gateway: web::Data<CryptoPayApi>,
    payments: web::Data<Payments>,
    accounts: web::Data<Accounts>,
    market: web::Data<MarketConfig>,
) -> Result<HttpResponse, ServerError> {
    let amount = Rubles::from(body.amount);
    if !amount.is_positive() {
        return Err(ServerError::InvalidRequest("Amount must be positive".to_string()));
    }
    debug!("💻️ POST balance/create-invoice of {amount} for #{}", user.id);
    accounts.fetch_or_create_user_account(NewUser::new(user.id)).await?;
    let description = format!("Balance top-up of {amount}");
    let remote = gateway.create_invoice(amount, &description, market.invoice_expiry_seconds).await?;
    let invoice = payments
        .create_pending_invoice(user.id, NewInvoice {
            external_invoice_id: remote.invoice_id.to_string(),
            amount,
            pay_url: remote.bot_invoice_url,
            mini_app_invoice_url: remote.mini_app_invoice_url,
        })
        .await?;
    Ok(HttpResponse::Ok().json(CreateInvoiceResponse {
        payment_id: invoice.id,
        pay_url: invoice.pay_url.unwrap_or_default(),
        mini_app_invoice_url: invoice.mini_app_invoice_url,
    }))
}

/// Poll endpoint for an invoice the user created. Reports the new balance once paid.
#[get("/balance/payment/{payment_id}/status")]
pub async fn payment_status(
    user: AuthenticatedUser,
    path: web::Path<i64>,
    payments: web::Data<Payments>,
    accounts: web::Data<Accounts>,
) -> Result<HttpResponse, ServerError> {
    let payment_id = path.into_inner();
    let invoice = payments
        .invoice_for_user(payment_id, user.id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("Payment {payment_id}")))?;
    let new_balance = if invoice.status == pronto_engine::db_types::InvoiceStatus::Paid {
        Some(accounts.balance(user.id).await?)
    } else {
        None
    };
    Ok(HttpResponse::Ok().json(PaymentStatusResponse {
        payment_id: invoice.id,
        status: invoice.status.to_string(),
        amount: invoice.amount,
        new_balance,
    }))
}

// ----------------------------------------------  Webhook   ---------------------------------------------------------
/// Inbound webhook from the payment provider.
///
/// Processing failures deliberately do not surface as HTTP errors: the provider retries failed
/// deliveries, and a retried delivery must land on the idempotent path rather than be
/// misinterpreted as a new payment. The only rejection is a bad signature.
#[post("/webhook/cryptopay")]
pub async fn cryptopay_webhook(
    req: HttpRequest,
    body: web::Bytes,
    gateway: web::Data<CryptoPayApi>,
    payments: web::Data<Payments>,
) -> Result<HttpResponse, ServerError> {
    let signature =
        req.headers().get("crypto-pay-api-signature").and_then(|v| v.to_str().ok()).unwrap_or_default();
    if !gateway.verify_webhook_signature(&body, signature) {
        warn!("💻️ Webhook with invalid signature rejected");
        return Ok(HttpResponse::Unauthorized().json(WebhookAck { ok: false }));
    }
    let update: WebhookUpdate = match serde_json::from_slice(&body) {
        Ok(update) => update,
        Err(e) => {
            warn!("💻️ Could not parse webhook body: {e}");
            return Ok(HttpResponse::Ok().json(WebhookAck { ok: false }));
        },
    };
    if update.update_type != INVOICE_PAID {
        info!("💻️ Ignoring webhook update_type={}", update.update_type);
        return Ok(HttpResponse::Ok().json(WebhookAck { ok: true }));
    }
    let Some(payload) = update.payload else {
        warn!("💻️ Webhook delivery without an invoice payload");
        return Ok(HttpResponse::Ok().json(WebhookAck { ok: false }));
    };
    if let Err(e) = payments.process_paid_invoice(&payload.invoice_id.to_string()).await {
        error!("💻️ Failed to process paid invoice {}: {e}", payload.invoice_id);
    }
    Ok(HttpResponse::Ok().json(WebhookAck { ok: true }))
}
