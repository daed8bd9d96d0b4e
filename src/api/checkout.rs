//! Checkout endpoints: discount validation, cash on delivery, gateway payments and order history.

use axum::{extract::{Path, Query, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;

use super::error::payment_failure;
use super::AuthUser;
use crate::domain::aggregates::{CartItem, Order};
use crate::domain::value_objects::Money;
use crate::payments::QueryParams;
use crate::services::checkout::{Completion, CompletionRequest, InitiateRequest, Initiation};
use crate::{AppState, EcommerceError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountCheck {
    pub code: String,
    pub subtotal: Money,
    #[serde(default)]
    pub items: Vec<CartItem>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrder {
    pub address_id: Uuid,
    pub items: Vec<CartItem>,
    #[serde(default)]
    pub discount_code: Option<String>,
}

pub async fn validate_discount(State(s): State<AppState>, _user: AuthUser, Json(r): Json<DiscountCheck>) -> Result<Json<Value>> {
    if r.code.trim().is_empty() { return Err(EcommerceError::Validation("Discount code is required".into())); }
    let ids: Vec<Uuid> = r.items.iter().map(|i| i.product_id).collect();
    let (discount, amount) = s.discounts.quote(&r.code, r.subtotal, &ids).await?;
    Ok(Json(json!({ "valid": true, "discountAmount": amount, "code": discount.code, "message": "Discount applied" })))
}

/// Cash-on-delivery checkout.
pub async fn place_order(State(s): State<AppState>, user: AuthUser, Json(r): Json<PlaceOrder>) -> Result<(StatusCode, Json<Value>)> {
    let order = s.orders.place_cash_on_delivery(user.id, r.address_id, r.items, r.discount_code.as_deref()).await?;
    Ok((StatusCode::CREATED, Json(json!({
        "message": "Order placed successfully", "orderId": order.id, "orderNumber": order.order_number, "order": order,
    }))))
}

pub async fn my_orders(State(s): State<AppState>, user: AuthUser) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.orders.for_user(user.id).await?))
}

pub async fn get_order(State(s): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Order>> {
    Ok(Json(s.orders.get(user.id, user.role.is_admin(), id).await?))
}

pub async fn cancel_order(State(s): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Value>> {
    let order = s.orders.cancel(user.id, id).await?;
    Ok(Json(json!({ "message": "Order cancelled", "order": order })))
}

pub async fn initiate_payment(State(s): State<AppState>, user: AuthUser, Json(r): Json<InitiateRequest>) -> Result<Json<Initiation>> {
    Ok(Json(s.checkout.initiate(user.id, r).await?))
}

/// Every failure of a completion is categorised so the client can word it and reset its state.
fn completion_failure(e: EcommerceError) -> Response {
    match e {
        EcommerceError::Payment(_) => e.into_response(),
        EcommerceError::Validation(m) | EcommerceError::BusinessRule(m) => payment_failure(StatusCode::BAD_REQUEST, m, "invalid_request"),
        EcommerceError::NotFound(_) => payment_failure(StatusCode::NOT_FOUND, e.to_string(), "invalid_request"),
        EcommerceError::Unauthorized(m) => payment_failure(StatusCode::UNAUTHORIZED, m, "session_expired"),
        EcommerceError::Upstream(_) => {
            tracing::error!(error = %e, "Payment completion failed upstream");
            payment_failure(StatusCode::BAD_GATEWAY, "Could not reach the payment service. Please try again.".into(), "network")
        }
        EcommerceError::Storage(_) | EcommerceError::Config(_) => {
            tracing::error!(error = %e, "Payment completion failed");
            payment_failure(StatusCode::INTERNAL_SERVER_ERROR, "Something went wrong while saving your order.".into(), "server_error")
        }
    }
}

fn completed(result: Result<Completion>) -> Response {
    match result {
        Ok(done) => Json(done).into_response(),
        Err(e) => completion_failure(e),
    }
}

pub async fn complete_payment(State(s): State<AppState>, user: AuthUser, Json(r): Json<CompletionRequest>) -> Response {
    completed(s.checkout.complete(user.id, r).await)
}

pub async fn payment_return(State(s): State<AppState>, user: AuthUser, Path(provider): Path<String>, Query(params): Query<QueryParams>) -> Response {
    completed(s.checkout.return_from_gateway(user.id, &provider, params).await)
}
