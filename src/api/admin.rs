//! Back-office endpoints. Every handler requires an admin caller.

use axum::{extract::{Path, Query, State}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde::Deserialize;
use tracing::info;
use uuid::Uuid;

use super::AdminUser;
use crate::domain::aggregates::{Brand, BrandDetails, Category, CategoryDetails, Discount, Order, OrderStatus, Product, ProductDetails, Review, ReviewStatus};
use crate::services::accounts::CustomerSummary;
use crate::services::analytics::{DashboardStats, Period};
use crate::services::discounts::DiscountInput;
use crate::{AppState, EcommerceError, Result};

const DEFAULT_LIMIT: usize = 10;
const MAX_LIMIT: usize = 100;

#[derive(Debug, Deserialize)]
pub struct AnalyticsParams {
    #[serde(rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub period: Period,
    pub limit: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct OrderFilter { pub status: Option<OrderStatus> }

#[derive(Debug, Deserialize)]
pub struct StatusChange { pub status: OrderStatus, #[serde(default)] pub description: Option<String> }

#[derive(Debug, Deserialize)]
pub struct Moderation { pub status: ReviewStatus }

pub async fn stats(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<DashboardStats>> {
    Ok(Json(s.analytics.stats().await?))
}

pub async fn analytics(State(s): State<AppState>, _admin: AdminUser, Query(p): Query<AnalyticsParams>) -> Result<Response> {
    let limit = p.limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT);
    let a = &s.analytics;
    let response = match p.kind.as_deref().unwrap_or("all") {
        "revenue" => Json(a.revenue(p.period).await?).into_response(),
        "top-products" => Json(a.top_products(limit).await?).into_response(),
        "low-stock" => Json(a.low_stock().await?).into_response(),
        "category-revenue" => Json(a.category_revenue().await?).into_response(),
        "customers" => Json(a.customers(limit).await?).into_response(),
        "all" => Json(a.all(p.period, limit).await?).into_response(),
        other => return Err(EcommerceError::Validation(format!("Unknown analytics type: {}", other))),
    };
    Ok(response)
}

pub async fn list_orders(State(s): State<AppState>, _admin: AdminUser, Query(f): Query<OrderFilter>) -> Result<Json<Vec<Order>>> {
    Ok(Json(s.orders.list(f.status).await?))
}

pub async fn update_order_status(State(s): State<AppState>, AdminUser(admin): AdminUser, Path(id): Path<Uuid>, Json(r): Json<StatusChange>) -> Result<Json<Order>> {
    let order = s.orders.update_status(id, r.status, r.description).await?;
    info!(admin_id = %admin.id, order_id = %id, "Order status changed by admin");
    Ok(Json(order))
}

pub async fn customers(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<CustomerSummary>>> {
    Ok(Json(s.accounts.customers().await?))
}

pub async fn create_product(State(s): State<AppState>, _admin: AdminUser, Json(d): Json<ProductDetails>) -> Result<(StatusCode, Json<Product>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_product(d).await?)))
}

pub async fn update_product(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(d): Json<ProductDetails>) -> Result<Json<Product>> {
    Ok(Json(s.catalog.update_product(id, d).await?))
}

pub async fn delete_product(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog.delete_product(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_category(State(s): State<AppState>, _admin: AdminUser, Json(d): Json<CategoryDetails>) -> Result<(StatusCode, Json<Category>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_category(d).await?)))
}

pub async fn update_category(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(d): Json<CategoryDetails>) -> Result<Json<Category>> {
    Ok(Json(s.catalog.update_category(id, d).await?))
}

pub async fn delete_category(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog.delete_category(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn create_brand(State(s): State<AppState>, _admin: AdminUser, Json(d): Json<BrandDetails>) -> Result<(StatusCode, Json<Brand>)> {
    Ok((StatusCode::CREATED, Json(s.catalog.create_brand(d).await?)))
}

pub async fn update_brand(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(d): Json<BrandDetails>) -> Result<Json<Brand>> {
    Ok(Json(s.catalog.update_brand(id, d).await?))
}

pub async fn delete_brand(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.catalog.delete_brand(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn list_discounts(State(s): State<AppState>, _admin: AdminUser) -> Result<Json<Vec<Discount>>> {
    Ok(Json(s.discounts.list().await?))
}

pub async fn create_discount(State(s): State<AppState>, _admin: AdminUser, Json(d): Json<DiscountInput>) -> Result<(StatusCode, Json<Discount>)> {
    Ok((StatusCode::CREATED, Json(s.discounts.create(d).await?)))
}

pub async fn update_discount(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(d): Json<DiscountInput>) -> Result<Json<Discount>> {
    Ok(Json(s.discounts.update(id, d).await?))
}

pub async fn delete_discount(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.discounts.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn moderate_review(State(s): State<AppState>, _admin: AdminUser, Path(id): Path<Uuid>, Json(m): Json<Moderation>) -> Result<Json<Review>> {
    Ok(Json(s.reviews.moderate(id, m.status).await?))
}
