//! HTTP surface: routing, extractors and the JSON error envelope.

pub mod account;
pub mod admin;
pub mod auth;
pub mod checkout;
pub mod error;
pub mod storefront;

use axum::{routing::{delete, get, post, put}, Json, Router};
use serde_json::{json, Value};
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use validator::Validate;

use crate::{AppState, Result};

pub use auth::{AdminUser, AuthUser};

/// Runs the request DTO's field checks.
pub(crate) fn validated<T: Validate>(dto: T) -> Result<T> {
    dto.validate()?;
    Ok(dto)
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        // Auth
        .route("/api/auth/signup", post(storefront::sign_up))
        .route("/api/auth/signin", post(storefront::sign_in))
        .route("/api/auth/oauth", post(storefront::oauth))
        // Catalog
        .route("/api/products", get(storefront::list_products))
        .route("/api/products/:product", get(storefront::get_product))
        .route("/api/products/:product/reviews", get(storefront::product_reviews).post(account::create_review))
        .route("/api/categories", get(storefront::list_categories))
        .route("/api/categories/:slug", get(storefront::get_category))
        .route("/api/brands", get(storefront::list_brands))
        .route("/api/brands/:slug", get(storefront::get_brand))
        // User
        .route("/api/user/profile", get(account::profile).put(account::update_profile))
        .route("/api/user/addresses", get(account::addresses).post(account::add_address))
        .route("/api/user/addresses/:id", put(account::update_address).delete(account::remove_address))
        .route("/api/user/addresses/:id/default", post(account::set_default_address))
        .route("/api/user/wishlist", get(account::wishlist).post(account::add_to_wishlist))
        .route("/api/user/wishlist/:product_id", delete(account::remove_from_wishlist))
        .route("/api/user/notifications", get(account::notifications).put(account::update_notifications))
        .route("/api/user/reviews", get(account::reviews))
        .route("/api/user/reviews/:id", put(account::update_review).delete(account::delete_review))
        // Checkout and orders
        .route("/api/discounts/validate", post(checkout::validate_discount))
        .route("/api/orders", get(checkout::my_orders).post(checkout::place_order))
        .route("/api/orders/:id", get(checkout::get_order))
        .route("/api/orders/:id/cancel", post(checkout::cancel_order))
        .route("/api/payments/initiate", post(checkout::initiate_payment))
        .route("/api/payments/complete", post(checkout::complete_payment))
        .route("/api/payments/:provider/return", get(checkout::payment_return))
        // Admin
        .route("/api/admin/stats", get(admin::stats))
        .route("/api/admin/analytics", get(admin::analytics))
        .route("/api/admin/orders", get(admin::list_orders))
        .route("/api/admin/orders/:id/status", put(admin::update_order_status))
        .route("/api/admin/customers", get(admin::customers))
        .route("/api/admin/products", post(admin::create_product))
        .route("/api/admin/products/:id", put(admin::update_product).delete(admin::delete_product))
        .route("/api/admin/categories", post(admin::create_category))
        .route("/api/admin/categories/:id", put(admin::update_category).delete(admin::delete_category))
        .route("/api/admin/brands", post(admin::create_brand))
        .route("/api/admin/brands/:id", put(admin::update_brand).delete(admin::delete_brand))
        .route("/api/admin/discounts", get(admin::list_discounts).post(admin::create_discount))
        .route("/api/admin/discounts/:id", put(admin::update_discount).delete(admin::delete_discount))
        .route("/api/admin/reviews/:id/status", put(admin::moderate_review))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn health() -> Json<Value> { Json(json!({"status": "healthy", "service": "storefront"})) }
