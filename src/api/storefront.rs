//! Public endpoints: sign-up/sign-in and catalog browsing.

use axum::{extract::{Path, Query, State}, http::{HeaderMap, StatusCode}, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use super::validated;
use crate::domain::aggregates::{Brand, Category, OAuthProfile, Product, Review};
use crate::services::accounts::Session;
use crate::services::catalog::{Paginated, ProductQuery, WithCount};
use crate::{AppState, EcommerceError, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct SignUpRequest {
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub name: String,
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 8, message = "must be at least 8 characters"))]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SignInRequest {
    #[validate(email(message = "must be a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "is required"))]
    pub password: String,
}

pub async fn sign_up(State(s): State<AppState>, Json(r): Json<SignUpRequest>) -> Result<(StatusCode, Json<Value>)> {
    let r = validated(r)?;
    let session = s.accounts.sign_up(r.name.trim(), &r.email, &r.password).await?;
    Ok((StatusCode::CREATED, Json(json!({ "message": "Account created", "user": session.user, "token": session.token }))))
}

pub async fn sign_in(State(s): State<AppState>, Json(r): Json<SignInRequest>) -> Result<Json<Session>> {
    let r = validated(r)?;
    Ok(Json(s.accounts.sign_in(&r.email, &r.password).await?))
}

/// Called by the OAuth front end once the provider handshake succeeded.
pub async fn oauth(State(s): State<AppState>, headers: HeaderMap, Json(profile): Json<OAuthProfile>) -> Result<Json<Session>> {
    let presented = headers.get("x-auth-bridge-secret").and_then(|v| v.to_str().ok());
    match (&s.config.auth_bridge_secret, presented) {
        (Some(expected), Some(got)) if expected == got => {}
        _ => return Err(EcommerceError::Unauthorized("Invalid auth bridge credentials".into())),
    }
    Ok(Json(s.accounts.oauth_sign_in(profile).await?))
}

pub async fn list_products(State(s): State<AppState>, Query(q): Query<ProductQuery>) -> Result<Json<Paginated<Product>>> {
    Ok(Json(s.catalog.list_products(q).await?))
}

/// Looks a product up by id or by slug.
pub async fn get_product(State(s): State<AppState>, Path(key): Path<String>) -> Result<Json<Product>> {
    let product = match Uuid::parse_str(&key) {
        Ok(id) => s.catalog.product(id).await?,
        Err(_) => s.catalog.product_by_slug(&key).await?,
    };
    if !product.is_published() { return Err(EcommerceError::NotFound("Product")); }
    Ok(Json(product))
}

pub async fn product_reviews(State(s): State<AppState>, Path(product_id): Path<Uuid>) -> Result<Json<Vec<Review>>> {
    Ok(Json(s.reviews.for_product(product_id).await?))
}

pub async fn list_categories(State(s): State<AppState>) -> Result<Json<Vec<WithCount<Category>>>> {
    Ok(Json(s.catalog.categories().await?))
}

pub async fn get_category(State(s): State<AppState>, Path(slug): Path<String>) -> Result<Json<WithCount<Category>>> {
    Ok(Json(s.catalog.category_by_slug(&slug).await?))
}

pub async fn list_brands(State(s): State<AppState>) -> Result<Json<Vec<WithCount<Brand>>>> {
    Ok(Json(s.catalog.brands().await?))
}

pub async fn get_brand(State(s): State<AppState>, Path(slug): Path<String>) -> Result<Json<WithCount<Brand>>> {
    Ok(Json(s.catalog.brand_by_slug(&slug).await?))
}
