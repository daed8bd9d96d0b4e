//! Signed-in customer endpoints: profile, address book, wishlist, notifications and reviews.

use axum::{extract::{Path, State}, http::StatusCode, Json};
use serde::Deserialize;
use serde_json::{json, Value};
use uuid::Uuid;
use validator::Validate;

use super::{validated, AuthUser};
use crate::domain::aggregates::{Address, AddressInput, NotificationPreferences, Product, Review, UserProfile};
use crate::{AppState, Result};

#[derive(Debug, Deserialize, Validate)]
pub struct ProfileUpdate {
    #[validate(length(min = 1, max = 100, message = "is required"))]
    pub name: String,
    #[serde(default)]
    #[validate(length(min = 7, max = 20, message = "must be a valid phone number"))]
    pub phone: Option<String>,
    #[serde(default)]
    #[validate(url(message = "must be a URL"))]
    pub image: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WishlistAdd { pub product_id: Uuid }

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewBody {
    #[validate(range(min = 1, max = 5, message = "must be between 1 and 5"))]
    pub rating: u8,
    #[validate(length(max = 2000, message = "is too long"))]
    #[serde(default)]
    pub comment: String,
}

pub async fn profile(State(s): State<AppState>, user: AuthUser) -> Result<Json<UserProfile>> {
    Ok(Json(s.accounts.profile(user.id).await?))
}

pub async fn update_profile(State(s): State<AppState>, user: AuthUser, Json(r): Json<ProfileUpdate>) -> Result<Json<UserProfile>> {
    let r = validated(r)?;
    Ok(Json(s.accounts.update_profile(user.id, r.name.trim().to_string(), r.phone, r.image).await?))
}

pub async fn addresses(State(s): State<AppState>, user: AuthUser) -> Result<Json<Vec<Address>>> {
    Ok(Json(s.accounts.addresses(user.id).await?))
}

pub async fn add_address(State(s): State<AppState>, user: AuthUser, Json(input): Json<AddressInput>) -> Result<(StatusCode, Json<Address>)> {
    let input = validated(input)?;
    Ok((StatusCode::CREATED, Json(s.accounts.add_address(user.id, input).await?)))
}

pub async fn update_address(State(s): State<AppState>, user: AuthUser, Path(id): Path<Uuid>, Json(input): Json<AddressInput>) -> Result<Json<Address>> {
    let input = validated(input)?;
    Ok(Json(s.accounts.update_address(user.id, id, input).await?))
}

pub async fn remove_address(State(s): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Vec<Address>>> {
    Ok(Json(s.accounts.remove_address(user.id, id).await?))
}

pub async fn set_default_address(State(s): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> Result<Json<Vec<Address>>> {
    Ok(Json(s.accounts.set_default_address(user.id, id).await?))
}

pub async fn wishlist(State(s): State<AppState>, user: AuthUser) -> Result<Json<Vec<Product>>> {
    Ok(Json(s.accounts.wishlist(user.id).await?))
}

pub async fn add_to_wishlist(State(s): State<AppState>, user: AuthUser, Json(r): Json<WishlistAdd>) -> Result<Json<Value>> {
    let wishlist = s.accounts.add_to_wishlist(user.id, r.product_id).await?;
    Ok(Json(json!({ "message": "Added to wishlist", "wishlist": wishlist })))
}

pub async fn remove_from_wishlist(State(s): State<AppState>, user: AuthUser, Path(product_id): Path<Uuid>) -> Result<Json<Value>> {
    let wishlist = s.accounts.remove_from_wishlist(user.id, product_id).await?;
    Ok(Json(json!({ "message": "Removed from wishlist", "wishlist": wishlist })))
}

pub async fn notifications(State(s): State<AppState>, user: AuthUser) -> Result<Json<NotificationPreferences>> {
    Ok(Json(s.accounts.notifications(user.id).await?))
}

pub async fn update_notifications(State(s): State<AppState>, user: AuthUser, Json(prefs): Json<NotificationPreferences>) -> Result<Json<NotificationPreferences>> {
    Ok(Json(s.accounts.update_notifications(user.id, prefs).await?))
}

pub async fn reviews(State(s): State<AppState>, user: AuthUser) -> Result<Json<Vec<Review>>> {
    Ok(Json(s.reviews.for_user(user.id).await?))
}

pub async fn create_review(State(s): State<AppState>, user: AuthUser, Path(product_id): Path<Uuid>, Json(r): Json<ReviewBody>) -> Result<(StatusCode, Json<Review>)> {
    let r = validated(r)?;
    Ok((StatusCode::CREATED, Json(s.reviews.create(user.id, product_id, r.rating, r.comment).await?)))
}

pub async fn update_review(State(s): State<AppState>, user: AuthUser, Path(id): Path<Uuid>, Json(r): Json<ReviewBody>) -> Result<Json<Review>> {
    let r = validated(r)?;
    Ok(Json(s.reviews.update(user.id, id, r.rating, r.comment).await?))
}

pub async fn delete_review(State(s): State<AppState>, user: AuthUser, Path(id): Path<Uuid>) -> Result<StatusCode> {
    s.reviews.delete(user.id, id).await?;
    Ok(StatusCode::NO_CONTENT)
}
