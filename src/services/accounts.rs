//! Accounts: sign-up, sign-in, OAuth merge and everything stored on the user document.

use chrono::{DateTime, Duration, Utc};
use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, Validation};
use rand::RngCore;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, instrument};
use uuid::Uuid;

use super::Repos;
use crate::config::Config;
use crate::domain::aggregates::user::normalize_email;
use crate::domain::aggregates::{Address, AddressInput, NotificationPreferences, OAuthProfile, OrderStatus, Product, Role, User, UserProfile};
use crate::domain::value_objects::Money;
use crate::store::StoreError;
use crate::{EcommerceError, Result};

/// JWT payload.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Claims { pub sub: Uuid, pub role: Role, pub exp: usize }

#[derive(Clone, Debug, Serialize)]
pub struct Session { pub token: String, pub user: UserProfile }

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerSummary {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub order_count: u32,
    pub total_spent: Money,
    pub last_order_at: Option<DateTime<Utc>>,
}

#[derive(Clone)]
pub struct Accounts {
    repos: Repos,
    config: Arc<Config>,
}

fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut salt);
    argon2::hash_encoded(password.as_bytes(), &salt, &argon2::Config::default())
        .map_err(|e| EcommerceError::Config(format!("password hashing failed: {}", e)))
}

fn verify_password(hash: &str, password: &str) -> bool { argon2::verify_encoded(hash, password.as_bytes()).unwrap_or(false) }

impl Accounts {
    pub fn new(repos: Repos, config: Arc<Config>) -> Self { Self { repos, config } }

    pub fn issue_token(&self, user: &User) -> Result<String> {
        let exp = (Utc::now() + Duration::hours(self.config.token_ttl_hours)).timestamp().max(0) as usize;
        let claims = Claims { sub: user.id, role: user.role, exp };
        encode(&Header::default(), &claims, &EncodingKey::from_secret(self.config.jwt_secret.as_bytes()))
            .map_err(|e| EcommerceError::Config(format!("token signing failed: {}", e)))
    }

    pub fn verify_token(&self, token: &str) -> Result<Claims> {
        decode::<Claims>(token, &DecodingKey::from_secret(self.config.jwt_secret.as_bytes()), &Validation::new(Algorithm::HS256))
            .map(|data| data.claims)
            .map_err(|_| EcommerceError::Unauthorized("Invalid or expired token".into()))
    }

    fn session(&self, user: &User) -> Result<Session> { Ok(Session { token: self.issue_token(user)?, user: user.profile() }) }

    #[instrument(skip(self, password))]
    pub async fn sign_up(&self, name: &str, email: &str, password: &str) -> Result<Session> {
        let email = normalize_email(email);
        if self.repos.users.find_one(json!({ "email": email })).await?.is_some() {
            return Err(EcommerceError::Validation("An account with this email already exists".into()));
        }
        let user = User::register(name.to_string(), &email, hash_password(password)?);
        match self.repos.users.insert(&user).await {
            Err(StoreError::Duplicate(_)) => return Err(EcommerceError::Validation("An account with this email already exists".into())),
            other => other?,
        }
        info!(user_id = %user.id, "Account created");
        self.session(&user)
    }

    #[instrument(skip(self, password))]
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let invalid = || EcommerceError::Unauthorized("Invalid email or password".into());
        let user = self.repos.users.find_one(json!({ "email": normalize_email(email) })).await?.ok_or_else(invalid)?;
        let hash = user.password_hash.as_deref().ok_or_else(invalid)?;
        if !verify_password(hash, password) { return Err(invalid()); }
        self.session(&user)
    }

    /// Records a sign-in completed by an OAuth provider. Existing accounts keep their role.
    #[instrument(skip(self, profile), fields(provider = ?profile.provider))]
    pub async fn oauth_sign_in(&self, profile: OAuthProfile) -> Result<Session> {
        let email = normalize_email(&profile.email);
        if email.is_empty() { return Err(EcommerceError::Validation("email is required".into())); }
        let user = match self.repos.users.find_one(json!({ "email": email })).await? {
            Some(mut user) => {
                user.merge_oauth(profile);
                self.save(&user).await?;
                user
            }
            None => {
                let user = User::from_oauth(profile);
                self.repos.users.insert(&user).await?;
                info!(user_id = %user.id, "Account created from OAuth sign-in");
                user
            }
        };
        self.session(&user)
    }

    pub async fn load(&self, user_id: Uuid) -> Result<User> {
        self.repos.users.get(user_id).await?.ok_or(EcommerceError::NotFound("User"))
    }

    async fn save(&self, user: &User) -> Result<()> {
        if self.repos.users.save(user).await? { Ok(()) } else { Err(EcommerceError::NotFound("User")) }
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<UserProfile> { Ok(self.load(user_id).await?.profile()) }

    pub async fn update_profile(&self, user_id: Uuid, name: String, phone: Option<String>, image: Option<String>) -> Result<UserProfile> {
        let mut user = self.load(user_id).await?;
        user.update_profile(name, phone, image);
        self.save(&user).await?;
        Ok(user.profile())
    }

    pub async fn addresses(&self, user_id: Uuid) -> Result<Vec<Address>> { Ok(self.load(user_id).await?.addresses) }

    pub async fn add_address(&self, user_id: Uuid, input: AddressInput) -> Result<Address> {
        let mut user = self.load(user_id).await?;
        let address = user.add_address(input).clone();
        self.save(&user).await?;
        Ok(address)
    }

    pub async fn update_address(&self, user_id: Uuid, address_id: Uuid, input: AddressInput) -> Result<Address> {
        let mut user = self.load(user_id).await?;
        let address = user.update_address(address_id, input)?.clone();
        self.save(&user).await?;
        Ok(address)
    }

    pub async fn remove_address(&self, user_id: Uuid, address_id: Uuid) -> Result<Vec<Address>> {
        let mut user = self.load(user_id).await?;
        user.remove_address(address_id)?;
        self.save(&user).await?;
        Ok(user.addresses)
    }

    pub async fn set_default_address(&self, user_id: Uuid, address_id: Uuid) -> Result<Vec<Address>> {
        let mut user = self.load(user_id).await?;
        user.set_default_address(address_id)?;
        self.save(&user).await?;
        Ok(user.addresses)
    }

    /// Wishlisted products that still exist, in the order they were added.
    pub async fn wishlist(&self, user_id: Uuid) -> Result<Vec<Product>> {
        let user = self.load(user_id).await?;
        let mut products = Vec::with_capacity(user.wishlist.len());
        for id in user.wishlist {
            if let Some(p) = self.repos.products.get(id).await? { products.push(p); }
        }
        Ok(products)
    }

    pub async fn add_to_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<Vec<Uuid>> {
        if self.repos.products.get(product_id).await?.is_none() { return Err(EcommerceError::NotFound("Product")); }
        let mut user = self.load(user_id).await?;
        if user.add_to_wishlist(product_id) { self.save(&user).await?; }
        Ok(user.wishlist)
    }

    pub async fn remove_from_wishlist(&self, user_id: Uuid, product_id: Uuid) -> Result<Vec<Uuid>> {
        let mut user = self.load(user_id).await?;
        if user.remove_from_wishlist(product_id) { self.save(&user).await?; }
        Ok(user.wishlist)
    }

    pub async fn notifications(&self, user_id: Uuid) -> Result<NotificationPreferences> { Ok(self.load(user_id).await?.notifications) }

    pub async fn update_notifications(&self, user_id: Uuid, prefs: NotificationPreferences) -> Result<NotificationPreferences> {
        let mut user = self.load(user_id).await?;
        user.set_notifications(prefs);
        self.save(&user).await?;
        Ok(user.notifications)
    }

    /// Customer list for the back office, newest first, with spend over non-cancelled orders.
    pub async fn customers(&self) -> Result<Vec<CustomerSummary>> {
        let (users, orders) = tokio::try_join!(self.repos.users.all(), self.repos.orders.all())?;
        let mut spend: HashMap<Uuid, (u32, Money, Option<DateTime<Utc>>)> = HashMap::new();
        for order in orders.iter().filter(|o| o.status != OrderStatus::Cancelled) {
            let entry = spend.entry(order.user_id).or_insert((0, Money::ZERO, None));
            entry.0 += 1;
            entry.1 = entry.1.add(&order.total);
            entry.2 = entry.2.max(Some(order.created_at));
        }
        let mut out: Vec<CustomerSummary> = users.iter().filter(|u| !u.role.is_admin()).map(|u| {
            let (order_count, total_spent, last_order_at) = spend.get(&u.id).copied().unwrap_or((0, Money::ZERO, None));
            CustomerSummary { profile: u.profile(), order_count, total_spent, last_order_at }
        }).collect();
        out.sort_by(|a, b| b.profile.created_at.cmp(&a.profile.created_at));
        Ok(out)
    }
}
