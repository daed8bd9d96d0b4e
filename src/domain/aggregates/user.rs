//! User Aggregate

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;
use crate::domain::aggregates::order::ShippingAddress;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: Uuid,
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
    pub role: Role,
    pub provider: AuthProvider,
    #[serde(default)]
    pub addresses: Vec<Address>,
    #[serde(default)]
    pub notifications: NotificationPreferences,
    #[serde(default)]
    pub wishlist: Vec<Uuid>,
    #[serde(default)]
    pub vendor: Option<VendorProfile>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role { #[default] User, Admin, Superadmin }

impl Role {
    pub fn is_admin(&self) -> bool { matches!(self, Self::Admin | Self::Superadmin) }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthProvider { Credentials, Google, Facebook }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Address {
    pub id: Uuid,
    #[serde(default)]
    pub label: Option<String>,
    pub full_name: String,
    pub phone: String,
    pub street: String,
    pub city: String,
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    pub country: String,
    pub is_default: bool,
}

impl Address {
    pub fn to_shipping(&self) -> ShippingAddress {
        ShippingAddress { full_name: self.full_name.clone(), phone: self.phone.clone(), street: self.street.clone(), city: self.city.clone(), state: self.state.clone(), postal_code: self.postal_code.clone(), country: self.country.clone() }
    }
}

#[derive(Clone, Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddressInput {
    #[serde(default)]
    pub label: Option<String>,
    #[validate(length(min = 1, message = "is required"))]
    pub full_name: String,
    #[validate(length(min = 7, max = 20, message = "must be a valid phone number"))]
    pub phone: String,
    #[validate(length(min = 1, message = "is required"))]
    pub street: String,
    #[validate(length(min = 1, message = "is required"))]
    pub city: String,
    #[validate(length(min = 1, message = "is required"))]
    pub state: String,
    #[serde(default)]
    pub postal_code: String,
    #[serde(default = "default_country")]
    pub country: String,
    #[serde(default)]
    pub is_default: bool,
}

fn default_country() -> String { "Nepal".to_string() }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationPreferences { pub order_updates: bool, pub promotions: bool, pub newsletter: bool, pub sms: bool }

impl Default for NotificationPreferences {
    fn default() -> Self { Self { order_updates: true, promotions: false, newsletter: false, sms: false } }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VendorProfile { pub store_name: String, #[serde(default)] pub description: Option<String>, #[serde(default)] pub verified: bool }

/// Identity asserted by an external OAuth provider.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OAuthProfile { pub provider: AuthProvider, pub email: String, pub name: String, #[serde(default)] pub image: Option<String> }

/// Public view of a user; never carries the password hash.
#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile { pub id: Uuid, pub name: String, pub email: String, pub image: Option<String>, pub phone: Option<String>, pub role: Role, pub provider: AuthProvider, pub created_at: DateTime<Utc> }

pub fn normalize_email(email: &str) -> String { email.trim().to_lowercase() }

impl User {
    fn new(name: String, email: &str, provider: AuthProvider) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::now_v7(), name: name.trim().to_string(), email: normalize_email(email), password_hash: None, image: None, phone: None,
            role: Role::User, provider, addresses: vec![], notifications: NotificationPreferences::default(), wishlist: vec![], vendor: None,
            created_at: now, updated_at: now,
        }
    }

    pub fn register(name: String, email: &str, password_hash: String) -> Self {
        let mut user = Self::new(name, email, AuthProvider::Credentials);
        user.password_hash = Some(password_hash);
        user
    }

    pub fn from_oauth(profile: OAuthProfile) -> Self {
        let mut user = Self::new(profile.name, &profile.email, profile.provider);
        user.image = profile.image;
        user
    }

    /// Folds a repeat OAuth sign-in into the stored account. The role is never touched.
    pub fn merge_oauth(&mut self, profile: OAuthProfile) {
        if self.name.is_empty() { self.name = profile.name.trim().to_string(); }
        if self.image.is_none() { self.image = profile.image; }
        self.touch();
    }

    pub fn profile(&self) -> UserProfile {
        UserProfile { id: self.id, name: self.name.clone(), email: self.email.clone(), image: self.image.clone(), phone: self.phone.clone(), role: self.role, provider: self.provider, created_at: self.created_at }
    }

    pub fn update_profile(&mut self, name: String, phone: Option<String>, image: Option<String>) {
        self.name = name.trim().to_string();
        self.phone = phone;
        self.image = image;
        self.touch();
    }

    pub fn find_address(&self, id: Uuid) -> Option<&Address> { self.addresses.iter().find(|a| a.id == id) }
    pub fn default_address(&self) -> Option<&Address> { self.addresses.iter().find(|a| a.is_default) }

    /// The first address always becomes the default.
    pub fn add_address(&mut self, input: AddressInput) -> &Address {
        let make_default = input.is_default || self.addresses.is_empty();
        if make_default { self.clear_default(); }
        self.addresses.push(Address {
            id: Uuid::now_v7(), label: input.label, full_name: input.full_name, phone: input.phone, street: input.street, city: input.city,
            state: input.state, postal_code: input.postal_code, country: input.country, is_default: make_default,
        });
        self.touch();
        &self.addresses[self.addresses.len() - 1]
    }

    pub fn update_address(&mut self, id: Uuid, input: AddressInput) -> Result<&Address, AddressError> {
        let idx = self.addresses.iter().position(|a| a.id == id).ok_or(AddressError::NotFound)?;
        if input.is_default { self.clear_default(); }
        let address = &mut self.addresses[idx];
        address.label = input.label; address.full_name = input.full_name; address.phone = input.phone;
        address.street = input.street; address.city = input.city; address.state = input.state;
        address.postal_code = input.postal_code; address.country = input.country; address.is_default = input.is_default;
        self.touch();
        Ok(&self.addresses[idx])
    }

    /// Removing the default promotes the oldest remaining address.
    pub fn remove_address(&mut self, id: Uuid) -> Result<(), AddressError> {
        let idx = self.addresses.iter().position(|a| a.id == id).ok_or(AddressError::NotFound)?;
        let removed = self.addresses.remove(idx);
        if removed.is_default {
            if let Some(first) = self.addresses.first_mut() { first.is_default = true; }
        }
        self.touch();
        Ok(())
    }

    pub fn set_default_address(&mut self, id: Uuid) -> Result<(), AddressError> {
        if self.find_address(id).is_none() { return Err(AddressError::NotFound); }
        for a in &mut self.addresses { a.is_default = a.id == id; }
        self.touch();
        Ok(())
    }

    /// Returns false when the product was already listed.
    pub fn add_to_wishlist(&mut self, product_id: Uuid) -> bool {
        if self.wishlist.contains(&product_id) { return false; }
        self.wishlist.push(product_id);
        self.touch();
        true
    }

    pub fn remove_from_wishlist(&mut self, product_id: Uuid) -> bool {
        let before = self.wishlist.len();
        self.wishlist.retain(|p| *p != product_id);
        self.touch();
        before != self.wishlist.len()
    }

    pub fn set_notifications(&mut self, prefs: NotificationPreferences) { self.notifications = prefs; self.touch(); }

    fn clear_default(&mut self) { for a in &mut self.addresses { a.is_default = false; } }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum AddressError { NotFound }
impl std::error::Error for AddressError {}
impl std::fmt::Display for AddressError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result { write!(f, "Address not found") }
}
