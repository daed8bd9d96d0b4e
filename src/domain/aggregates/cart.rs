//! Cart snapshot and checkout draft
//!
//! The cart itself lives on the client. What reaches the server is a snapshot of
//! it, frozen at submission time, and the [`OrderDraft`] built from it that has to
//! survive an off-site payment redirect.

use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::order::{checked_line_total, AppliedDiscount, LineItem, LineRejection, PaymentMethod, MAX_LINE_QUANTITY};
use crate::domain::value_objects::Money;

#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cart {
    items: Vec<CartItem>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CartItem {
    pub product_id: Uuid,
    pub name: String,
    pub price: Money,
    pub quantity: u32,
    #[serde(default)]
    pub image: Option<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
}

impl CartItem {
    pub fn line_total(&self) -> Money { self.price.multiply(self.quantity) }

    fn checked_total(&self) -> Result<Money, CartError> {
        checked_line_total(self.price, self.quantity).map_err(|r| match r {
            LineRejection::NotPositive => CartError::InvalidLine(self.name.clone()),
            LineRejection::OverLimit => CartError::LineTooLarge(self.name.clone()),
        })
    }
}

impl Cart {
    pub fn new() -> Self { Self::default() }
    /// Builds a cart from a submitted snapshot. Every merged line must be
    /// positive and within the checkout limits, and the subtotal must fit.
    pub fn from_items(items: impl IntoIterator<Item = CartItem>) -> Result<Self, CartError> {
        let mut cart = Self::new();
        for item in items { cart.add_item(item)?; }
        cart.items.iter().try_fold(Money::ZERO, |sum, item| {
            sum.checked_add(&item.checked_total()?).ok_or_else(|| CartError::LineTooLarge(item.name.clone()))
        })?;
        Ok(cart)
    }

    pub fn items(&self) -> &[CartItem] { &self.items }
    pub fn item_count(&self) -> usize { self.items.len() }
    pub fn is_empty(&self) -> bool { self.items.is_empty() }
    pub fn subtotal(&self) -> Money { self.items.iter().map(CartItem::line_total).sum() }

    pub fn add_item(&mut self, item: CartItem) -> Result<(), CartError> {
        if let Some(existing) = self.items.iter_mut().find(|i| i.product_id == item.product_id) {
            existing.quantity = existing.quantity.checked_add(item.quantity)
                .filter(|q| *q <= MAX_LINE_QUANTITY)
                .ok_or_else(|| CartError::LineTooLarge(item.name.clone()))?;
        } else {
            self.items.push(item);
        }
        Ok(())
    }

    pub fn update_quantity(&mut self, product_id: Uuid, quantity: u32) -> Result<(), CartError> {
        let item = self.items.iter_mut().find(|i| i.product_id == product_id).ok_or(CartError::ItemNotFound)?;
        if quantity > MAX_LINE_QUANTITY { return Err(CartError::LineTooLarge(item.name.clone())); }
        if quantity == 0 { self.items.retain(|i| i.product_id != product_id); }
        else { item.quantity = quantity; }
        Ok(())
    }

    pub fn remove_item(&mut self, product_id: Uuid) -> Result<(), CartError> {
        let before = self.items.len();
        self.items.retain(|i| i.product_id != product_id);
        if self.items.len() == before { return Err(CartError::ItemNotFound); }
        Ok(())
    }

    pub fn line_items(&self) -> Vec<LineItem> {
        self.items.iter().map(|i| LineItem { product_id: i.product_id, name: i.name.clone(), price: i.price, quantity: i.quantity, image: i.image.clone() }).collect()
    }
}

/// Pending order snapshot carried across the payment redirect.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderDraft {
    pub items: Vec<LineItem>,
    pub address_id: Uuid,
    pub payment_method: PaymentMethod,
    pub subtotal: Money,
    #[serde(default)]
    pub shipping_fee: Money,
    #[serde(default)]
    pub discount: Option<AppliedDiscount>,
    pub total: Money,
    /// True when rebuilt from the bare cart instead of a full snapshot.
    #[serde(default)]
    pub degraded: bool,
}

impl OrderDraft {
    pub fn new(cart: &Cart, address_id: Uuid, payment_method: PaymentMethod, shipping_fee: Money, discount: Option<AppliedDiscount>) -> Self {
        let subtotal = cart.subtotal();
        let discount_amount = discount.as_ref().map(|d| d.amount).unwrap_or(Money::ZERO);
        let total = subtotal.add(&shipping_fee).sub_floor(&discount_amount);
        Self { items: cart.line_items(), address_id, payment_method, subtotal, shipping_fee, discount, total, degraded: false }
    }

    /// Rebuilds a draft from the persisted cart alone. Shipping and discount
    /// breakdown is lost, so the total is the bare subtotal.
    pub fn from_cart_fallback(cart: &Cart, address_id: Uuid, payment_method: PaymentMethod) -> Option<Self> {
        if cart.is_empty() { return None; }
        let subtotal = cart.subtotal();
        Some(Self { items: cart.line_items(), address_id, payment_method, subtotal, shipping_fee: Money::ZERO, discount: None, total: subtotal, degraded: true })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum CartError { ItemNotFound, InvalidLine(String), LineTooLarge(String) }
impl std::error::Error for CartError {}
impl std::fmt::Display for CartError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ItemNotFound => write!(f, "Item not found in cart"),
            Self::InvalidLine(name) => write!(f, "Invalid price or quantity for {}", name),
            Self::LineTooLarge(name) => write!(f, "Price or quantity too large for {}", name),
        }
    }
}
