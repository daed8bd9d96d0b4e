//! Product Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{Money, Sku, Slug, SlugError};
use crate::domain::events::{DomainEvent, ProductEvent};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: Uuid,
    pub name: String,
    pub slug: Slug,
    pub description: String,
    pub price: Money,
    /// Sale percentage applied when `is_on_sale` is set.
    pub discount: Option<Decimal>,
    pub is_on_sale: bool,
    pub discount_price: Option<Money>,
    pub stock: u32,
    pub images: Vec<String>,
    pub category_id: Option<Uuid>,
    pub brand_id: Option<Uuid>,
    pub tags: Vec<String>,
    pub variants: Vec<Variant>,
    pub rating: f64,
    pub review_count: u32,
    pub status: ProductStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Variant {
    pub attributes: Vec<VariantAttribute>,
    pub price: Money,
    #[serde(default)]
    pub sale_price: Option<Money>,
    pub inventory: u32,
    #[serde(default = "default_true")]
    pub is_available: bool,
    #[serde(default)]
    pub images: Vec<String>,
    pub sku: Sku,
}

fn default_true() -> bool { true }

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct VariantAttribute { #[serde(rename = "type")] pub kind: String, pub value: String }

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProductStatus { #[default] Draft, Published, Archived }

/// Editable fields of a product.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductDetails {
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub price: Money,
    #[serde(default)]
    pub discount: Option<Decimal>,
    #[serde(default)]
    pub is_on_sale: bool,
    #[serde(default)]
    pub stock: u32,
    #[serde(default)]
    pub images: Vec<String>,
    #[serde(default)]
    pub category_id: Option<Uuid>,
    #[serde(default)]
    pub brand_id: Option<Uuid>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub variants: Vec<Variant>,
    #[serde(default)]
    pub status: ProductStatus,
}

impl ProductDetails {
    fn check(&self) -> Result<(), ProductError> {
        if self.name.trim().is_empty() { return Err(ProductError::MissingName); }
        if self.price.is_zero() || self.price.is_negative() { return Err(ProductError::InvalidPrice); }
        if self.discount.is_some_and(|d| d <= Decimal::ZERO || d > Decimal::ONE_HUNDRED) { return Err(ProductError::InvalidDiscount); }
        let mut seen = std::collections::HashSet::new();
        if let Some(dup) = self.variants.iter().find(|v| !seen.insert(v.sku.clone())) { return Err(ProductError::DuplicateSku(dup.sku.to_string())); }
        Ok(())
    }
}

impl Product {
    pub fn create(details: ProductDetails) -> Result<Self, ProductError> {
        details.check()?;
        let now = Utc::now();
        let mut product = Self {
            id: Uuid::now_v7(), slug: Slug::from_name(&details.name)?, name: details.name.trim().to_string(), description: details.description,
            price: details.price, discount: details.discount, is_on_sale: details.is_on_sale, discount_price: None, stock: details.stock,
            images: details.images, category_id: details.category_id, brand_id: details.brand_id, tags: normalize_tags(details.tags),
            variants: details.variants, rating: 0.0, review_count: 0, status: details.status, created_at: now, updated_at: now, events: vec![],
        };
        product.recompute_sale_price();
        product.raise_event(DomainEvent::Product(ProductEvent::Created { product_id: product.id, slug: product.slug.to_string() }));
        Ok(product)
    }

    /// Applies new details; returns true when the name (and therefore the slug) changed.
    pub fn revise(&mut self, details: ProductDetails) -> Result<bool, ProductError> {
        details.check()?;
        let renamed = details.name.trim() != self.name;
        if renamed { self.slug = Slug::from_name(&details.name)?; }
        self.name = details.name.trim().to_string();
        self.description = details.description;
        self.price = details.price;
        self.discount = details.discount;
        self.is_on_sale = details.is_on_sale;
        self.stock = details.stock;
        self.images = details.images;
        self.category_id = details.category_id;
        self.brand_id = details.brand_id;
        self.tags = normalize_tags(details.tags);
        self.variants = details.variants;
        self.status = details.status;
        self.recompute_sale_price();
        self.touch();
        Ok(renamed)
    }

    pub fn set_slug(&mut self, slug: Slug) { self.slug = slug; }

    fn recompute_sale_price(&mut self) {
        self.discount_price = match self.discount {
            Some(pct) if self.is_on_sale => Some(self.price.sub_floor(&self.price.percent(pct))),
            _ => None,
        };
    }

    pub fn effective_price(&self) -> Money { self.discount_price.unwrap_or(self.price) }
    pub fn is_published(&self) -> bool { self.status == ProductStatus::Published }
    pub fn is_low_stock(&self, threshold: u32) -> bool { self.stock <= threshold }

    pub fn apply_rating(&mut self, rating: f64, review_count: u32) {
        self.rating = rating;
        self.review_count = review_count;
        self.touch();
        self.raise_event(DomainEvent::Product(ProductEvent::RatingChanged { product_id: self.id, rating, review_count }));
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }
    fn touch(&mut self) { self.updated_at = Utc::now(); }
}

fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = tags.into_iter().map(|t| t.trim().to_lowercase()).filter(|t| !t.is_empty()).collect();
    out.sort();
    out.dedup();
    out
}

#[derive(Debug, Clone, PartialEq)] pub enum ProductError { MissingName, InvalidPrice, InvalidDiscount, DuplicateSku(String), InvalidName }
impl From<SlugError> for ProductError { fn from(_: SlugError) -> Self { Self::InvalidName } }
impl std::error::Error for ProductError {}
impl std::fmt::Display for ProductError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::MissingName => write!(f, "Product name is required"),
            Self::InvalidPrice => write!(f, "Price must be greater than zero"),
            Self::InvalidDiscount => write!(f, "Discount must be between 0 and 100 percent"),
            Self::DuplicateSku(sku) => write!(f, "SKU {} is used more than once", sku),
            Self::InvalidName => write!(f, "Product name must contain at least one letter or digit"),
        }
    }
}
