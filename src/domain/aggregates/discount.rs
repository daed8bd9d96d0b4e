//! Discount Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::value_objects::{DiscountCode, Money};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discount {
    pub id: Uuid,
    pub code: DiscountCode,
    #[serde(rename = "type")]
    pub kind: DiscountKind,
    pub value: Decimal,
    #[serde(default)]
    pub min_purchase: Option<Money>,
    #[serde(default)]
    pub max_discount: Option<Money>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    #[serde(default)]
    pub usage_limit: Option<u32>,
    #[serde(default)]
    pub usage_count: u32,
    #[serde(default)]
    pub applicable_products: Vec<Uuid>,
    #[serde(default)]
    pub applicable_categories: Vec<Uuid>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscountKind { Percentage, Fixed }

/// A cart line as the discount rules see it.
#[derive(Clone, Debug, PartialEq)]
pub struct DiscountLine { pub product_id: Uuid, pub category_id: Option<Uuid> }

#[derive(Clone, Debug)]
pub struct DiscountTerms {
    pub code: DiscountCode,
    pub kind: DiscountKind,
    pub value: Decimal,
    pub min_purchase: Option<Money>,
    pub max_discount: Option<Money>,
    pub start_date: DateTime<Utc>,
    pub end_date: DateTime<Utc>,
    pub usage_limit: Option<u32>,
    pub applicable_products: Vec<Uuid>,
    pub applicable_categories: Vec<Uuid>,
    pub is_active: bool,
}

impl DiscountTerms {
    fn check(&self) -> Result<(), DiscountError> {
        if self.value <= Decimal::ZERO { return Err(DiscountError::InvalidTerms("value must be positive")); }
        if self.kind == DiscountKind::Percentage && self.value > Decimal::ONE_HUNDRED { return Err(DiscountError::InvalidTerms("percentage cannot exceed 100")); }
        if self.end_date <= self.start_date { return Err(DiscountError::InvalidTerms("end date must be after start date")); }
        if self.usage_limit == Some(0) { return Err(DiscountError::InvalidTerms("usage limit must be at least 1")); }
        Ok(())
    }
}

impl Discount {
    pub fn create(terms: DiscountTerms) -> Result<Self, DiscountError> {
        terms.check()?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::now_v7(), code: terms.code, kind: terms.kind, value: terms.value, min_purchase: terms.min_purchase,
            max_discount: terms.max_discount, start_date: terms.start_date, end_date: terms.end_date, usage_limit: terms.usage_limit,
            usage_count: 0, applicable_products: terms.applicable_products, applicable_categories: terms.applicable_categories,
            is_active: terms.is_active, created_at: now, updated_at: now,
        })
    }

    /// Replaces the terms, keeping identity and the running usage count.
    pub fn revise(&mut self, terms: DiscountTerms) -> Result<(), DiscountError> {
        terms.check()?;
        self.code = terms.code; self.kind = terms.kind; self.value = terms.value;
        self.min_purchase = terms.min_purchase; self.max_discount = terms.max_discount;
        self.start_date = terms.start_date; self.end_date = terms.end_date; self.usage_limit = terms.usage_limit;
        self.applicable_products = terms.applicable_products; self.applicable_categories = terms.applicable_categories;
        self.is_active = terms.is_active;
        self.updated_at = Utc::now();
        Ok(())
    }

    pub fn has_allow_list(&self) -> bool { !self.applicable_products.is_empty() || !self.applicable_categories.is_empty() }

    fn applies_to(&self, line: &DiscountLine) -> bool {
        self.applicable_products.contains(&line.product_id) || line.category_id.is_some_and(|c| self.applicable_categories.contains(&c))
    }

    /// Checks usability against the cart and returns the discount amount.
    ///
    /// With a non-empty allow-list the code applies to the whole cart as soon as
    /// one line matches it.
    pub fn evaluate(&self, subtotal: Money, lines: &[DiscountLine], now: DateTime<Utc>) -> Result<Money, DiscountError> {
        if !self.is_active { return Err(DiscountError::Inactive); }
        if now < self.start_date { return Err(DiscountError::NotStarted); }
        if now > self.end_date { return Err(DiscountError::Expired); }
        if self.usage_limit.is_some_and(|limit| self.usage_count >= limit) { return Err(DiscountError::UsageLimitReached); }
        if let Some(min) = self.min_purchase {
            if subtotal < min { return Err(DiscountError::MinimumNotMet(min)); }
        }
        if self.has_allow_list() && !lines.iter().any(|l| self.applies_to(l)) { return Err(DiscountError::NotApplicable); }

        let amount = match self.kind {
            DiscountKind::Percentage => {
                let raw = subtotal.percent(self.value);
                match self.max_discount { Some(cap) if raw > cap => cap, _ => raw }
            }
            DiscountKind::Fixed => Money::new(self.value),
        };
        Ok(if amount > subtotal { subtotal } else { amount })
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DiscountError { NotFound, Inactive, NotStarted, Expired, UsageLimitReached, MinimumNotMet(Money), NotApplicable, InvalidTerms(&'static str) }
impl std::error::Error for DiscountError {}
impl std::fmt::Display for DiscountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound => write!(f, "Discount code not found"),
            Self::Inactive => write!(f, "This discount code is inactive"),
            Self::NotStarted => write!(f, "This discount code is not active yet"),
            Self::Expired => write!(f, "This discount code has expired"),
            Self::UsageLimitReached => write!(f, "This discount code has reached its usage limit"),
            Self::MinimumNotMet(min) => write!(f, "Minimum purchase of {} required for this discount", min),
            Self::NotApplicable => write!(f, "This discount code does not apply to the items in your cart"),
            Self::InvalidTerms(why) => write!(f, "Invalid discount: {}", why),
        }
    }
}
