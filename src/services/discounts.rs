//! Discount codes: validation at checkout and back-office administration.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Deserialize;
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::Repos;
use crate::domain::aggregates::{Discount, DiscountError, DiscountKind, DiscountLine, DiscountTerms};
use crate::domain::value_objects::{DiscountCode, Money};
use crate::store::StoreError;
use crate::{EcommerceError, Result};

/// Discount fields as submitted by the back office.
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DiscountInput {
    pub code: String,
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
    pub applicable_products: Vec<Uuid>,
    #[serde(default)]
    pub applicable_categories: Vec<Uuid>,
    #[serde(default = "active")]
    pub is_active: bool,
}

fn active() -> bool { true }

impl DiscountInput {
    fn into_terms(self) -> Result<DiscountTerms> {
        let code = DiscountCode::parse(&self.code).map_err(|e| EcommerceError::Validation(e.to_string()))?;
        Ok(DiscountTerms {
            code, kind: self.kind, value: self.value, min_purchase: self.min_purchase, max_discount: self.max_discount,
            start_date: self.start_date, end_date: self.end_date, usage_limit: self.usage_limit,
            applicable_products: self.applicable_products, applicable_categories: self.applicable_categories, is_active: self.is_active,
        })
    }
}

#[derive(Clone)]
pub struct Discounts {
    repos: Repos,
}

impl Discounts {
    pub fn new(repos: Repos) -> Self { Self { repos } }

    pub async fn by_code(&self, raw: &str) -> Result<Discount> {
        let code = DiscountCode::parse(raw).map_err(|_| DiscountError::NotFound)?;
        Ok(self.repos.discounts.find_one(json!({ "code": code.as_str() })).await?.ok_or(DiscountError::NotFound)?)
    }

    /// Validates `code` against the cart and returns the discount with its amount.
    /// Categories are read from the catalog, not taken from the client.
    #[instrument(skip(self, product_ids))]
    pub async fn quote(&self, code: &str, subtotal: Money, product_ids: &[Uuid]) -> Result<(Discount, Money)> {
        let discount = self.by_code(code).await?;
        let mut lines = Vec::with_capacity(product_ids.len());
        for &product_id in product_ids {
            let category_id = self.repos.products.get(product_id).await?.and_then(|p| p.category_id);
            lines.push(DiscountLine { product_id, category_id });
        }
        let amount = discount.evaluate(subtotal, &lines, Utc::now())?;
        Ok((discount, amount))
    }

    /// Counts one use. Best effort: a failure is logged and does not undo the order.
    pub async fn record_use(&self, discount_id: Uuid) {
        match self.repos.discounts.increment(discount_id, "usageCount", 1).await {
            Ok(true) => {}
            Ok(false) => warn!(%discount_id, "Discount vanished before its usage could be counted"),
            Err(e) => warn!(%discount_id, error = %e, "Failed to increment discount usage"),
        }
    }

    pub async fn list(&self) -> Result<Vec<Discount>> {
        let mut discounts = self.repos.discounts.all().await?;
        discounts.reverse();
        Ok(discounts)
    }

    #[instrument(skip(self, input), fields(code = %input.code))]
    pub async fn create(&self, input: DiscountInput) -> Result<Discount> {
        let discount = Discount::create(input.into_terms()?)?;
        match self.repos.discounts.insert(&discount).await {
            Err(StoreError::Duplicate(_)) => return Err(EcommerceError::Validation(format!("Discount code {} already exists", discount.code))),
            other => other?,
        }
        info!(discount_id = %discount.id, "Discount created");
        Ok(discount)
    }

    pub async fn update(&self, id: Uuid, input: DiscountInput) -> Result<Discount> {
        let mut discount = self.repos.discounts.get(id).await?.ok_or(EcommerceError::NotFound("Discount"))?;
        discount.revise(input.into_terms()?)?;
        match self.repos.discounts.save(&discount).await {
            Err(StoreError::Duplicate(_)) => return Err(EcommerceError::Validation(format!("Discount code {} already exists", discount.code))),
            other => { other?; }
        }
        Ok(discount)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        if self.repos.discounts.delete(id).await? { Ok(()) } else { Err(EcommerceError::NotFound("Discount")) }
    }
}
