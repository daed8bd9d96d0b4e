//! Value Objects for the storefront

use chrono::{DateTime, Utc};
use rand::{distributions::Alphanumeric, Rng};
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use std::fmt;

/// SKU (Stock Keeping Unit) value object
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Sku(String);

impl Sku {
    pub fn new(value: impl Into<String>) -> Result<Self, SkuError> {
        let value = value.into().trim().to_uppercase();
        if value.is_empty() { return Err(SkuError::Empty); }
        if value.len() > 50 { return Err(SkuError::TooLong); }
        Ok(Self(value))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for Sku { type Error = SkuError; fn try_from(v: String) -> Result<Self, SkuError> { Self::new(v) } }
impl From<Sku> for String { fn from(s: Sku) -> String { s.0 } }

impl fmt::Display for Sku {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{}", self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum SkuError { Empty, TooLong }
impl std::error::Error for SkuError {}
impl fmt::Display for SkuError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self { Self::Empty => write!(f, "SKU cannot be empty"), Self::TooLong => write!(f, "SKU must be at most 50 characters") }
    }
}

/// Money value object. Amounts are always held rounded to cents (half away from zero).
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(from = "Decimal", into = "Decimal")]
pub struct Money(Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    pub fn new(amount: Decimal) -> Self { Self(amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)) }
    pub fn from_major(units: i64) -> Self { Self::new(Decimal::from(units)) }
    /// Builds an amount from minor units (paisa / cents).
    pub fn from_minor(units: i64) -> Self { Self::new(Decimal::new(units, 2)) }
    pub fn amount(&self) -> Decimal { self.0 }
    pub fn minor_units(&self) -> i64 { self.0.checked_mul(Decimal::ONE_HUNDRED).and_then(|d| d.trunc().try_into().ok()).unwrap_or(i64::MAX) }
    pub fn is_zero(&self) -> bool { self.0.is_zero() }
    pub fn is_negative(&self) -> bool { self.0.is_sign_negative() && !self.0.is_zero() }
    /// Saturating sum. Amounts built from client input go through [`Money::checked_add`] instead.
    pub fn add(&self, other: &Money) -> Money { Money::new(self.0.saturating_add(other.0)) }
    pub fn checked_add(&self, other: &Money) -> Option<Money> { self.0.checked_add(other.0).map(Money::new) }
    /// Subtracts, flooring the result at zero.
    pub fn sub_floor(&self, other: &Money) -> Money { if other.0 >= self.0 { Money::ZERO } else { Money::new(self.0.saturating_sub(other.0)) } }
    /// Saturating product, for lines already bounded at checkout.
    pub fn multiply(&self, qty: u32) -> Money { Money::new(self.0.saturating_mul(Decimal::from(qty))) }
    pub fn checked_multiply(&self, qty: u32) -> Option<Money> { self.0.checked_mul(Decimal::from(qty)).map(Money::new) }
    pub fn percent(&self, pct: Decimal) -> Money { Money::new(self.0.saturating_mul(pct) / Decimal::ONE_HUNDRED) }
    /// Equal within one minor unit.
    pub fn approx_eq(&self, other: &Money) -> bool { self.0.checked_sub(other.0).is_some_and(|d| d.abs() <= Decimal::new(1, 2)) }
}

impl From<Decimal> for Money { fn from(d: Decimal) -> Self { Money::new(d) } }
impl From<Money> for Decimal { fn from(m: Money) -> Decimal { m.0 } }
impl std::iter::Sum for Money { fn sum<I: Iterator<Item = Money>>(iter: I) -> Money { iter.fold(Money::ZERO, |a, b| a.add(&b)) } }

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "{:.2}", self.0) }
}

/// URL slug derived from a display name.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Slug(String);

impl Slug {
    pub fn from_name(name: &str) -> Result<Self, SlugError> {
        let mut out = String::with_capacity(name.len());
        for c in name.trim().chars().filter(|c| *c != '\'' && *c != '\u{2019}') {
            if c.is_ascii_alphanumeric() { out.push(c.to_ascii_lowercase()); }
            else if !out.is_empty() && !out.ends_with('-') { out.push('-'); }
        }
        let trimmed = out.trim_end_matches('-');
        if trimmed.is_empty() { return Err(SlugError); }
        Ok(Self(trimmed.to_string()))
    }
    /// `shirt` -> `shirt-2`, used when the base slug is already taken.
    pub fn with_suffix(&self, n: u32) -> Slug { Slug(format!("{}-{}", self.0, n)) }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for Slug {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub struct SlugError;
impl std::error::Error for SlugError {}
impl fmt::Display for SlugError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { write!(f, "Name must contain at least one letter or digit") }
}

/// Promotional code: uppercase ASCII letters and digits.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DiscountCode(String);

impl DiscountCode {
    pub fn parse(raw: &str) -> Result<Self, DiscountCodeError> {
        let code = raw.trim().to_uppercase();
        if code.len() < 3 || code.len() > 20 { return Err(DiscountCodeError::Length); }
        if !code.chars().all(|c| c.is_ascii_alphanumeric()) { return Err(DiscountCodeError::Charset); }
        Ok(Self(code))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl TryFrom<String> for DiscountCode { type Error = DiscountCodeError; fn try_from(v: String) -> Result<Self, Self::Error> { Self::parse(&v) } }
impl From<DiscountCode> for String { fn from(c: DiscountCode) -> String { c.0 } }

impl fmt::Display for DiscountCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}

#[derive(Debug, Clone, PartialEq, Eq)] pub enum DiscountCodeError { Length, Charset }
impl std::error::Error for DiscountCodeError {}
impl fmt::Display for DiscountCodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Length => write!(f, "Discount code must be 3-20 characters"),
            Self::Charset => write!(f, "Discount code may only contain letters and digits"),
        }
    }
}

/// Human-readable order number, e.g. `ORD-261019-7QK2ZD`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct OrderNumber(String);

impl OrderNumber {
    pub fn generate(at: DateTime<Utc>) -> Self {
        let suffix: String = rand::thread_rng().sample_iter(&Alphanumeric).take(6).map(|b| (b as char).to_ascii_uppercase()).collect();
        Self(format!("ORD-{}-{}", at.format("%y%m%d"), suffix))
    }
    pub fn as_str(&self) -> &str { &self.0 }
}

impl fmt::Display for OrderNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
}
