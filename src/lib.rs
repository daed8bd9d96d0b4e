//! Storefront
//!
//! Server side of a small online shop: customer storefront plus admin back office.
//!
//! ## Features
//! - Product catalog with categories, brands, variants and reviews
//! - Accounts, address book, wishlist and notification preferences
//! - Discount codes with date windows, usage limits and allow-lists
//! - Cash-on-delivery checkout and eSewa / Khalti gateway checkout
//! - Admin analytics over orders, products and customers

pub mod api;
pub mod config;
pub mod domain;
pub mod payments;
pub mod services;
pub mod store;

use thiserror::Error;

use crate::domain::aggregates::{AddressError, CartError, DiscountError, OrderError, ProductError, ReviewError, TaxonomyError};
use crate::payments::PaymentError;
use crate::store::StoreError;

pub use config::Config;
pub use services::AppState;

// =============================================================================
// Error Types
// =============================================================================

#[derive(Error, Debug)]
pub enum EcommerceError {
    /// Malformed or missing request fields.
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    /// A well-formed request that breaks a business rule.
    #[error("{0}")]
    BusinessRule(String),

    #[error(transparent)]
    Payment(#[from] PaymentError),

    #[error("Upstream service error: {0}")]
    Upstream(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, EcommerceError>;

impl From<OrderError> for EcommerceError {
    fn from(e: OrderError) -> Self {
        match e {
            OrderError::NoItems | OrderError::InvalidLine(_) | OrderError::LineTooLarge(_) | OrderError::NegativeAmount => Self::Validation(e.to_string()),
            _ => Self::BusinessRule(e.to_string()),
        }
    }
}

impl From<DiscountError> for EcommerceError {
    fn from(e: DiscountError) -> Self {
        match e {
            DiscountError::NotFound => Self::NotFound("Discount code"),
            DiscountError::InvalidTerms(_) => Self::Validation(e.to_string()),
            _ => Self::BusinessRule(e.to_string()),
        }
    }
}

impl From<ProductError> for EcommerceError {
    fn from(e: ProductError) -> Self { Self::Validation(e.to_string()) }
}

impl From<TaxonomyError> for EcommerceError {
    fn from(e: TaxonomyError) -> Self {
        match e {
            TaxonomyError::InvalidName | TaxonomyError::SelfParent => Self::Validation(e.to_string()),
            _ => Self::BusinessRule(e.to_string()),
        }
    }
}

impl From<ReviewError> for EcommerceError {
    fn from(e: ReviewError) -> Self {
        match e {
            ReviewError::InvalidRating => Self::Validation(e.to_string()),
            ReviewError::AlreadyReviewed => Self::BusinessRule(e.to_string()),
        }
    }
}

impl From<AddressError> for EcommerceError {
    fn from(_: AddressError) -> Self { Self::NotFound("Address") }
}

impl From<CartError> for EcommerceError {
    fn from(e: CartError) -> Self {
        match e {
            CartError::ItemNotFound => Self::NotFound("Cart item"),
            _ => Self::Validation(e.to_string()),
        }
    }
}

impl From<validator::ValidationErrors> for EcommerceError {
    fn from(e: validator::ValidationErrors) -> Self {
        let mut fields: Vec<String> = e.field_errors().into_iter().map(|(field, errs)| {
            let detail = errs.iter().find_map(|err| err.message.as_ref().map(|m| m.to_string())).unwrap_or_else(|| "is invalid".to_string());
            format!("{} {}", field, detail)
        }).collect();
        fields.sort();
        Self::Validation(if fields.is_empty() { "Invalid request".to_string() } else { fields.join("; ") })
    }
}
