//! Payment gateways
//!
//! Both processors hand control back with a plain browser redirect whose query
//! string carries a provider-specific payload. Each adapter turns that payload
//! into a [`NormalizedPayment`]; known failure codes short-circuit before any
//! decoding is attempted.

pub mod esewa;
pub mod khalti;

use async_trait::async_trait;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

use crate::domain::aggregates::{PaymentDetails, PaymentMethod, PendingPayment, UserProfile};
use crate::domain::value_objects::Money;

pub use esewa::EsewaGateway;
pub use khalti::KhaltiGateway;

pub type QueryParams = HashMap<String, String>;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentProvider { Esewa, Khalti }

impl PaymentProvider {
    pub fn parse(raw: &str) -> Result<Self, PaymentError> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "esewa" => Ok(Self::Esewa),
            "khalti" => Ok(Self::Khalti),
            other => Err(PaymentError::UnknownProvider(other.to_string())),
        }
    }
    pub fn as_str(&self) -> &'static str { match self { Self::Esewa => "esewa", Self::Khalti => "khalti" } }
    pub fn method(&self) -> PaymentMethod { match self { Self::Esewa => PaymentMethod::Esewa, Self::Khalti => PaymentMethod::Khalti } }
}

impl fmt::Display for PaymentProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(self.as_str()) }
}

/// Failure codes a processor can put on the return URL.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum GatewayErrorCode { UserCanceled, Timeout, InvalidAmount, PaymentFailed, Other(String) }

impl GatewayErrorCode {
    pub fn parse(code: &str) -> Self {
        match code.trim().to_ascii_lowercase().replace([' ', '-'], "_").as_str() {
            "user_canceled" | "user_cancelled" | "canceled" | "cancelled" => Self::UserCanceled,
            "timeout" | "expired" => Self::Timeout,
            "invalid_amount" => Self::InvalidAmount,
            "payment_failed" | "failed" => Self::PaymentFailed,
            _ => Self::Other(code.to_string()),
        }
    }

    pub fn message(&self) -> String {
        match self {
            Self::UserCanceled => "Payment was cancelled. Your cart has been kept so you can try again.".into(),
            Self::Timeout => "The payment session timed out. Please try again.".into(),
            Self::InvalidAmount => "The payment amount was invalid. Please review your order and try again.".into(),
            Self::PaymentFailed => "The payment could not be completed. Please try again or choose another payment method.".into(),
            Self::Other(code) => format!("Payment failed: {}", code),
        }
    }
}

#[derive(Debug, Error)]
pub enum PaymentError {
    #[error("{}", .0.message())]
    Gateway(GatewayErrorCode),
    #[error("Payment verification failed: {0}")]
    VerificationFailed(String),
    #[error("Your checkout session has expired. Please return to your cart and try again.")]
    SessionExpired,
    #[error("We could not reach the payment provider. Please check your connection and try again.")]
    Network(String),
    #[error("Invalid payment request: {0}")]
    InvalidRequest(String),
    #[error("Unknown payment provider: {0}")]
    UnknownProvider(String),
    #[error("Payment service is temporarily unavailable. Please try again later.")]
    Unavailable(String),
}

impl PaymentError {
    /// Stable category the checkout page keys its copy on.
    pub fn category(&self) -> &'static str {
        match self {
            Self::Gateway(GatewayErrorCode::UserCanceled) => "cancelled",
            Self::Gateway(GatewayErrorCode::Timeout) => "timeout",
            Self::Gateway(GatewayErrorCode::InvalidAmount) => "invalid_amount",
            Self::Gateway(_) => "payment_failed",
            Self::VerificationFailed(_) | Self::UnknownProvider(_) => "verification_failed",
            Self::SessionExpired => "session_expired",
            Self::Network(_) => "network",
            Self::InvalidRequest(_) => "invalid_request",
            Self::Unavailable(_) => "server_error",
        }
    }
}

impl From<reqwest::Error> for PaymentError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_decode() || e.is_status() { Self::VerificationFailed(e.to_string()) } else { Self::Network(e.to_string()) }
    }
}

/// Returns the processor-reported failure, if the return URL carries one.
pub fn check_gateway_error(params: &QueryParams) -> Result<(), PaymentError> {
    if let Some(code) = params.get("error").filter(|c| !c.trim().is_empty()) {
        return Err(PaymentError::Gateway(GatewayErrorCode::parse(code)));
    }
    if let Some(status) = params.get("status") {
        match GatewayErrorCode::parse(status) {
            code @ (GatewayErrorCode::UserCanceled | GatewayErrorCode::Timeout | GatewayErrorCode::PaymentFailed) => return Err(PaymentError::Gateway(code)),
            _ => {}
        }
    }
    Ok(())
}

/// Provider-independent view of a returned payment.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NormalizedPayment {
    pub transaction_id: String,
    pub provider: PaymentProvider,
    pub amount: Money,
    pub ref_id: Option<String>,
    pub status: String,
    /// Our own pending-payment reference, when the processor echoed it.
    pub reference: Option<String>,
    pub raw: serde_json::Value,
}

impl NormalizedPayment {
    pub fn into_details(self) -> PaymentDetails {
        PaymentDetails {
            transaction_id: self.transaction_id, provider: self.provider.as_str().to_string(), amount: self.amount, ref_id: self.ref_id,
            metadata: serde_json::json!({ "status": self.status, "reference": self.reference, "payload": self.raw }),
        }
    }
}

/// Where to send the browser to pay.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Redirect { pub method: &'static str, pub url: String, pub fields: BTreeMap<String, String> }

#[derive(Clone, Debug)]
pub struct InitiatedPayment { pub redirect: Redirect, pub gateway_token: Option<String> }

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    fn provider(&self) -> PaymentProvider;
    async fn initiate(&self, pending: &PendingPayment, customer: &UserProfile) -> Result<InitiatedPayment, PaymentError>;
    fn decode(&self, params: &QueryParams) -> Result<NormalizedPayment, PaymentError>;
    /// Confirms the payment with the processor itself.
    async fn verify(&self, payment: &NormalizedPayment) -> Result<(), PaymentError>;
}

/// Configured gateways, looked up by provider.
#[derive(Clone, Default)]
pub struct Gateways {
    by_provider: HashMap<PaymentProvider, Arc<dyn PaymentGateway>>,
}

impl Gateways {
    pub fn new() -> Self { Self::default() }

    pub fn with(mut self, gateway: Arc<dyn PaymentGateway>) -> Self {
        self.by_provider.insert(gateway.provider(), gateway);
        self
    }

    pub fn get(&self, provider: PaymentProvider) -> Result<&Arc<dyn PaymentGateway>, PaymentError> {
        self.by_provider.get(&provider).ok_or_else(|| PaymentError::Unavailable(format!("{} is not configured", provider)))
    }
}

pub(crate) fn parse_amount(raw: &str) -> Option<Money> {
    raw.trim().replace(',', "").parse::<rust_decimal::Decimal>().ok().filter(|d| !d.is_sign_negative()).map(Money::new)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams { pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }

    #[test]
    fn test_known_error_codes_short_circuit() {
        for (code, category) in [("user_canceled", "cancelled"), ("timeout", "timeout"), ("invalid_amount", "invalid_amount"), ("payment_failed", "payment_failed")] {
            let err = check_gateway_error(&params(&[("error", code)])).unwrap_err();
            assert_eq!(err.category(), category);
        }
        let err = check_gateway_error(&params(&[("error", "user_canceled")])).unwrap_err();
        assert_eq!(err.to_string(), "Payment was cancelled. Your cart has been kept so you can try again.");
    }

    #[test]
    fn test_khalti_status_cancellation() {
        let err = check_gateway_error(&params(&[("pidx", "abc"), ("status", "User canceled")])).unwrap_err();
        assert!(matches!(err, PaymentError::Gateway(GatewayErrorCode::UserCanceled)));
        assert!(check_gateway_error(&params(&[("pidx", "abc"), ("status", "Completed")])).is_ok());
    }

    #[test]
    fn test_provider_parse() {
        assert_eq!(PaymentProvider::parse("eSewa").unwrap(), PaymentProvider::Esewa);
        assert!(matches!(PaymentProvider::parse("paypal"), Err(PaymentError::UnknownProvider(_))));
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("1,100.0"), Some(Money::from_major(1100)));
        assert_eq!(parse_amount("-1"), None);
        assert_eq!(parse_amount("abc"), None);
    }
}
