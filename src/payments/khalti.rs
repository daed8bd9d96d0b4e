//! Khalti ePayment
//!
//! Initiation is a server-side call that returns a `pidx` and a hosted payment
//! page. The buyer comes back with `pidx`, `status` and amounts in paisa.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::{parse_amount, GatewayErrorCode, InitiatedPayment, NormalizedPayment, PaymentError, PaymentGateway, PaymentProvider, QueryParams, Redirect};
use crate::config::KhaltiConfig;
use crate::domain::aggregates::{PendingPayment, UserProfile};
use crate::domain::value_objects::Money;

pub struct KhaltiGateway {
    config: KhaltiConfig,
    http: reqwest::Client,
    public_base_url: String,
    remote_verify: bool,
}

#[derive(Deserialize)]
struct InitiateResponse { pidx: String, payment_url: String }

#[derive(Deserialize)]
struct LookupResponse { status: String, total_amount: i64, #[serde(default)] transaction_id: Option<String> }

/// Paisa amount as rupees.
fn paisa(raw: &str) -> Option<Money> {
    let paisa = parse_amount(raw)?;
    Some(Money::new(paisa.amount() / rust_decimal::Decimal::ONE_HUNDRED))
}

/// Decodes Khalti's return parameters without contacting Khalti.
pub fn decode_return(params: &QueryParams) -> Result<NormalizedPayment, PaymentError> {
    let pidx = params.get("pidx").filter(|p| !p.trim().is_empty())
        .ok_or_else(|| PaymentError::VerificationFailed("Khalti pidx is missing".into()))?;
    let status = params.get("status").cloned().unwrap_or_else(|| "Completed".to_string());
    match status.as_str() {
        "Completed" => {}
        "Pending" | "Initiated" => return Err(PaymentError::VerificationFailed("Khalti reports the payment as still pending".into())),
        _ => return Err(PaymentError::Gateway(GatewayErrorCode::PaymentFailed)),
    }
    let amount = ["amount", "total_amount", "amt"].iter().find_map(|k| params.get(*k)).and_then(|a| paisa(a))
        .ok_or(PaymentError::Gateway(GatewayErrorCode::InvalidAmount))?;
    let ref_id = ["transaction_id", "tidx", "refId"].iter().find_map(|k| params.get(*k)).filter(|r| !r.is_empty()).cloned();
    Ok(NormalizedPayment {
        transaction_id: pidx.clone(), provider: PaymentProvider::Khalti, amount, ref_id, status,
        reference: params.get("purchase_order_id").cloned(), raw: serde_json::to_value(params).unwrap_or(Value::Null),
    })
}

impl KhaltiGateway {
    pub fn new(config: KhaltiConfig, http: reqwest::Client, public_base_url: &str, remote_verify: bool) -> Self {
        Self { config, http, public_base_url: public_base_url.to_string(), remote_verify }
    }

    fn authorization(&self) -> Result<String, PaymentError> {
        self.config.secret_key.as_ref().map(|key| format!("Key {}", key)).ok_or_else(|| PaymentError::Unavailable("Khalti secret key is not configured".into()))
    }
}

#[async_trait]
impl PaymentGateway for KhaltiGateway {
    fn provider(&self) -> PaymentProvider { PaymentProvider::Khalti }

    #[instrument(skip(self, pending, customer), fields(reference = %pending.reference))]
    async fn initiate(&self, pending: &PendingPayment, customer: &UserProfile) -> Result<InitiatedPayment, PaymentError> {
        let body = json!({
            "return_url": format!("{}/payment/khalti/return", self.public_base_url),
            "website_url": self.public_base_url,
            "amount": pending.draft.total.minor_units(),
            "purchase_order_id": pending.reference,
            "purchase_order_name": format!("Order {}", pending.reference),
            "customer_info": { "name": customer.name, "email": customer.email, "phone": customer.phone },
        });
        let resp = self.http.post(format!("{}/epayment/initiate/", self.config.base_url))
            .header(reqwest::header::AUTHORIZATION, self.authorization()?).json(&body).send().await?;
        if !resp.status().is_success() {
            let detail = resp.text().await.unwrap_or_default();
            return Err(PaymentError::InvalidRequest(format!("Khalti rejected the payment: {}", detail)));
        }
        let started: InitiateResponse = resp.json().await?;
        debug!(pidx = %started.pidx, "Khalti payment initiated");
        Ok(InitiatedPayment {
            redirect: Redirect { method: "GET", url: started.payment_url, fields: BTreeMap::new() },
            gateway_token: Some(started.pidx),
        })
    }

    fn decode(&self, params: &QueryParams) -> Result<NormalizedPayment, PaymentError> { decode_return(params) }

    #[instrument(skip(self, payment), fields(pidx = %payment.transaction_id))]
    async fn verify(&self, payment: &NormalizedPayment) -> Result<(), PaymentError> {
        if !self.remote_verify { return Ok(()); }
        let lookup: LookupResponse = self.http.post(format!("{}/epayment/lookup/", self.config.base_url))
            .header(reqwest::header::AUTHORIZATION, self.authorization()?)
            .json(&json!({ "pidx": payment.transaction_id }))
            .send().await?.error_for_status()?.json().await?;
        debug!(status = %lookup.status, transaction_id = ?lookup.transaction_id, "Khalti lookup");
        if lookup.status != "Completed" {
            return Err(PaymentError::VerificationFailed(format!("Khalti reports status {}", lookup.status)));
        }
        if !Money::from_minor(lookup.total_amount).approx_eq(&payment.amount) {
            return Err(PaymentError::Gateway(GatewayErrorCode::InvalidAmount));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn params(pairs: &[(&str, &str)]) -> QueryParams { pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }

    #[test]
    fn test_decode_completed_return() {
        let payment = decode_return(&params(&[
            ("pidx", "bZQLD9wRVWo4CdESSfuSsB"), ("status", "Completed"), ("amount", "110000"),
            ("transaction_id", "GFq9PFS7b2iYvL8Lir9oXe"), ("purchase_order_id", "ref-1"),
        ])).unwrap();
        assert_eq!(payment.transaction_id, "bZQLD9wRVWo4CdESSfuSsB");
        assert_eq!(payment.amount, Money::from_major(1100));
        assert_eq!(payment.ref_id.as_deref(), Some("GFq9PFS7b2iYvL8Lir9oXe"));
        assert_eq!(payment.reference.as_deref(), Some("ref-1"));
    }

    #[test]
    fn test_legacy_amt_and_ref() {
        let payment = decode_return(&params(&[("pidx", "p1"), ("amt", "50050"), ("refId", "R1")])).unwrap();
        assert_eq!(payment.amount, Money::from_minor(50050));
        assert_eq!(payment.ref_id.as_deref(), Some("R1"));
    }

    #[test]
    fn test_missing_pidx_fails_closed() {
        let err = decode_return(&params(&[("amount", "1000")])).unwrap_err();
        assert_eq!(err.category(), "verification_failed");
    }

    #[test]
    fn test_pending_is_not_paid() {
        assert!(decode_return(&params(&[("pidx", "p1"), ("status", "Pending"), ("amount", "1000")])).is_err());
    }
}
