//! eSewa ePay v2
//!
//! Initiation is a browser form POST signed with HMAC-SHA256. The success
//! redirect carries `data`, a base64 JSON document signed the same way. Older
//! integrations return bare `oid`/`amt`/`refId` parameters instead.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::{Map, Value};
use sha2::Sha256;
use std::collections::BTreeMap;
use tracing::{debug, instrument};

use super::{parse_amount, GatewayErrorCode, InitiatedPayment, NormalizedPayment, PaymentError, PaymentGateway, PaymentProvider, QueryParams, Redirect};
use crate::config::EsewaConfig;
use crate::domain::aggregates::{PendingPayment, UserProfile};

type HmacSha256 = Hmac<Sha256>;

const INITIATION_FIELDS: &str = "total_amount,transaction_uuid,product_code";

/// Base64 HMAC-SHA256 of `message`.
pub fn sign(secret: &str, message: &str) -> Result<String, PaymentError> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).map_err(|e| PaymentError::Unavailable(e.to_string()))?;
    mac.update(message.as_bytes());
    Ok(STANDARD.encode(mac.finalize().into_bytes()))
}

/// `name=value` pairs for each listed field, joined with commas.
fn signing_message(fields: &Map<String, Value>, names: &str) -> Option<String> {
    names.split(',').map(|name| {
        let value = match fields.get(name.trim())? {
            Value::String(s) => s.clone(),
            Value::Null => return None,
            other => other.to_string(),
        };
        Some(format!("{}={}", name.trim(), value))
    }).collect::<Option<Vec<_>>>().map(|parts| parts.join(","))
}

fn field(fields: &Map<String, Value>, name: &str) -> Option<String> {
    match fields.get(name)? {
        Value::String(s) => Some(s.clone()),
        Value::Null => None,
        other => Some(other.to_string()),
    }
}

pub struct EsewaGateway {
    config: EsewaConfig,
    http: reqwest::Client,
    public_base_url: String,
    remote_verify: bool,
}

impl EsewaGateway {
    pub fn new(config: EsewaConfig, http: reqwest::Client, public_base_url: &str, remote_verify: bool) -> Self {
        Self { config, http, public_base_url: public_base_url.to_string(), remote_verify }
    }

    fn decode_signed(&self, data: &str) -> Result<NormalizedPayment, PaymentError> {
        // Form decoding turns '+' into ' '.
        let bytes = STANDARD.decode(data.trim().replace(' ', "+")).map_err(|_| PaymentError::VerificationFailed("eSewa payload is not valid base64".into()))?;
        let raw: Value = serde_json::from_slice(&bytes).map_err(|_| PaymentError::VerificationFailed("eSewa payload is not valid JSON".into()))?;
        let fields = raw.as_object().ok_or_else(|| PaymentError::VerificationFailed("eSewa payload is not an object".into()))?;

        let names = field(fields, "signed_field_names").ok_or_else(|| PaymentError::VerificationFailed("eSewa payload is unsigned".into()))?;
        let signature = field(fields, "signature").ok_or_else(|| PaymentError::VerificationFailed("eSewa payload is unsigned".into()))?;
        let message = signing_message(fields, &names).ok_or_else(|| PaymentError::VerificationFailed("eSewa payload is missing signed fields".into()))?;
        let expected = STANDARD.decode(signature.as_bytes()).map_err(|_| PaymentError::VerificationFailed("eSewa signature is malformed".into()))?;
        let mut mac = HmacSha256::new_from_slice(self.config.secret_key.as_bytes()).map_err(|e| PaymentError::Unavailable(e.to_string()))?;
        mac.update(message.as_bytes());
        mac.verify_slice(&expected).map_err(|_| PaymentError::VerificationFailed("eSewa signature does not match".into()))?;

        let status = field(fields, "status").unwrap_or_default();
        match status.to_ascii_uppercase().as_str() {
            "COMPLETE" => {}
            "CANCELED" => return Err(PaymentError::Gateway(GatewayErrorCode::UserCanceled)),
            _ => return Err(PaymentError::Gateway(GatewayErrorCode::PaymentFailed)),
        }
        let reference = field(fields, "transaction_uuid").ok_or_else(|| PaymentError::VerificationFailed("eSewa payload has no transaction_uuid".into()))?;
        let amount = field(fields, "total_amount").as_deref().and_then(parse_amount)
            .ok_or(PaymentError::Gateway(GatewayErrorCode::InvalidAmount))?;
        Ok(NormalizedPayment {
            transaction_id: reference.clone(), provider: PaymentProvider::Esewa, amount, ref_id: field(fields, "transaction_code"),
            status, reference: Some(reference), raw,
        })
    }

    /// Unsigned `oid`/`amt`/`refId` returns. Only the status lookup vouches for
    /// them, so they are refused when remote verification is off.
    fn decode_legacy(&self, params: &QueryParams) -> Result<NormalizedPayment, PaymentError> {
        if !self.remote_verify {
            return Err(PaymentError::VerificationFailed("unsigned eSewa returns require remote verification".into()));
        }
        let oid = params.get("oid").or_else(|| params.get("transaction_uuid")).filter(|v| !v.is_empty())
            .ok_or_else(|| PaymentError::VerificationFailed("eSewa payment data is missing".into()))?;
        let amount = params.get("amt").and_then(|a| parse_amount(a)).ok_or(PaymentError::Gateway(GatewayErrorCode::InvalidAmount))?;
        let reference = params.get("transaction_uuid").unwrap_or(oid).clone();
        Ok(NormalizedPayment {
            transaction_id: oid.clone(), provider: PaymentProvider::Esewa, amount, ref_id: params.get("refId").cloned(),
            status: "COMPLETE".into(), reference: Some(reference), raw: serde_json::to_value(params).unwrap_or(Value::Null),
        })
    }
}

#[derive(Deserialize)]
struct StatusResponse { status: String, #[serde(default)] ref_id: Option<String> }

#[async_trait]
impl PaymentGateway for EsewaGateway {
    fn provider(&self) -> PaymentProvider { PaymentProvider::Esewa }

    async fn initiate(&self, pending: &PendingPayment, _customer: &UserProfile) -> Result<InitiatedPayment, PaymentError> {
        let draft = &pending.draft;
        let total = draft.total.to_string();
        let mut fields = BTreeMap::new();
        fields.insert("amount".to_string(), draft.total.sub_floor(&draft.shipping_fee).to_string());
        fields.insert("tax_amount".to_string(), "0".to_string());
        fields.insert("product_service_charge".to_string(), "0".to_string());
        fields.insert("product_delivery_charge".to_string(), draft.shipping_fee.to_string());
        fields.insert("total_amount".to_string(), total.clone());
        fields.insert("transaction_uuid".to_string(), pending.reference.clone());
        fields.insert("product_code".to_string(), self.config.product_code.clone());
        fields.insert("success_url".to_string(), format!("{}/payment/esewa/success", self.public_base_url));
        fields.insert("failure_url".to_string(), format!("{}/payment/esewa/failure?error=payment_failed", self.public_base_url));
        fields.insert("signed_field_names".to_string(), INITIATION_FIELDS.to_string());
        let message = format!("total_amount={},transaction_uuid={},product_code={}", total, pending.reference, self.config.product_code);
        fields.insert("signature".to_string(), sign(&self.config.secret_key, &message)?);
        Ok(InitiatedPayment { redirect: Redirect { method: "POST", url: self.config.form_url.clone(), fields }, gateway_token: None })
    }

    fn decode(&self, params: &QueryParams) -> Result<NormalizedPayment, PaymentError> {
        match params.get("data").filter(|d| !d.trim().is_empty()) {
            Some(data) => self.decode_signed(data),
            None => self.decode_legacy(params),
        }
    }

    #[instrument(skip(self, payment), fields(transaction = %payment.transaction_id))]
    async fn verify(&self, payment: &NormalizedPayment) -> Result<(), PaymentError> {
        if !self.remote_verify { return Ok(()); }
        let reference = payment.reference.as_deref().unwrap_or(&payment.transaction_id);
        let total = payment.amount.to_string();
        let status: StatusResponse = self.http.get(&self.config.status_url)
            .query(&[("product_code", self.config.product_code.as_str()), ("total_amount", total.as_str()), ("transaction_uuid", reference)])
            .send().await?.error_for_status()?.json().await?;
        debug!(status = %status.status, ref_id = ?status.ref_id, "eSewa status lookup");
        if !status.status.eq_ignore_ascii_case("COMPLETE") {
            return Err(PaymentError::VerificationFailed(format!("eSewa reports status {}", status.status)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{Cart, CartItem, OrderDraft, PaymentMethod};
    use crate::domain::value_objects::Money;
    use serde_json::json;
    use uuid::Uuid;

    fn gateway() -> EsewaGateway { gateway_with(false) }

    fn gateway_with(remote_verify: bool) -> EsewaGateway {
        let config = EsewaConfig {
            product_code: "EPAYTEST".into(), secret_key: "8gBm/:&EnhH.1/q".into(),
            form_url: "https://rc-epay.esewa.com.np/api/epay/main/v2/form".into(), status_url: "http://127.0.0.1:9/status".into(),
        };
        EsewaGateway::new(config, reqwest::Client::new(), "http://shop.test", remote_verify)
    }

    fn signed_payload(secret: &str, status: &str, amount: &str) -> String {
        let mut doc = json!({
            "transaction_code": "000AWEO", "status": status, "total_amount": amount, "transaction_uuid": "ref-1",
            "product_code": "EPAYTEST", "signed_field_names": "transaction_code,status,total_amount,transaction_uuid,product_code,signed_field_names",
        });
        let message = signing_message(doc.as_object().unwrap(), doc["signed_field_names"].as_str().unwrap()).unwrap();
        doc["signature"] = json!(sign(secret, &message).unwrap());
        STANDARD.encode(doc.to_string())
    }

    fn params(pairs: &[(&str, &str)]) -> QueryParams { pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }

    #[test]
    fn test_sign_known_vector() {
        let sig = sign("8gBm/:&EnhH.1/q", "total_amount=100,transaction_uuid=11-201-13,product_code=EPAYTEST").unwrap();
        assert_eq!(sig, "5DZywcrTKD0gia/rsSMcrRHmJl+4Tbol6S+lWgdJ94E=");
    }

    #[test]
    fn test_decode_signed_payload() {
        let payment = gateway().decode(&params(&[("data", &signed_payload("8gBm/:&EnhH.1/q", "COMPLETE", "1,100.0"))])).unwrap();
        assert_eq!(payment.transaction_id, "ref-1");
        assert_eq!(payment.reference.as_deref(), Some("ref-1"));
        assert_eq!(payment.ref_id.as_deref(), Some("000AWEO"));
        assert_eq!(payment.amount, Money::from_major(1100));
    }

    #[test]
    fn test_rejects_forged_signature() {
        let err = gateway().decode(&params(&[("data", &signed_payload("wrong-key", "COMPLETE", "1100"))])).unwrap_err();
        assert_eq!(err.category(), "verification_failed");
    }

    #[test]
    fn test_non_complete_status() {
        let err = gateway().decode(&params(&[("data", &signed_payload("8gBm/:&EnhH.1/q", "PENDING", "1100"))])).unwrap_err();
        assert_eq!(err.category(), "payment_failed");
    }

    #[test]
    fn test_legacy_parameters() {
        let legacy = params(&[("oid", "ref-9"), ("amt", "250"), ("refId", "ESW1")]);
        let payment = gateway_with(true).decode(&legacy).unwrap();
        assert_eq!(payment.transaction_id, "ref-9");
        assert_eq!(payment.amount, Money::from_major(250));
        assert!(gateway_with(true).decode(&params(&[])).is_err());
        assert_eq!(gateway().decode(&legacy).unwrap_err().category(), "verification_failed");
    }

    #[tokio::test]
    async fn test_initiation_form_is_signed() {
        let cart = Cart::from_items([CartItem { product_id: Uuid::now_v7(), name: "Tea".into(), price: Money::from_major(500), quantity: 2, image: None, category_id: None }]).unwrap();
        let draft = OrderDraft::new(&cart, Uuid::now_v7(), PaymentMethod::Esewa, Money::from_major(100), None);
        let pending = PendingPayment::open("esewa", Uuid::now_v7(), draft);
        let customer = UserProfile { id: pending.user_id, name: "A".into(), email: "a@b.c".into(), image: None, phone: None, role: Default::default(), provider: crate::domain::aggregates::AuthProvider::Credentials, created_at: chrono::Utc::now() };
        let initiated = gateway().initiate(&pending, &customer).await.unwrap();
        let fields = &initiated.redirect.fields;
        assert_eq!(fields["total_amount"], "1100.00");
        assert_eq!(fields["amount"], "1000.00");
        assert_eq!(fields["transaction_uuid"], pending.reference);
        let message = format!("total_amount=1100.00,transaction_uuid={},product_code=EPAYTEST", pending.reference);
        assert_eq!(fields["signature"], sign("8gBm/:&EnhH.1/q", &message).unwrap());
    }
}
