//! Gateway checkout
//!
//! `initiate` prices the cart, stores a [`PendingPayment`] under a fresh
//! reference and hands back the processor redirect. `complete` runs when the
//! buyer returns: it short-circuits known gateway errors, decodes the payload,
//! matches it to the pending record and writes the paid order exactly once per
//! transaction id.
//!
//! When no pending record can be matched (payments started by an older client),
//! the order is rebuilt from the client's snapshot, or failing that from its
//! bare cart. Both are marked degraded in the logs.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{Orders, Repos};
use crate::domain::aggregates::{checked_line_total, Cart, CartItem, Order, OrderDraft, PendingPayment, PendingState};
use crate::domain::value_objects::Money;
use crate::payments::{check_gateway_error, GatewayErrorCode, Gateways, NormalizedPayment, PaymentError, PaymentGateway, PaymentProvider, QueryParams, Redirect};
use crate::store::StoreError;
use crate::{EcommerceError, Result};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitiateRequest {
    pub provider: String,
    pub address_id: Uuid,
    pub items: Vec<CartItem>,
    /// Subtotal the client displayed; rejected when it disagrees with the items.
    #[serde(default)]
    pub subtotal: Option<Money>,
    #[serde(default)]
    pub discount_code: Option<String>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Initiation {
    pub reference: String,
    pub provider: PaymentProvider,
    pub total: Money,
    pub expires_at: DateTime<Utc>,
    pub redirect: Redirect,
}

#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompletionRequest {
    pub provider: String,
    #[serde(default)]
    pub params: QueryParams,
    /// Client-held pending order snapshot.
    #[serde(default)]
    pub order_data: Option<OrderDraft>,
    /// Client-held cart, used when the snapshot is gone too.
    #[serde(default)]
    pub cart: Option<Vec<CartItem>>,
    #[serde(default)]
    pub address_id: Option<Uuid>,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Completion {
    pub message: String,
    pub order_id: Uuid,
    pub order_number: String,
    pub status: String,
    pub payment_status: String,
    pub payment_reference: Option<String>,
    pub total: Money,
    /// True when this transaction had already produced the order.
    pub already_processed: bool,
    pub clear_client_state: bool,
}

impl Completion {
    fn of(order: &Order, already_processed: bool) -> Self {
        let message = if already_processed { "Payment was already processed" } else { "Payment verified and order placed" };
        Self {
            message: message.to_string(), order_id: order.id, order_number: order.order_number.to_string(),
            status: order.status.as_str().to_string(), payment_status: order.payment_status.as_str().to_string(),
            payment_reference: order.payment_details.as_ref().map(|d| d.ref_id.clone().unwrap_or_else(|| d.transaction_id.clone())),
            total: order.total, already_processed, clear_client_state: true,
        }
    }
}

#[derive(Clone)]
pub struct Checkout {
    repos: Repos,
    orders: Orders,
    gateways: Gateways,
}

/// Rejects a client snapshot whose arithmetic does not add up.
fn check_snapshot(draft: &OrderDraft, provider: PaymentProvider) -> std::result::Result<(), PaymentError> {
    let mismatch = || PaymentError::InvalidRequest("order data does not match its items".into());
    if draft.items.is_empty() { return Err(mismatch()); }
    let mut subtotal = Money::ZERO;
    for item in &draft.items {
        let line = checked_line_total(item.price, item.quantity).map_err(|_| mismatch())?;
        subtotal = subtotal.checked_add(&line).ok_or_else(mismatch)?;
    }
    if !subtotal.approx_eq(&draft.subtotal) { return Err(mismatch()); }
    let discount = draft.discount.as_ref().map(|d| d.amount).unwrap_or(Money::ZERO);
    if !draft.subtotal.add(&draft.shipping_fee).sub_floor(&discount).approx_eq(&draft.total) {
        return Err(PaymentError::InvalidRequest("order data total is inconsistent".into()));
    }
    if draft.payment_method != provider.method() {
        return Err(PaymentError::InvalidRequest("order data is for a different payment method".into()));
    }
    Ok(())
}

/// Amount agreement with the draft, then the processor's own confirmation.
async fn confirm(gateway: &dyn PaymentGateway, payment: &NormalizedPayment, draft: &OrderDraft) -> std::result::Result<(), PaymentError> {
    if !payment.amount.approx_eq(&draft.total) {
        warn!(paid = %payment.amount, expected = %draft.total, "Payment amount mismatch");
        return Err(PaymentError::Gateway(GatewayErrorCode::InvalidAmount));
    }
    gateway.verify(payment).await
}

impl Checkout {
    pub fn new(repos: Repos, orders: Orders, gateways: Gateways) -> Self { Self { repos, orders, gateways } }

    #[instrument(skip(self, req), fields(provider = %req.provider))]
    pub async fn initiate(&self, user_id: Uuid, req: InitiateRequest) -> Result<Initiation> {
        let provider = PaymentProvider::parse(&req.provider).map_err(|_| PaymentError::InvalidRequest(format!("unsupported provider {}", req.provider)))?;
        let gateway = self.gateways.get(provider)?;
        let user = self.repos.users.get(user_id).await?.ok_or(EcommerceError::NotFound("User"))?;
        self.orders.shipping_address(user_id, req.address_id).await?;
        let draft = self.orders.draft(req.items, req.address_id, provider.method(), req.discount_code.as_deref()).await?;
        if req.subtotal.is_some_and(|s| !s.approx_eq(&draft.subtotal)) {
            return Err(EcommerceError::Validation("Cart subtotal does not match its items. Please review your cart".into()));
        }

        let mut pending = PendingPayment::open(provider.as_str(), user_id, draft);
        let initiated = gateway.initiate(&pending, &user.profile()).await?;
        pending.gateway_token = initiated.gateway_token;
        self.repos.pending.insert(&pending).await?;
        info!(reference = %pending.reference, total = %pending.draft.total, "Payment initiated");
        Ok(Initiation { reference: pending.reference, provider, total: pending.draft.total, expires_at: pending.expires_at, redirect: initiated.redirect })
    }

    /// Pending record matching the returned payment: by our reference, else by the processor's token.
    async fn find_pending(&self, reference: Option<&str>, token: Option<&str>) -> Result<Option<PendingPayment>> {
        if let Some(reference) = reference.filter(|r| !r.is_empty()) {
            if let Some(p) = self.repos.pending.find_one(json!({ "reference": reference })).await? { return Ok(Some(p)); }
        }
        if let Some(token) = token.filter(|t| !t.is_empty()) {
            return Ok(self.repos.pending.find_one(json!({ "gatewayToken": token })).await?);
        }
        Ok(None)
    }

    /// Marks the caller's own attempt failed after the processor reported an error. Best effort.
    async fn fail_pending(&self, user_id: Uuid, provider: PaymentProvider, params: &QueryParams) {
        let reference = ["purchase_order_id", "transaction_uuid", "oid"].iter().find_map(|k| params.get(*k)).map(String::as_str);
        let token = params.get("pidx").map(String::as_str);
        match self.find_pending(reference, token).await {
            Ok(Some(pending)) if pending.user_id != user_id || pending.provider != provider.as_str() => {
                warn!(reference = %pending.reference, "Ignoring gateway error for another checkout");
            }
            Ok(Some(mut pending)) if pending.state == PendingState::Awaiting => {
                pending.fail();
                if let Err(e) = self.repos.pending.save(&pending).await { warn!(error = %e, "Failed to mark payment attempt failed"); }
            }
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to look up payment attempt"),
        }
    }

    async fn existing(&self, user_id: Uuid, order: Order) -> Result<Completion> {
        if order.user_id != user_id {
            return Err(PaymentError::VerificationFailed("transaction belongs to another account".into()).into());
        }
        info!(order_id = %order.id, "Payment already processed");
        Ok(Completion::of(&order, true))
    }

    /// Draft rebuilt from client-held state, for returns without a pending record.
    async fn fallback_draft(&self, user_id: Uuid, provider: PaymentProvider, req: &CompletionRequest, payment: &NormalizedPayment) -> Result<OrderDraft> {
        if let Some(draft) = &req.order_data {
            check_snapshot(draft, provider)?;
            warn!(transaction = %payment.transaction_id, "Completing payment from the client order snapshot");
            return Ok(draft.clone());
        }
        let cart = Cart::from_items(req.cart.clone().unwrap_or_default())?;
        let address_id = match req.address_id {
            Some(id) => id,
            None => self.repos.users.get(user_id).await?.and_then(|u| u.default_address().map(|a| a.id)).ok_or(PaymentError::SessionExpired)?,
        };
        let mut draft = OrderDraft::from_cart_fallback(&cart, address_id, provider.method()).ok_or(PaymentError::SessionExpired)?;
        // The bare cart knows nothing of shipping; whatever was paid above the goods is taken as shipping.
        if payment.amount < draft.subtotal { return Err(PaymentError::Gateway(GatewayErrorCode::InvalidAmount).into()); }
        draft.shipping_fee = payment.amount.sub_floor(&draft.subtotal);
        draft.total = payment.amount;
        warn!(transaction = %payment.transaction_id, "Completing payment from the bare cart, breakdown lost");
        Ok(draft)
    }

    /// Reconciles a processor return and writes the paid order.
    #[instrument(skip(self, req), fields(provider = %req.provider))]
    pub async fn complete(&self, user_id: Uuid, req: CompletionRequest) -> Result<Completion> {
        let provider = PaymentProvider::parse(&req.provider)?;
        if let Err(e) = check_gateway_error(&req.params) {
            self.fail_pending(user_id, provider, &req.params).await;
            info!(category = e.category(), "Payment not completed at the processor");
            return Err(e.into());
        }
        let gateway = self.gateways.get(provider)?;
        let payment = gateway.decode(&req.params)?;
        if payment.transaction_id.trim().is_empty() {
            return Err(PaymentError::VerificationFailed("no transaction id was returned".into()).into());
        }
        if let Some(order) = self.orders.find_by_transaction(&payment.transaction_id).await? {
            return self.existing(user_id, order).await;
        }

        let pending = self.find_pending(payment.reference.as_deref(), Some(&payment.transaction_id)).await?;
        let mut lapsed = false;
        let draft = match &pending {
            Some(p) => {
                if p.user_id != user_id || p.provider != provider.as_str() {
                    return Err(PaymentError::VerificationFailed("payment does not belong to this checkout".into()).into());
                }
                if let (PendingState::Completed, Some(order_id)) = (p.state, p.order_id) {
                    let order = self.repos.orders.get(order_id).await?.ok_or(EcommerceError::NotFound("Order"))?;
                    return self.existing(user_id, order).await;
                }
                // Expired or failed attempts still become orders when the processor confirms the capture.
                lapsed = p.state == PendingState::Failed || p.is_expired(Utc::now());
                p.draft.clone()
            }
            None => self.fallback_draft(user_id, provider, &req, &payment).await?,
        };
        if let Err(e) = confirm(gateway.as_ref(), &payment, &draft).await {
            let rejected = matches!(e, PaymentError::VerificationFailed(_) | PaymentError::Gateway(_));
            return match pending {
                Some(mut p) if lapsed && rejected => {
                    p.fail();
                    self.repos.pending.save(&p).await?;
                    info!(reference = %p.reference, "Lapsed payment attempt was not confirmed");
                    Err(PaymentError::SessionExpired.into())
                }
                _ => Err(e.into()),
            };
        }
        if lapsed { warn!(transaction = %payment.transaction_id, "Completing a payment confirmed after its attempt lapsed"); }

        let shipping = self.orders.shipping_address(user_id, draft.address_id).await?;
        let transaction_id = payment.transaction_id.clone();
        let order = match self.orders.persist(user_id, shipping, draft, Some(payment.into_details())).await {
            Ok(order) => order,
            Err(EcommerceError::Storage(StoreError::Duplicate(_))) => {
                // Lost a race with a concurrent completion of the same transaction.
                let order = self.orders.find_by_transaction(&transaction_id).await?.ok_or(EcommerceError::NotFound("Order"))?;
                return self.existing(user_id, order).await;
            }
            Err(e) => return Err(e),
        };
        if let Some(mut p) = pending {
            p.complete(order.id);
            if let Err(e) = self.repos.pending.save(&p).await { warn!(error = %e, reference = %p.reference, "Failed to close payment attempt"); }
        }
        info!(order_id = %order.id, transaction = %transaction_id, "Gateway payment completed");
        Ok(Completion::of(&order, false))
    }

    /// Processor redirect handled entirely from the server-held pending record.
    pub async fn return_from_gateway(&self, user_id: Uuid, provider: &str, params: QueryParams) -> Result<Completion> {
        self.complete(user_id, CompletionRequest { provider: provider.to_string(), params, ..Default::default() }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{AppliedDiscount, PaymentMethod};
    use crate::domain::value_objects::DiscountCode;

    fn draft(total: i64) -> OrderDraft {
        let cart = Cart::from_items([CartItem { product_id: Uuid::now_v7(), name: "Tea".into(), price: Money::from_major(500), quantity: 2, image: None, category_id: None }]).unwrap();
        let discount = Some(AppliedDiscount { code: DiscountCode::parse("TEA10").unwrap(), amount: Money::from_major(100) });
        let mut d = OrderDraft::new(&cart, Uuid::now_v7(), PaymentMethod::Khalti, Money::from_major(100), discount);
        d.total = Money::from_major(total);
        d
    }

    #[test]
    fn test_snapshot_checks() {
        assert!(check_snapshot(&draft(1000), PaymentProvider::Khalti).is_ok());
        assert!(check_snapshot(&draft(900), PaymentProvider::Khalti).is_err());
        assert!(check_snapshot(&draft(1000), PaymentProvider::Esewa).is_err());
    }
}
