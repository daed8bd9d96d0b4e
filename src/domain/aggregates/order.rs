//! Order Aggregate

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::events::{DomainEvent, OrderEvent};
use crate::domain::value_objects::{DiscountCode, Money, OrderNumber};

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub order_number: OrderNumber,
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub payment_status: PaymentStatus,
    pub payment_details: Option<PaymentDetails>,
    pub status: OrderStatus,
    pub subtotal: Money,
    pub shipping_fee: Money,
    pub discount: Option<AppliedDiscount>,
    pub total: Money,
    pub timeline: Vec<TimelineEntry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    events: Vec<DomainEvent>,
}

/// Snapshot of a purchased product, frozen at checkout time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LineItem { pub product_id: Uuid, pub name: String, pub price: Money, pub quantity: u32, #[serde(default)] pub image: Option<String> }

impl LineItem {
    pub fn line_total(&self) -> Money { self.price.multiply(self.quantity) }
}

/// Highest unit price and per-line quantity a checkout accepts.
pub const MAX_UNIT_PRICE: i64 = 10_000_000;
pub const MAX_LINE_QUANTITY: u32 = 10_000;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LineRejection { NotPositive, OverLimit }

/// `price * quantity` for a submitted line, refusing non-positive or oversized values.
pub fn checked_line_total(price: Money, quantity: u32) -> Result<Money, LineRejection> {
    if quantity == 0 || price.is_zero() || price.is_negative() { return Err(LineRejection::NotPositive); }
    if quantity > MAX_LINE_QUANTITY || price.amount() > Decimal::from(MAX_UNIT_PRICE) { return Err(LineRejection::OverLimit); }
    price.checked_multiply(quantity).ok_or(LineRejection::OverLimit)
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShippingAddress { pub full_name: String, pub phone: String, pub street: String, pub city: String, pub state: String, pub postal_code: String, pub country: String }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppliedDiscount { pub code: DiscountCode, pub amount: Money }

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentDetails {
    pub transaction_id: String,
    pub provider: String,
    pub amount: Money,
    #[serde(default)]
    pub ref_id: Option<String>,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimelineEntry { pub status: String, pub timestamp: DateTime<Utc>, pub description: String }

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod { Cod, Esewa, Khalti }

impl PaymentMethod {
    pub fn label(&self) -> &'static str { match self { Self::Cod => "Cash on Delivery", Self::Esewa => "eSewa", Self::Khalti => "Khalti" } }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentStatus { #[default] Pending, Paid, Failed }

impl PaymentStatus {
    pub fn as_str(&self) -> &'static str { match self { Self::Pending => "pending", Self::Paid => "paid", Self::Failed => "failed" } }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderStatus { #[default] Pending, Processing, Shipped, Delivered, Cancelled, HandoverToCourier }

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending", Self::Processing => "processing", Self::Shipped => "shipped",
            Self::Delivered => "delivered", Self::Cancelled => "cancelled", Self::HandoverToCourier => "handover_to_courier",
        }
    }
    pub fn is_terminal(&self) -> bool { matches!(self, Self::Delivered | Self::Cancelled) }
}

/// Everything needed to place an order, already priced by the caller.
#[derive(Clone, Debug)]
pub struct NewOrder {
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub shipping_address: ShippingAddress,
    pub payment_method: PaymentMethod,
    pub shipping_fee: Money,
    pub discount: Option<AppliedDiscount>,
}

impl Order {
    pub fn place(new: NewOrder) -> Result<Self, OrderError> {
        if new.items.is_empty() { return Err(OrderError::NoItems); }
        let mut subtotal = Money::ZERO;
        for item in &new.items {
            let line = checked_line_total(item.price, item.quantity).map_err(|r| match r {
                LineRejection::NotPositive => OrderError::InvalidLine(item.name.clone()),
                LineRejection::OverLimit => OrderError::LineTooLarge(item.name.clone()),
            })?;
            subtotal = subtotal.checked_add(&line).ok_or_else(|| OrderError::LineTooLarge(item.name.clone()))?;
        }
        if new.shipping_fee.is_negative() { return Err(OrderError::NegativeAmount); }
        if new.discount.as_ref().is_some_and(|d| d.amount.is_negative()) { return Err(OrderError::NegativeAmount); }
        let now = Utc::now();
        let mut order = Self {
            id: Uuid::now_v7(), order_number: OrderNumber::generate(now), user_id: new.user_id, items: new.items,
            shipping_address: new.shipping_address, payment_method: new.payment_method, payment_status: PaymentStatus::Pending,
            payment_details: None, status: OrderStatus::Pending, subtotal, shipping_fee: new.shipping_fee, discount: new.discount,
            total: Money::ZERO, timeline: vec![], created_at: now, updated_at: now, events: vec![],
        };
        order.total = order.compute_total();
        let description = match order.payment_method {
            PaymentMethod::Cod => "Order placed with Cash on Delivery".to_string(),
            method => format!("Order placed, awaiting {} payment", method.label()),
        };
        order.push_timeline(OrderStatus::Pending.as_str(), description);
        order.raise_event(DomainEvent::Order(OrderEvent::Created { order_id: order.id, order_number: order.order_number.to_string(), user_id: order.user_id, total: order.total.amount() }));
        Ok(order)
    }

    /// `subtotal + shipping - discount`, floored at zero and rounded to cents.
    pub fn compute_total(&self) -> Money {
        let gross = self.subtotal.add(&self.shipping_fee);
        match &self.discount { Some(d) => gross.sub_floor(&d.amount), None => gross }
    }

    pub fn discount_amount(&self) -> Money { self.discount.as_ref().map(|d| d.amount).unwrap_or(Money::ZERO) }

    pub fn mark_paid(&mut self, details: PaymentDetails) -> Result<(), OrderError> {
        if self.payment_status == PaymentStatus::Paid { return Err(OrderError::AlreadyPaid); }
        if self.status == OrderStatus::Cancelled { return Err(OrderError::InvalidTransition { from: self.status, to: OrderStatus::Processing }); }
        let description = match &details.ref_id {
            Some(r) => format!("Payment of {} received via {} (ref {})", details.amount, details.provider, r),
            None => format!("Payment of {} received via {}", details.amount, details.provider),
        };
        self.raise_event(DomainEvent::Order(OrderEvent::Paid { order_id: self.id, provider: details.provider.clone(), transaction_id: details.transaction_id.clone(), amount: details.amount.amount() }));
        self.payment_status = PaymentStatus::Paid;
        self.payment_details = Some(details);
        self.status = OrderStatus::Processing;
        self.push_timeline(OrderStatus::Processing.as_str(), description);
        Ok(())
    }

    pub fn update_status(&mut self, to: OrderStatus, description: Option<String>) -> Result<(), OrderError> {
        if self.status.is_terminal() || (to == OrderStatus::Pending && self.status != OrderStatus::Pending) {
            return Err(OrderError::InvalidTransition { from: self.status, to });
        }
        self.status = to;
        let description = description.filter(|d| !d.trim().is_empty()).unwrap_or_else(|| format!("Order status updated to {}", to.as_str()));
        self.push_timeline(to.as_str(), description);
        self.raise_event(DomainEvent::Order(OrderEvent::StatusChanged { order_id: self.id, status: to.as_str().to_string() }));
        Ok(())
    }

    pub fn cancel_by_customer(&mut self) -> Result<(), OrderError> {
        if self.status != OrderStatus::Pending || self.payment_status == PaymentStatus::Paid { return Err(OrderError::CannotCancel); }
        self.update_status(OrderStatus::Cancelled, Some("Order cancelled by customer".into()))
    }

    pub fn is_paid_by(&self, transaction_id: &str) -> bool {
        self.payment_details.as_ref().is_some_and(|d| d.transaction_id == transaction_id)
    }

    pub fn take_events(&mut self) -> Vec<DomainEvent> { std::mem::take(&mut self.events) }
    fn raise_event(&mut self, e: DomainEvent) { self.events.push(e); }

    fn push_timeline(&mut self, status: &str, description: String) {
        let now = Utc::now();
        self.timeline.push(TimelineEntry { status: status.to_string(), timestamp: now, description });
        self.updated_at = now;
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum OrderError { NoItems, InvalidLine(String), LineTooLarge(String), NegativeAmount, AlreadyPaid, CannotCancel, InvalidTransition { from: OrderStatus, to: OrderStatus } }
impl std::error::Error for OrderError {}
impl std::fmt::Display for OrderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NoItems => write!(f, "Order must contain at least one item"),
            Self::InvalidLine(name) => write!(f, "Item \"{}\" must have a positive price and quantity", name),
            Self::LineTooLarge(name) => write!(f, "Item \"{}\" exceeds the price or quantity limit", name),
            Self::NegativeAmount => write!(f, "Amounts cannot be negative"),
            Self::AlreadyPaid => write!(f, "Order has already been paid"),
            Self::CannotCancel => write!(f, "Only pending, unpaid orders can be cancelled"),
            Self::InvalidTransition { from, to } => write!(f, "Cannot change order status from {} to {}", from.as_str(), to.as_str()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(price: i64, qty: u32) -> LineItem { LineItem { product_id: Uuid::now_v7(), name: "Widget".into(), price: Money::from_major(price), quantity: qty, image: None } }
    fn new_order(items: Vec<LineItem>, discount: Option<AppliedDiscount>) -> NewOrder {
        NewOrder { user_id: Uuid::now_v7(), items, shipping_address: ShippingAddress::default(), payment_method: PaymentMethod::Cod, shipping_fee: Money::from_major(100), discount }
    }

    #[test]
    fn test_cod_order_totals() {
        let order = Order::place(new_order(vec![item(400, 2), item(200, 1)], None)).unwrap();
        assert_eq!(order.subtotal, Money::from_major(1000));
        assert_eq!(order.total, Money::from_major(1100));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.timeline.len(), 1);
        assert_eq!(order.timeline[0].status, "pending");
    }

    #[test]
    fn test_total_with_discount_rounds() {
        let discount = AppliedDiscount { code: DiscountCode::parse("SAVE10").unwrap(), amount: Money::new(Decimal::new(33333, 3)) };
        let order = Order::place(new_order(vec![item(1000, 1)], Some(discount))).unwrap();
        assert_eq!(order.total.amount(), Decimal::new(106667, 2));
        assert_eq!(order.total, order.compute_total());
    }

    #[test]
    fn test_rejects_bad_lines() {
        assert_eq!(Order::place(new_order(vec![], None)).unwrap_err(), OrderError::NoItems);
        assert!(matches!(Order::place(new_order(vec![item(0, 1)], None)), Err(OrderError::InvalidLine(_))));
        assert!(matches!(Order::place(new_order(vec![item(10, 0)], None)), Err(OrderError::InvalidLine(_))));
        assert!(matches!(Order::place(new_order(vec![item(10, MAX_LINE_QUANTITY + 1)], None)), Err(OrderError::LineTooLarge(_))));
        assert!(matches!(Order::place(new_order(vec![item(MAX_UNIT_PRICE + 1, 1)], None)), Err(OrderError::LineTooLarge(_))));
    }

    #[test]
    fn test_payment_and_timeline_append_only() {
        let mut order = Order::place(new_order(vec![item(500, 1)], None)).unwrap();
        let details = PaymentDetails { transaction_id: "TX1".into(), provider: "esewa".into(), amount: order.total, ref_id: Some("R1".into()), metadata: serde_json::Value::Null };
        order.mark_paid(details.clone()).unwrap();
        assert_eq!(order.payment_status, PaymentStatus::Paid);
        assert_eq!(order.status, OrderStatus::Processing);
        assert!(order.is_paid_by("TX1"));
        assert_eq!(order.mark_paid(details).unwrap_err(), OrderError::AlreadyPaid);
        order.update_status(OrderStatus::Shipped, None).unwrap();
        assert_eq!(order.timeline.len(), 3);
        assert_eq!(order.timeline.last().unwrap().status, order.status.as_str());
        assert_eq!(order.take_events().len(), 3);
    }

    #[test]
    fn test_terminal_states() {
        let mut order = Order::place(new_order(vec![item(500, 1)], None)).unwrap();
        order.cancel_by_customer().unwrap();
        assert!(matches!(order.update_status(OrderStatus::Processing, None), Err(OrderError::InvalidTransition { .. })));
    }
}
