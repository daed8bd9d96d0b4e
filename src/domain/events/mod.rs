//! Domain events
use rust_decimal::Decimal;
use serde::Serialize;
use uuid::Uuid;

#[derive(Clone, Debug, Serialize)]
#[serde(untagged)]
pub enum DomainEvent {
    Product(ProductEvent),
    Order(OrderEvent),
    Review(ReviewEvent),
}

impl DomainEvent {
    /// NATS subject the event is published on.
    pub fn subject(&self) -> &'static str {
        match self {
            Self::Product(ProductEvent::Created { .. }) => "product.created",
            Self::Product(ProductEvent::RatingChanged { .. }) => "product.rating_changed",
            Self::Order(OrderEvent::Created { .. }) => "order.created",
            Self::Order(OrderEvent::Paid { .. }) => "order.paid",
            Self::Order(OrderEvent::StatusChanged { .. }) => "order.status_changed",
            Self::Review(_) => "review.changed",
        }
    }
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum ProductEvent {
    Created { product_id: Uuid, slug: String },
    RatingChanged { product_id: Uuid, rating: f64, review_count: u32 },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase", tag = "type")]
pub enum OrderEvent {
    Created { order_id: Uuid, order_number: String, user_id: Uuid, total: Decimal },
    Paid { order_id: Uuid, provider: String, transaction_id: String, amount: Decimal },
    StatusChanged { order_id: Uuid, status: String },
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewEvent { pub review_id: Uuid, pub product_id: Uuid, pub action: &'static str }
