//! Pending Payment Aggregate
//!
//! Created when the buyer is sent to an external processor, keyed by a reference
//! the processor has to echo back, so the return leg can be matched without
//! trusting client-held order data.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use crate::domain::aggregates::cart::OrderDraft;

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingPayment {
    pub id: Uuid,
    /// Server-generated reference (eSewa `transaction_uuid`, Khalti `purchase_order_id`).
    pub reference: String,
    pub provider: String,
    pub user_id: Uuid,
    pub draft: OrderDraft,
    /// Token the processor issued for this attempt (Khalti `pidx`).
    #[serde(default)]
    pub gateway_token: Option<String>,
    pub state: PendingState,
    #[serde(default)]
    pub order_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingState { Awaiting, Completed, Failed }

impl PendingPayment {
    pub const TTL_MINUTES: i64 = 60;

    pub fn open(provider: &str, user_id: Uuid, draft: OrderDraft) -> Self {
        let now = Utc::now();
        let id = Uuid::now_v7();
        Self {
            id, reference: id.simple().to_string(), provider: provider.to_string(), user_id, draft, gateway_token: None,
            state: PendingState::Awaiting, order_id: None, created_at: now, expires_at: now + Duration::minutes(Self::TTL_MINUTES),
        }
    }

    pub fn is_expired(&self, now: DateTime<Utc>) -> bool { self.state == PendingState::Awaiting && now > self.expires_at }
    pub fn complete(&mut self, order_id: Uuid) { self.state = PendingState::Completed; self.order_id = Some(order_id); }
    pub fn fail(&mut self) { if self.state == PendingState::Awaiting { self.state = PendingState::Failed; } }
}
