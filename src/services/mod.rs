//! Application services
//!
//! One service per area of the shop. Each takes the caller's identity as an
//! explicit argument; none of them reads ambient session state.

pub mod accounts;
pub mod analytics;
pub mod catalog;
pub mod checkout;
pub mod discounts;
pub mod orders;
pub mod reviews;

use std::sync::Arc;
use tracing::warn;

use crate::config::Config;
use crate::domain::aggregates::{Brand, Category, Discount, Order, PendingPayment, Product, Review, User};
use crate::domain::events::DomainEvent;
use crate::payments::Gateways;
use crate::store::{Repo, SharedStore};

pub use accounts::Accounts;
pub use analytics::Analytics;
pub use catalog::Catalog;
pub use checkout::Checkout;
pub use discounts::Discounts;
pub use orders::Orders;
pub use reviews::Reviews;

/// Typed repositories over one shared store.
#[derive(Clone)]
pub struct Repos {
    pub users: Repo<User>,
    pub products: Repo<Product>,
    pub categories: Repo<Category>,
    pub brands: Repo<Brand>,
    pub orders: Repo<Order>,
    pub discounts: Repo<Discount>,
    pub reviews: Repo<Review>,
    pub pending: Repo<PendingPayment>,
}

impl Repos {
    pub fn new(store: SharedStore) -> Self {
        Self {
            users: Repo::new(store.clone()), products: Repo::new(store.clone()), categories: Repo::new(store.clone()),
            brands: Repo::new(store.clone()), orders: Repo::new(store.clone()), discounts: Repo::new(store.clone()),
            reviews: Repo::new(store.clone()), pending: Repo::new(store),
        }
    }
}

/// Publishes domain events to NATS when a connection is configured.
#[derive(Clone, Default)]
pub struct EventPublisher {
    nats: Option<async_nats::Client>,
}

impl EventPublisher {
    pub fn new(nats: Option<async_nats::Client>) -> Self { Self { nats } }

    /// Best effort: failures are logged and never surface to the caller.
    pub async fn publish(&self, events: Vec<DomainEvent>) {
        let Some(client) = &self.nats else { return };
        for event in events {
            let payload = match serde_json::to_vec(&event) {
                Ok(p) => p,
                Err(e) => { warn!(subject = event.subject(), error = %e, "Failed to encode event"); continue; }
            };
            if let Err(e) = client.publish(format!("storefront.{}", event.subject()), payload.into()).await {
                warn!(subject = event.subject(), error = %e, "Failed to publish event");
            }
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub accounts: Accounts,
    pub catalog: Catalog,
    pub reviews: Reviews,
    pub discounts: Discounts,
    pub orders: Orders,
    pub checkout: Checkout,
    pub analytics: Analytics,
}

impl AppState {
    pub fn new(config: Config, store: SharedStore, gateways: Gateways, nats: Option<async_nats::Client>) -> Self {
        let config = Arc::new(config);
        let repos = Repos::new(store);
        let events = EventPublisher::new(nats);
        let discounts = Discounts::new(repos.clone());
        let orders = Orders::new(repos.clone(), events.clone(), discounts.clone(), config.clone());
        Self {
            accounts: Accounts::new(repos.clone(), config.clone()),
            catalog: Catalog::new(repos.clone(), events.clone()),
            reviews: Reviews::new(repos.clone(), events.clone(), config.review_moderation),
            checkout: Checkout::new(repos.clone(), orders.clone(), gateways),
            analytics: Analytics::new(repos, config.low_stock_threshold),
            discounts,
            orders,
            config,
        }
    }
}
