//! Orders: cash-on-delivery placement, history, cancellation and admin status changes.

use serde_json::json;
use std::sync::Arc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use super::{Discounts, EventPublisher, Repos};
use crate::config::Config;
use crate::domain::aggregates::{AppliedDiscount, Cart, CartItem, NewOrder, Order, OrderDraft, OrderStatus, PaymentDetails, PaymentMethod, ShippingAddress};
use crate::store::StoreError;
use crate::{EcommerceError, Result};

const NUMBER_ATTEMPTS: usize = 3;

#[derive(Clone)]
pub struct Orders {
    repos: Repos,
    events: EventPublisher,
    discounts: Discounts,
    config: Arc<Config>,
}

impl Orders {
    pub fn new(repos: Repos, events: EventPublisher, discounts: Discounts, config: Arc<Config>) -> Self {
        Self { repos, events, discounts, config }
    }

    /// Prices a submitted cart: subtotal from the snapshot, configured shipping, optional code.
    pub async fn draft(&self, items: Vec<CartItem>, address_id: Uuid, method: PaymentMethod, discount_code: Option<&str>) -> Result<OrderDraft> {
        let cart = Cart::from_items(items)?;
        if cart.is_empty() { return Err(EcommerceError::Validation("Cart is empty".into())); }
        let discount = match discount_code.map(str::trim).filter(|c| !c.is_empty()) {
            Some(code) => {
                let ids: Vec<Uuid> = cart.items().iter().map(|i| i.product_id).collect();
                let (discount, amount) = self.discounts.quote(code, cart.subtotal(), &ids).await?;
                Some(AppliedDiscount { code: discount.code, amount })
            }
            None => None,
        };
        Ok(OrderDraft::new(&cart, address_id, method, self.config.shipping_fee, discount))
    }

    pub async fn shipping_address(&self, user_id: Uuid, address_id: Uuid) -> Result<ShippingAddress> {
        let user = self.repos.users.get(user_id).await?.ok_or(EcommerceError::NotFound("User"))?;
        Ok(user.find_address(address_id).ok_or(EcommerceError::NotFound("Address"))?.to_shipping())
    }

    /// Cash-on-delivery checkout. Synchronous: the order either exists afterwards or the call failed.
    #[instrument(skip(self, items, discount_code))]
    pub async fn place_cash_on_delivery(&self, user_id: Uuid, address_id: Uuid, items: Vec<CartItem>, discount_code: Option<&str>) -> Result<Order> {
        let shipping_address = self.shipping_address(user_id, address_id).await?;
        let draft = self.draft(items, address_id, PaymentMethod::Cod, discount_code).await?;
        self.persist(user_id, shipping_address, draft, None).await
    }

    /// Writes a new order from `draft`, paid when `payment` is given.
    ///
    /// A clash on the payment transaction id is returned as [`StoreError::Duplicate`]
    /// so the caller can resolve it to the existing order.
    pub(crate) async fn persist(&self, user_id: Uuid, shipping_address: ShippingAddress, draft: OrderDraft, payment: Option<PaymentDetails>) -> Result<Order> {
        let new = NewOrder {
            user_id, items: draft.items, shipping_address, payment_method: draft.payment_method,
            shipping_fee: draft.shipping_fee, discount: draft.discount,
        };
        for attempt in 1..=NUMBER_ATTEMPTS {
            let mut order = Order::place(new.clone())?;
            if let Some(details) = &payment { order.mark_paid(details.clone())?; }
            match self.repos.orders.insert(&order).await {
                Ok(()) => {
                    info!(order_id = %order.id, order_number = %order.order_number, total = %order.total, method = ?order.payment_method, "Order placed");
                    if let Some(applied) = &order.discount { self.count_discount_use(applied).await; }
                    self.events.publish(order.take_events()).await;
                    return Ok(order);
                }
                Err(StoreError::Duplicate(key)) if !key.contains("transaction") => {
                    warn!(attempt, "Order number collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(StoreError::Duplicate("orders.orderNumber".into()).into())
    }

    async fn count_discount_use(&self, applied: &AppliedDiscount) {
        match self.discounts.by_code(applied.code.as_str()).await {
            Ok(discount) => self.discounts.record_use(discount.id).await,
            Err(e) => warn!(code = %applied.code, error = %e, "Could not count discount use"),
        }
    }

    pub async fn find_by_transaction(&self, transaction_id: &str) -> Result<Option<Order>> {
        Ok(self.repos.orders.find_one(json!({ "paymentDetails": { "transactionId": transaction_id } })).await?)
    }

    /// The buyer's orders, newest first.
    pub async fn for_user(&self, user_id: Uuid) -> Result<Vec<Order>> {
        let mut orders = self.repos.orders.find(json!({ "userId": user_id })).await?;
        orders.reverse();
        Ok(orders)
    }

    /// An order visible to its owner or to an admin.
    pub async fn get(&self, viewer: Uuid, is_admin: bool, order_id: Uuid) -> Result<Order> {
        self.repos.orders.get(order_id).await?.filter(|o| is_admin || o.user_id == viewer).ok_or(EcommerceError::NotFound("Order"))
    }

    #[instrument(skip(self))]
    pub async fn cancel(&self, user_id: Uuid, order_id: Uuid) -> Result<Order> {
        let mut order = self.get(user_id, false, order_id).await?;
        order.cancel_by_customer()?;
        self.repos.orders.save(&order).await?;
        info!(order_id = %order.id, "Order cancelled by customer");
        self.events.publish(order.take_events()).await;
        Ok(order)
    }

    pub async fn list(&self, status: Option<OrderStatus>) -> Result<Vec<Order>> {
        let filter = match status { Some(s) => json!({ "status": s }), None => json!({}) };
        let mut orders = self.repos.orders.find(filter).await?;
        orders.reverse();
        Ok(orders)
    }

    #[instrument(skip(self, description))]
    pub async fn update_status(&self, order_id: Uuid, status: OrderStatus, description: Option<String>) -> Result<Order> {
        let mut order = self.repos.orders.get(order_id).await?.ok_or(EcommerceError::NotFound("Order"))?;
        order.update_status(status, description)?;
        self.repos.orders.save(&order).await?;
        info!(order_id = %order.id, status = status.as_str(), "Order status updated");
        self.events.publish(order.take_events()).await;
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::aggregates::{AddressInput, PaymentStatus, User};
    use crate::domain::value_objects::Money;
    use crate::store::MemoryStore;

    async fn setup() -> (Orders, Repos, Uuid, Uuid) {
        let repos = Repos::new(Arc::new(MemoryStore::new()));
        let config = Config::from_lookup(|k| (k == "JWT_SECRET").then(|| "s".to_string())).unwrap();
        let mut user = User::register("Buyer".into(), "buyer@shop.np", "hash".into());
        let address: AddressInput = serde_json::from_value(json!({
            "fullName": "Buyer", "phone": "9800000000", "street": "Thamel", "city": "Kathmandu", "state": "Bagmati",
        })).unwrap();
        let address_id = user.add_address(address).id;
        repos.users.insert(&user).await.unwrap();
        let orders = Orders::new(repos.clone(), EventPublisher::default(), Discounts::new(repos.clone()), Arc::new(config));
        (orders, repos, user.id, address_id)
    }

    fn item(price: i64, quantity: u32) -> CartItem {
        CartItem { product_id: Uuid::now_v7(), name: "Momo Steamer".into(), price: Money::from_major(price), quantity, image: None, category_id: None }
    }

    #[tokio::test]
    async fn test_cash_on_delivery_totals() {
        let (orders, _, user_id, address_id) = setup().await;
        let order = orders.place_cash_on_delivery(user_id, address_id, vec![item(500, 2)], None).await.unwrap();
        assert_eq!(order.subtotal, Money::from_major(1000));
        assert_eq!(order.total, Money::from_major(1100));
        assert_eq!(order.status, OrderStatus::Pending);
        assert_eq!(order.payment_status, PaymentStatus::Pending);
        assert_eq!(order.timeline.len(), 1);
        assert_eq!(order.shipping_address.city, "Kathmandu");
    }

    #[tokio::test]
    async fn test_unknown_address_rejected() {
        let (orders, repos, user_id, _) = setup().await;
        let err = orders.place_cash_on_delivery(user_id, Uuid::now_v7(), vec![item(500, 1)], None).await.unwrap_err();
        assert!(matches!(err, EcommerceError::NotFound("Address")));
        assert_eq!(repos.orders.count(json!({})).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_bad_lines_rejected() {
        let (orders, _, user_id, address_id) = setup().await;
        assert!(matches!(orders.place_cash_on_delivery(user_id, address_id, vec![item(0, 1)], None).await, Err(EcommerceError::Validation(_))));
        assert!(matches!(orders.place_cash_on_delivery(user_id, address_id, vec![], None).await, Err(EcommerceError::Validation(_))));
        assert!(matches!(orders.place_cash_on_delivery(user_id, address_id, vec![item(500, 100_000)], None).await, Err(EcommerceError::Validation(_))));
    }

    #[tokio::test]
    async fn test_customer_cancel_and_admin_transitions() {
        let (orders, _, user_id, address_id) = setup().await;
        let order = orders.place_cash_on_delivery(user_id, address_id, vec![item(100, 1)], None).await.unwrap();
        assert!(matches!(orders.cancel(Uuid::now_v7(), order.id).await, Err(EcommerceError::NotFound(_))));
        let cancelled = orders.cancel(user_id, order.id).await.unwrap();
        assert_eq!(cancelled.status, OrderStatus::Cancelled);
        assert!(matches!(orders.update_status(order.id, OrderStatus::Shipped, None).await, Err(EcommerceError::BusinessRule(_))));

        let other = orders.place_cash_on_delivery(user_id, address_id, vec![item(100, 1)], None).await.unwrap();
        let shipped = orders.update_status(other.id, OrderStatus::Shipped, Some("Sent with courier".into())).await.unwrap();
        assert_eq!(shipped.timeline.last().unwrap().description, "Sent with courier");
        assert_eq!(orders.list(Some(OrderStatus::Shipped)).await.unwrap().len(), 1);
        assert_eq!(orders.for_user(user_id).await.unwrap()[0].id, other.id);
    }
}
