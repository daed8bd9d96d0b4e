//! Back-office reporting over orders, products and users.
//!
//! Every report is read-only. Cancelled orders never count as revenue and all
//! buckets are cut on UTC boundaries.

use std::collections::HashMap;

use chrono::{DateTime, Duration, Months, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::Repos;
use crate::domain::aggregates::{Category, Order, OrderStatus, Product, Role, User};
use crate::domain::value_objects::Money;
use crate::Result;

const COMPARISON_DAYS: i64 = 30;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Period { #[default] Daily, Weekly, Monthly }

impl Period {
    fn label(&self, at: DateTime<Utc>) -> String {
        match self {
            Self::Daily => at.format("%Y-%m-%d").to_string(),
            Self::Weekly => at.format("%G-W%V").to_string(),
            Self::Monthly => at.format("%Y-%m").to_string(),
        }
    }

    /// Start of the reporting window: 30 days, 12 weeks or 12 months back.
    fn window_start(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        match self {
            Self::Daily => now - Duration::days(30),
            Self::Weekly => now - Duration::weeks(12),
            Self::Monthly => now.checked_sub_months(Months::new(12)).unwrap_or(now),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RevenuePoint { pub period: String, pub revenue: Money, pub orders: u64 }

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopProduct { pub product_id: Uuid, pub name: String, pub units_sold: u64, pub revenue: Money }

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LowStockProduct { pub id: Uuid, pub name: String, pub slug: String, pub stock: u32 }

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryRevenue { pub category_id: Option<Uuid>, pub name: String, pub revenue: Money, pub units_sold: u64 }

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerGrowth { pub period: String, pub new_customers: u64 }

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TopSpender { pub user_id: Uuid, pub name: String, pub email: String, pub order_count: u64, pub total_spent: Money }

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CustomerReport { pub growth: Vec<CustomerGrowth>, pub top_spenders: Vec<TopSpender> }

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DashboardStats {
    pub total_revenue: Money,
    pub total_orders: u64,
    pub total_customers: u64,
    pub total_products: u64,
    pub pending_orders: u64,
    pub low_stock_products: u64,
    /// Last 30 days against the 30 before, in percent.
    pub revenue_change: f64,
    pub orders_change: f64,
    pub customers_change: f64,
}

#[derive(Clone, Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AllAnalytics {
    pub stats: DashboardStats,
    pub revenue: Vec<RevenuePoint>,
    pub top_products: Vec<TopProduct>,
    pub low_stock: Vec<LowStockProduct>,
    pub category_revenue: Vec<CategoryRevenue>,
    pub customers: CustomerReport,
}

/// Percent change from `previous` to `current`, one decimal place. Zero when there is no baseline.
pub fn percent_change(current: Decimal, previous: Decimal) -> f64 {
    if previous.is_zero() { return 0.0; }
    ((current - previous) / previous * Decimal::ONE_HUNDRED).round_dp(1).to_f64().unwrap_or(0.0)
}

fn counts_as_revenue(order: &Order) -> bool { order.status != OrderStatus::Cancelled }

pub fn revenue_series(orders: &[Order], period: Period, now: DateTime<Utc>) -> Vec<RevenuePoint> {
    let start = period.window_start(now);
    let mut buckets: Vec<RevenuePoint> = Vec::new();
    let mut sorted: Vec<&Order> = orders.iter().filter(|o| counts_as_revenue(o) && o.created_at >= start && o.created_at <= now).collect();
    sorted.sort_by_key(|o| o.created_at);
    for order in sorted {
        let label = period.label(order.created_at);
        match buckets.last_mut() {
            Some(point) if point.period == label => {
                point.revenue = point.revenue.add(&order.total);
                point.orders += 1;
            }
            _ => buckets.push(RevenuePoint { period: label, revenue: order.total, orders: 1 }),
        }
    }
    buckets
}

pub fn top_products(orders: &[Order], limit: usize) -> Vec<TopProduct> {
    let mut by_product: HashMap<Uuid, TopProduct> = HashMap::new();
    for item in orders.iter().filter(|o| counts_as_revenue(o)).flat_map(|o| &o.items) {
        let entry = by_product.entry(item.product_id).or_insert_with(|| TopProduct {
            product_id: item.product_id, name: item.name.clone(), units_sold: 0, revenue: Money::ZERO,
        });
        entry.units_sold += u64::from(item.quantity);
        entry.revenue = entry.revenue.add(&item.line_total());
    }
    let mut ranked: Vec<TopProduct> = by_product.into_values().collect();
    ranked.sort_by(|a, b| b.units_sold.cmp(&a.units_sold).then_with(|| b.revenue.cmp(&a.revenue)).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(limit);
    ranked
}

pub fn low_stock(products: &[Product], threshold: u32) -> Vec<LowStockProduct> {
    let mut low: Vec<LowStockProduct> = products.iter()
        .filter(|p| p.is_low_stock(threshold))
        .map(|p| LowStockProduct { id: p.id, name: p.name.clone(), slug: p.slug.as_str().to_string(), stock: p.stock })
        .collect();
    low.sort_by(|a, b| a.stock.cmp(&b.stock).then_with(|| a.name.cmp(&b.name)));
    low
}

/// Revenue per category, resolved through the current catalog. Lines whose
/// product is gone or uncategorised land under "Uncategorized".
pub fn category_revenue(orders: &[Order], products: &[Product], category_names: &HashMap<Uuid, String>) -> Vec<CategoryRevenue> {
    let category_of: HashMap<Uuid, Option<Uuid>> = products.iter().map(|p| (p.id, p.category_id)).collect();
    let mut by_category: HashMap<Option<Uuid>, CategoryRevenue> = HashMap::new();
    for item in orders.iter().filter(|o| counts_as_revenue(o)).flat_map(|o| &o.items) {
        let category_id = category_of.get(&item.product_id).copied().flatten().filter(|id| category_names.contains_key(id));
        let entry = by_category.entry(category_id).or_insert_with(|| CategoryRevenue {
            category_id,
            name: category_id.and_then(|id| category_names.get(&id).cloned()).unwrap_or_else(|| "Uncategorized".into()),
            revenue: Money::ZERO, units_sold: 0,
        });
        entry.revenue = entry.revenue.add(&item.line_total());
        entry.units_sold += u64::from(item.quantity);
    }
    let mut rows: Vec<CategoryRevenue> = by_category.into_values().collect();
    rows.sort_by(|a, b| b.revenue.cmp(&a.revenue).then_with(|| a.name.cmp(&b.name)));
    rows
}

/// New customer sign-ups per month over the last 12 months.
pub fn customer_growth(users: &[User], now: DateTime<Utc>) -> Vec<CustomerGrowth> {
    let start = Period::Monthly.window_start(now);
    let mut months: Vec<CustomerGrowth> = Vec::new();
    let mut joined: Vec<DateTime<Utc>> = users.iter().filter(|u| u.role == Role::User && u.created_at >= start).map(|u| u.created_at).collect();
    joined.sort();
    for at in joined {
        let label = Period::Monthly.label(at);
        match months.last_mut() {
            Some(m) if m.period == label => m.new_customers += 1,
            _ => months.push(CustomerGrowth { period: label, new_customers: 1 }),
        }
    }
    months
}

pub fn top_spenders(orders: &[Order], users: &[User], limit: usize) -> Vec<TopSpender> {
    let mut totals: HashMap<Uuid, (u64, Money)> = HashMap::new();
    for order in orders.iter().filter(|o| counts_as_revenue(o)) {
        let entry = totals.entry(order.user_id).or_insert((0, Money::ZERO));
        entry.0 += 1;
        entry.1 = entry.1.add(&order.total);
    }
    let mut ranked: Vec<TopSpender> = users.iter()
        .filter_map(|u| totals.get(&u.id).map(|(count, spent)| TopSpender {
            user_id: u.id, name: u.name.clone(), email: u.email.clone(), order_count: *count, total_spent: *spent,
        }))
        .collect();
    ranked.sort_by(|a, b| b.total_spent.cmp(&a.total_spent).then_with(|| a.name.cmp(&b.name)));
    ranked.truncate(limit);
    ranked
}

pub fn dashboard_stats(orders: &[Order], users: &[User], products: &[Product], low_stock_threshold: u32, now: DateTime<Utc>) -> DashboardStats {
    let current_start = now - Duration::days(COMPARISON_DAYS);
    let previous_start = current_start - Duration::days(COMPARISON_DAYS);
    let in_current = |at: DateTime<Utc>| at >= current_start && at <= now;
    let in_previous = |at: DateTime<Utc>| at >= previous_start && at < current_start;

    let revenue_orders: Vec<&Order> = orders.iter().filter(|o| counts_as_revenue(o)).collect();
    let sum = |pred: &dyn Fn(DateTime<Utc>) -> bool| -> Decimal {
        revenue_orders.iter().filter(|o| pred(o.created_at)).map(|o| o.total.amount()).sum()
    };
    let customers: Vec<&User> = users.iter().filter(|u| u.role == Role::User).collect();
    let count_orders = |pred: &dyn Fn(DateTime<Utc>) -> bool| orders.iter().filter(|o| pred(o.created_at)).count();
    let count_customers = |pred: &dyn Fn(DateTime<Utc>) -> bool| customers.iter().filter(|u| pred(u.created_at)).count();

    DashboardStats {
        total_revenue: revenue_orders.iter().map(|o| o.total).sum(),
        total_orders: orders.len() as u64,
        total_customers: customers.len() as u64,
        total_products: products.len() as u64,
        pending_orders: orders.iter().filter(|o| o.status == OrderStatus::Pending).count() as u64,
        low_stock_products: products.iter().filter(|p| p.is_low_stock(low_stock_threshold)).count() as u64,
        revenue_change: percent_change(sum(&in_current), sum(&in_previous)),
        orders_change: percent_change(Decimal::from(count_orders(&in_current)), Decimal::from(count_orders(&in_previous))),
        customers_change: percent_change(Decimal::from(count_customers(&in_current)), Decimal::from(count_customers(&in_previous))),
    }
}

#[derive(Clone)]
pub struct Analytics {
    repos: Repos,
    low_stock_threshold: u32,
}

impl Analytics {
    pub fn new(repos: Repos, low_stock_threshold: u32) -> Self { Self { repos, low_stock_threshold } }

    async fn orders(&self) -> Result<Vec<Order>> { Ok(self.repos.orders.all().await?) }
    async fn products(&self) -> Result<Vec<Product>> { Ok(self.repos.products.all().await?) }
    async fn users(&self) -> Result<Vec<User>> { Ok(self.repos.users.all().await?) }
    async fn categories(&self) -> Result<Vec<Category>> { Ok(self.repos.categories.all().await?) }

    pub async fn stats(&self) -> Result<DashboardStats> {
        let (orders, users, products) = tokio::try_join!(self.orders(), self.users(), self.products())?;
        Ok(dashboard_stats(&orders, &users, &products, self.low_stock_threshold, Utc::now()))
    }

    pub async fn revenue(&self, period: Period) -> Result<Vec<RevenuePoint>> {
        Ok(revenue_series(&self.orders().await?, period, Utc::now()))
    }

    pub async fn top_products(&self, limit: usize) -> Result<Vec<TopProduct>> {
        Ok(top_products(&self.orders().await?, limit))
    }

    pub async fn low_stock(&self) -> Result<Vec<LowStockProduct>> {
        Ok(low_stock(&self.products().await?, self.low_stock_threshold))
    }

    pub async fn category_revenue(&self) -> Result<Vec<CategoryRevenue>> {
        let (orders, products, categories) = tokio::try_join!(self.orders(), self.products(), self.categories())?;
        let names: HashMap<Uuid, String> = categories.into_iter().map(|c| (c.id, c.name)).collect();
        Ok(category_revenue(&orders, &products, &names))
    }

    pub async fn customers(&self, limit: usize) -> Result<CustomerReport> {
        let (orders, users) = tokio::try_join!(self.orders(), self.users())?;
        Ok(CustomerReport { growth: customer_growth(&users, Utc::now()), top_spenders: top_spenders(&orders, &users, limit) })
    }

    /// Every report at once. Any failing query fails the whole response.
    pub async fn all(&self, period: Period, limit: usize) -> Result<AllAnalytics> {
        let (stats, revenue, top_products, low_stock, category_revenue, customers) = tokio::try_join!(
            self.stats(),
            self.revenue(period),
            self.top_products(limit),
            self.low_stock(),
            self.category_revenue(),
            self.customers(limit),
        )?;
        Ok(AllAnalytics { stats, revenue, top_products, low_stock, category_revenue, customers })
    }
}
