//! Runtime configuration read from the process environment (after `.env` is loaded).

use rust_decimal::Decimal;
use std::str::FromStr;

use crate::domain::value_objects::Money;
use crate::{EcommerceError, Result};

#[derive(Clone, Debug)]
pub struct Config {
    pub port: u16,
    /// Absent means the in-memory store.
    pub database_url: Option<String>,
    pub nats_url: Option<String>,
    pub jwt_secret: String,
    pub token_ttl_hours: i64,
    /// Shared secret the OAuth front end presents when reporting a sign-in.
    pub auth_bridge_secret: Option<String>,
    pub shipping_fee: Money,
    pub review_moderation: bool,
    pub low_stock_threshold: u32,
    pub public_base_url: String,
    pub payment_remote_verify: bool,
    pub esewa: EsewaConfig,
    pub khalti: KhaltiConfig,
}

#[derive(Clone, Debug)]
pub struct EsewaConfig { pub product_code: String, pub secret_key: String, pub form_url: String, pub status_url: String }

#[derive(Clone, Debug)]
pub struct KhaltiConfig { pub secret_key: Option<String>, pub base_url: String }

impl Config {
    pub fn from_env() -> Result<Self> { Self::from_lookup(|key| std::env::var(key).ok()) }

    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| get(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty());
        let jwt_secret = get("JWT_SECRET").ok_or_else(|| EcommerceError::Config("JWT_SECRET must be set".into()))?;
        let shipping: Decimal = parse(get("SHIPPING_FEE"), "SHIPPING_FEE", Decimal::ONE_HUNDRED)?;
        if shipping.is_sign_negative() { return Err(EcommerceError::Config("SHIPPING_FEE cannot be negative".into())); }
        Ok(Self {
            port: parse(get("PORT"), "PORT", 8083)?,
            database_url: get("DATABASE_URL"),
            nats_url: get("NATS_URL"),
            jwt_secret,
            token_ttl_hours: parse(get("TOKEN_TTL_HOURS"), "TOKEN_TTL_HOURS", 24)?,
            auth_bridge_secret: get("AUTH_BRIDGE_SECRET"),
            shipping_fee: Money::new(shipping),
            review_moderation: parse(get("REVIEW_MODERATION"), "REVIEW_MODERATION", false)?,
            low_stock_threshold: parse(get("LOW_STOCK_THRESHOLD"), "LOW_STOCK_THRESHOLD", 10)?,
            public_base_url: get("PUBLIC_BASE_URL").unwrap_or_else(|| "http://localhost:3000".into()).trim_end_matches('/').to_string(),
            payment_remote_verify: parse(get("PAYMENT_REMOTE_VERIFY"), "PAYMENT_REMOTE_VERIFY", true)?,
            esewa: EsewaConfig {
                product_code: get("ESEWA_PRODUCT_CODE").unwrap_or_else(|| "EPAYTEST".into()),
                secret_key: get("ESEWA_SECRET_KEY").unwrap_or_else(|| "8gBm/:&EnhH.1/q".into()),
                form_url: get("ESEWA_FORM_URL").unwrap_or_else(|| "https://rc-epay.esewa.com.np/api/epay/main/v2/form".into()),
                status_url: get("ESEWA_STATUS_URL").unwrap_or_else(|| "https://rc.esewa.com.np/api/epay/transaction/status/".into()),
            },
            khalti: KhaltiConfig {
                secret_key: get("KHALTI_SECRET_KEY"),
                base_url: get("KHALTI_BASE_URL").unwrap_or_else(|| "https://dev.khalti.com/api/v2".into()).trim_end_matches('/').to_string(),
            },
        })
    }
}

fn parse<T: FromStr>(raw: Option<String>, key: &str, default: T) -> Result<T> {
    match raw {
        None => Ok(default),
        Some(v) => v.parse().map_err(|_| EcommerceError::Config(format!("{} has an invalid value: {}", key, v))),
    }
}
