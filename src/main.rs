//! Storefront - storefront and back-office API server

use anyhow::Result;
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use storefront::payments::{esewa::EsewaGateway, khalti::KhaltiGateway, Gateways};
use storefront::store::{MemoryStore, PgStore, SharedStore};
use storefront::{api, AppState, Config};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry().with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into())).with(tracing_subscriber::fmt::layer()).init();
    let config = Config::from_env()?;

    let store: SharedStore = match &config.database_url {
        Some(url) => {
            let pg = PgStore::connect(url, 10).await?;
            pg.migrate().await?;
            Arc::new(pg)
        }
        None => {
            tracing::warn!("DATABASE_URL not set, using the in-memory store; data is lost on restart");
            Arc::new(MemoryStore::new())
        }
    };
    let nats = match &config.nats_url {
        Some(url) => match async_nats::connect(url.as_str()).await {
            Ok(client) => Some(client),
            Err(e) => { tracing::warn!(error = %e, "NATS unavailable, events will not be published"); None }
        },
        None => None,
    };

    if !config.payment_remote_verify {
        tracing::warn!("PAYMENT_REMOTE_VERIFY is off: gateway returns are trusted without a status lookup and unsigned eSewa returns are refused");
    }
    let http = reqwest::Client::builder().timeout(std::time::Duration::from_secs(15)).build()?;
    let gateways = Gateways::new()
        .with(Arc::new(EsewaGateway::new(config.esewa.clone(), http.clone(), &config.public_base_url, config.payment_remote_verify)))
        .with(Arc::new(KhaltiGateway::new(config.khalti.clone(), http, &config.public_base_url, config.payment_remote_verify)));

    let port = config.port;
    let app = api::router(AppState::new(config, store, gateways, nats));
    tracing::info!("🚀 Storefront listening on 0.0.0.0:{}", port);
    axum::serve(tokio::net::TcpListener::bind(format!("0.0.0.0:{}", port)).await?, app).await?;
    Ok(())
}
