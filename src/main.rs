//! Furnish Storefront - furniture e-commerce backend

use anyhow::{Context, Result};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use furnish_storefront::messaging::EventPublisher;
use furnish_storefront::{db, router, AppConfig, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env().context("loading configuration")?;
    let pool = db::create_pool(&config).await.context("connecting to PostgreSQL")?;
    db::migrate(&pool).await.context("running migrations")?;
    let events = EventPublisher::connect(config.nats_url.as_deref()).await;
    let app = router(AppState::new(pool, &config, events));

    let addr = config.socket_addr();
    tracing::info!(%addr, currency = %config.currency, "furnish storefront listening");
    axum::serve(tokio::net::TcpListener::bind(addr).await?, app).await?;
    Ok(())
}
