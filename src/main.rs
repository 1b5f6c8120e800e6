use std::sync::Arc;
use std::time::Duration;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod aqi;
mod bot;
mod cache;
mod config;
mod error;
mod reading;
mod routes;
mod sensor;
mod service;
mod telegram;

use bot::Bot;
use cache::ReadingCache;
use config::Config;
use routes::{create_router, AppState};
use sensor::SensorClient;
use service::{ReadingService, SystemClock};
use telegram::TelegramClient;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables from .env file
    dotenv::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "purpleair_aqi_bot=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Missing credentials stop us here, before anything starts polling
    let config = Config::from_env()?;

    let sensor_client = Arc::new(SensorClient::new(
        config.purpleair_base_url.clone(),
        Duration::from_secs(config.http_timeout_secs),
    )?);

    let cache = Arc::new(ReadingCache::new(config.cache_ttl()));
    let ttl_secs = cache.ttl().num_seconds();

    let service = Arc::new(ReadingService::new(
        sensor_client,
        cache,
        Arc::new(SystemClock),
        config.sensor_id.clone(),
    ));

    let telegram = Arc::new(TelegramClient::new(
        &config.telegram_api_url,
        &config.bot_token,
        Duration::from_secs(config.poll_timeout_secs),
    )?);

    let bot = Arc::new(Bot::new(
        telegram,
        Arc::clone(&service),
        config.poll_timeout_secs,
    ));

    let app = create_router(AppState { service }).layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&config.http_bind_addr).await?;
    tracing::info!(
        "Serving AQI for sensor {} on http://{} (cache TTL {}s)",
        config.sensor_id,
        config.http_bind_addr,
        ttl_secs
    );

    tokio::select! {
        result = axum::serve(listener, app) => result?,
        _ = bot.run() => {}
    }

    Ok(())
}
