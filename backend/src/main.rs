#[macro_use]
extern crate rocket;

use std::sync::Arc;

use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::{
    config::{RelayConfig, SessionTimings},
    persistence::{pgsql::PostgresDatabase, Store},
    provider::SpotifyApi,
    relay::Relay,
};

mod authentication;
mod config;
mod credentials;
mod error;
mod longpoll;
mod model;
mod normalize;
mod persistence;
mod provider;
mod publisher;
mod relay;
mod routes;
mod session;
mod sharing;

#[rocket::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,nowplaying_relay=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = RelayConfig::from_env();
    let timings = SessionTimings::default();

    let provider = SpotifyApi::connect(&config, timings.upstream_timeout)?;
    let relay = Arc::new(Relay::new(&config, provider, timings));
    if let Err(err) = relay.ensure_configured() {
        warn!("now-playing endpoints will report a configuration error: {}", err);
    }

    let store: Option<Store> = match &config.database_url {
        Some(url) => {
            let store = PostgresDatabase::connect(url).await?;
            store.create_tables().await?;
            info!("sharing routes enabled");
            Some(store)
        }
        None => {
            warn!("DATABASE_URL is not set, sharing routes are disabled");
            None
        }
    };

    let _rocket = routes::build(&config, relay, store).launch().await?;
    Ok(())
}
