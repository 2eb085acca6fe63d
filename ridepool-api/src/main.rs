use std::net::SocketAddr;
use std::sync::Arc;

use ridepool_api::{
    app,
    state::{AppState, AuthConfig},
};
use ridepool_engine::{Coordinator, NoopLedger};
use ridepool_store::{Config, DbClient, PgBookingStore, PgRideStore};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "ridepool_api=debug,tower_http=debug,axum::rejection=trace".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::load()?;
    tracing::info!("Starting ridepool API on port {}", config.server.port);

    let db = DbClient::new(&config.database.url).await?;
    db.migrate().await?;

    let rides = Arc::new(PgRideStore::new(db.pool.clone()));
    let bookings = Arc::new(PgBookingStore::new(db.pool.clone()));
    let coordinator = Arc::new(Coordinator::new(
        rides.clone(),
        bookings.clone(),
        Arc::new(NoopLedger),
    ));

    let state = AppState {
        coordinator,
        rides,
        bookings,
        auth: AuthConfig {
            secret: config.auth.jwt_secret.clone(),
        },
    };

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app(state)).await?;
    Ok(())
}
