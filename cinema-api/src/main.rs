use anyhow::Context;
use cinema_api::middleware::JwtVerifier;
use cinema_api::{app, worker, AppState};
use cinema_core::booking::{BookingConfig, BookingService};
use cinema_core::catalog::CatalogService;
use cinema_core::identity::TokenVerifier;
use cinema_core::reconciler::StatusReconciler;
use cinema_core::ticket::TicketIssuer;
use cinema_store::{
    DbClient, EventProducer, PostgresCatalogRepository, PostgresReservationRepository, RedisClient,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cinema_api=debug,cinema_core=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = cinema_store::app_config::Config::load().context("Failed to load config")?;
    tracing::info!("Starting Cinema API on port {}", config.server.port);

    // Postgres
    let db = DbClient::new(&config.database.url)
        .await
        .context("Failed to connect to Postgres")?;
    db.migrate().await.context("Failed to run migrations")?;

    // Redis
    let redis = RedisClient::new(&config.redis.url)
        .await
        .context("Failed to connect to Redis")?;
    if let Err(e) = redis.ping().await {
        tracing::warn!("Redis not reachable yet, reads will fall back to Postgres: {}", e);
    }

    // Kafka
    let kafka = &config.kafka;
    let producer = EventProducer::new(&kafka.brokers, &kafka.payment_requests_topic, &kafka.payment_events_topic)
        .context("Failed to create Kafka producer")?;

    let reservations = Arc::new(PostgresReservationRepository::new(db.pool.clone()));
    let catalog = Arc::new(CatalogService::new(
        Arc::new(redis),
        Arc::new(PostgresCatalogRepository::new(db.pool.clone())),
        config.business_rules.default_price,
    ));
    let rules = &config.business_rules;
    let booking = Arc::new(BookingService::new(
        catalog.clone(),
        reservations.clone(),
        Arc::new(producer),
        BookingConfig {
            currency: rules.currency.clone(),
            pending_ttl: chrono::Duration::seconds(i64::try_from(rules.pending_ttl_seconds).unwrap_or(i64::MAX)),
        },
    ));

    let verifier: Arc<dyn TokenVerifier> = match (&config.auth.public_key_pem, &config.auth.jwt_secret) {
        (Some(pem), _) => Arc::new(
            JwtVerifier::rs256(pem, config.auth.client_id.clone()).context("Invalid auth.public_key_pem")?,
        ),
        (None, Some(secret)) => Arc::new(JwtVerifier::hs256(secret.expose().as_bytes(), config.auth.client_id.clone())),
        (None, None) => anyhow::bail!("Either auth.public_key_pem or auth.jwt_secret must be set"),
    };
    let tickets = Arc::new(TicketIssuer::new(config.tickets.dir.clone()));

    // Background consumers and sweep
    let backoff = Duration::from_secs(kafka.reconnect_backoff_seconds);
    worker::spawn_outcome_subscriber(
        &kafka.brokers,
        &kafka.reconciler_group,
        &kafka.payment_events_topic,
        backoff,
        Arc::new(StatusReconciler::new(reservations)),
    );
    worker::spawn_outcome_subscriber(
        &kafka.brokers,
        &kafka.ticket_group,
        &kafka.payment_events_topic,
        backoff,
        tickets.clone(),
    );
    worker::spawn_abandonment_sweep(booking.clone(), Duration::from_secs(rules.sweep_interval_seconds.max(1)));

    let app_state = AppState {
        booking,
        catalog,
        verifier,
        tickets,
    };
    let app = app(app_state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {}", addr))?;
    axum::serve(listener, app).await.context("Server error")?;
    Ok(())
}
