use std::sync::Arc;

use axum::{
    http::{header, Method},
    routing::{get, post},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reminder_api::{
    config::Config,
    db::{self, PgReminderStore, ReminderStore},
    routes,
    services::{
        channels::ChannelSenders, clock::SystemClock, dispatch::Dispatcher,
        scheduler::ReminderScheduler,
    },
    AppState,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Arc::new(Config::from_env()?);

    let pool = db::create_pool(&config.database_url).await?;
    db::run_migrations(&pool).await?;
    info!("Database connected and migrations applied");

    let store: Arc<dyn ReminderStore> = Arc::new(PgReminderStore::new(pool.clone()));
    let dispatcher = Arc::new(Dispatcher::new(ChannelSenders::from_config(&config)));
    // Pending timers are not restored: reminders created before a restart do not fire.
    let scheduler = ReminderScheduler::new(
        store.clone(),
        dispatcher,
        Arc::new(SystemClock),
        config.timezone,
    );
    info!("Reminder scheduler started ({})", config.timezone);

    let state = AppState {
        db: pool,
        store,
        scheduler: scheduler.clone(),
        config: config.clone(),
    };

    let cors = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::ACCEPT])
        .allow_origin(Any);

    let app = Router::new()
        .route("/health", get(routes::health::health_check))
        .route("/metrics", get(routes::metrics::metrics_handler))
        .route(
            "/reminders",
            get(routes::reminders::list_reminders).post(routes::reminders::create_reminder),
        )
        .route("/reminders/calendar", get(routes::reminders::calendar))
        .route("/reminders/scheduled", get(routes::reminders::list_scheduled))
        .route(
            "/reminders/{id}",
            get(routes::reminders::get_reminder)
                .put(routes::reminders::update_reminder)
                .delete(routes::reminders::delete_reminder),
        )
        .route("/reminders/{id}/send", post(routes::reminders::send_now))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state);

    let addr = format!("{}:{}", config.host, config.port);
    info!("Reminder API listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    scheduler.shutdown();
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
