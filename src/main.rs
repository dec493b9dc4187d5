use guestbook::{
    app::build_app,
    config::{
        session::{validate_production_config, SessionConfig},
        AppConfig,
    },
    db::{self, Migrator},
    middleware::csrf::CsrfGuard,
    services::{
        email_service::create_mailer,
        mail_queue::{MailQueue, TracingDeliveryObserver},
        oauth_service::{GoogleProvider, OAuthConfig, OAuthService, Provider},
        session_service::SessionService,
    },
    AppState,
};

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "guestbook=debug,tower_http=debug,axum::rejection=trace".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = AppConfig::from_env()?;
    validate_production_config()?;

    // Database connection
    let pool = db::create_pool(&config.database_url).await?;

    // Run migrations before anything touches the store
    let report = Migrator::embedded().run(&pool).await.map_err(|e| {
        tracing::error!("Migration failed, refusing to start: {}", e);
        e
    })?;
    tracing::info!(
        "Schema at version {} ({} migration(s) applied)",
        report.final_version(),
        report.applied.len()
    );

    // Background mail delivery
    let (mail_queue, mail_workers) = MailQueue::spawn(
        create_mailer(),
        Arc::new(TracingDeliveryObserver),
        config.mail_queue_capacity,
        config.mail_workers,
    );

    // OAuth providers
    let mut oauth_service = OAuthService::new(pool.clone());
    match OAuthConfig::google_from_env(&config.base_url).and_then(GoogleProvider::new) {
        Ok(google) => {
            tracing::info!("Google login enabled");
            oauth_service = oauth_service.with_provider(Provider::Google, Arc::new(google));
        }
        Err(e) => tracing::info!("Google login disabled: {}", e),
    }

    let app_state = AppState::new(
        pool.clone(),
        mail_queue,
        &config.base_url,
        SessionConfig::from_env(),
        CsrfGuard::new(config.csrf_exempt_paths.clone()),
    )
    .with_oauth_service(oauth_service);

    spawn_purge_task(
        app_state.session_service.clone(),
        app_state.oauth_service.clone(),
        config.session_purge_interval,
    );

    let app = build_app(app_state);

    // Start server
    let listener = tokio::net::TcpListener::bind(config.bind_addr()).await?;
    tracing::info!("Server running on {}", config.base_url);
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // The router held the last queue handles, so queued mail drains here.
    mail_workers.join().await;
    pool.close().await;

    Ok(())
}

/// Deletes expired sessions and OAuth states on a fixed interval.
fn spawn_purge_task(
    session_service: Arc<SessionService>,
    oauth_service: Arc<OAuthService>,
    interval: std::time::Duration,
) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            match session_service.purge_expired().await {
                Ok(0) => {}
                Ok(n) => tracing::debug!("Purged {} expired session(s)", n),
                Err(e) => tracing::warn!("Session purge failed: {}", e),
            }
            if let Err(e) = oauth_service.purge_expired_states().await {
                tracing::warn!("OAuth state purge failed: {}", e);
            }
        }
    });
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down");
}
