pub mod app;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;

// Make test_utils available for both unit tests and integration tests
pub mod test_utils;

use config::session::SessionConfig;
use middleware::csrf::CsrfGuard;
use repositories::{GuestbookRepository, SqliteGuestbookRepository, SqliteUserRepository};
use services::{
    auth_service::AuthService, mail_queue::MailQueue, oauth_service::OAuthService,
    session_service::SessionService, user_service::UserService,
};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub user_service: Arc<UserService>,
    pub auth_service: Arc<AuthService>,
    pub session_service: Arc<SessionService>,
    pub oauth_service: Arc<OAuthService>,
    pub guestbook_repository: Arc<dyn GuestbookRepository>,
    pub csrf: Arc<CsrfGuard>,
    pub session_config: Arc<SessionConfig>,
    pub pool: sqlx::SqlitePool,
}

impl AppState {
    /// Wires the SQLite-backed services. OAuth starts with no providers; see
    /// [`AppState::with_oauth_service`].
    pub fn new(
        pool: sqlx::SqlitePool,
        mail_queue: MailQueue,
        base_url: &str,
        session_config: SessionConfig,
        csrf: CsrfGuard,
    ) -> Self {
        let user_repository = Arc::new(SqliteUserRepository::new(pool.clone()));

        Self {
            user_service: Arc::new(UserService::new(
                user_repository.clone(),
                mail_queue,
                base_url,
            )),
            auth_service: Arc::new(AuthService::new(user_repository)),
            session_service: Arc::new(SessionService::with_lifetime(
                pool.clone(),
                session_config.lifetime,
            )),
            oauth_service: Arc::new(OAuthService::new(pool.clone())),
            guestbook_repository: Arc::new(SqliteGuestbookRepository::new(pool.clone())),
            csrf: Arc::new(csrf),
            session_config: Arc::new(session_config),
            pool,
        }
    }

    pub fn with_oauth_service(mut self, oauth_service: OAuthService) -> Self {
        self.oauth_service = Arc::new(oauth_service);
        self
    }
}
