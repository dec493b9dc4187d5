use std::env;

use axum_extra::extract::cookie::{Cookie, SameSite};
use time::Duration;

use super::{current_environment, env_flag_enabled, ConfigError};
use crate::services::session_service::DEFAULT_SESSION_LIFETIME;

/// Cookie carrying the anonymous CSRF token for the signup and login forms.
pub const CSRF_COOKIE: &str = "csrf_token";
/// Cookie binding an OAuth redirect to the browser that started it.
pub const OAUTH_STATE_COOKIE: &str = "oauth_state";

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub secure: bool,
    pub http_only: bool,
    pub same_site: SameSite,
    pub lifetime: Duration,
    pub name: String,
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let mut config = if current_environment() == "production" {
            Self::production()
        } else {
            Self::development()
        };

        if let Some(hours) = env::var("SESSION_LIFETIME_HOURS")
            .ok()
            .and_then(|value| value.parse::<i64>().ok())
            .filter(|hours| *hours > 0)
        {
            config.lifetime = Duration::hours(hours);
        }

        config
    }

    pub fn production() -> Self {
        SessionConfig {
            secure: true,
            http_only: true,
            same_site: SameSite::Strict,
            lifetime: DEFAULT_SESSION_LIFETIME,
            name: "__Host-session".to_string(),
        }
    }

    pub fn development() -> Self {
        SessionConfig {
            secure: false,
            http_only: true,
            same_site: SameSite::Lax,
            lifetime: DEFAULT_SESSION_LIFETIME,
            name: "session".to_string(),
        }
    }

    pub fn session_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((self.name.clone(), token))
            .path("/")
            .secure(self.secure)
            .http_only(self.http_only)
            .same_site(self.same_site)
            .max_age(self.lifetime)
            .build()
    }

    /// Expires the session cookie in the browser.
    pub fn removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((self.name.clone(), ""))
            .path("/")
            .secure(self.secure)
            .http_only(self.http_only)
            .build()
    }

    pub fn csrf_cookie(&self, token: String) -> Cookie<'static> {
        Cookie::build((CSRF_COOKIE, token))
            .path("/")
            .secure(self.secure)
            .http_only(true)
            .same_site(self.same_site)
            .build()
    }

    /// Must survive the top-level navigation back from the provider, so it
    /// is never `Strict`.
    pub fn oauth_state_cookie(&self, state: String) -> Cookie<'static> {
        Cookie::build((OAUTH_STATE_COOKIE, state))
            .path("/auth")
            .secure(self.secure)
            .http_only(true)
            .same_site(SameSite::Lax)
            .max_age(Duration::minutes(10))
            .build()
    }

    pub fn oauth_state_removal_cookie(&self) -> Cookie<'static> {
        Cookie::build((OAUTH_STATE_COOKIE, "")).path("/auth").build()
    }
}

/// Refuses to start a production deployment that would send session cookies
/// over plain HTTP.
pub fn validate_production_config() -> Result<(), ConfigError> {
    if current_environment() != "production" {
        return Ok(());
    }

    if !env_flag_enabled("FORCE_HTTPS") {
        return Err(ConfigError::Invalid {
            key: "FORCE_HTTPS",
            message: "production environment requires HTTPS, set FORCE_HTTPS=true".to_string(),
        });
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_production_cookie_policy() {
        let cookie = SessionConfig::production().session_cookie("tok".to_string());
        assert_eq!(cookie.name(), "__Host-session");
        assert_eq!(cookie.secure(), Some(true));
        assert_eq!(cookie.http_only(), Some(true));
        assert_eq!(cookie.same_site(), Some(SameSite::Strict));
        assert_eq!(cookie.path(), Some("/"));
    }

    #[test]
    fn test_development_cookie_policy() {
        let cookie = SessionConfig::development().session_cookie("tok".to_string());
        assert_eq!(cookie.name(), "session");
        assert_eq!(cookie.secure(), Some(false));
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
        assert_eq!(cookie.max_age(), Some(Duration::hours(24)));
    }

    #[test]
    fn test_oauth_state_cookie_is_lax_even_in_production() {
        let cookie = SessionConfig::production().oauth_state_cookie("s".to_string());
        assert_eq!(cookie.same_site(), Some(SameSite::Lax));
    }
}
