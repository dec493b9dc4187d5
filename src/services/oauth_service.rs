//! Login through external identity providers.
//!
//! Supported providers form a closed set ([`Provider`]). Each one implements
//! [`IdentityProvider`]: `begin_auth` builds the authorization redirect with a
//! fresh state and PKCE verifier, `complete_auth` exchanges the returned code
//! for the provider's view of the user.
//!
//! [`OAuthService`] persists the state in `oauth_states` between the two legs
//! and consumes it atomically on the way back, so a state value is good for
//! exactly one callback within ten minutes.

use async_trait::async_trait;
use chrono::Utc;
use oauth2::basic::BasicClient;
use oauth2::{
    AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken, EndpointNotSet, EndpointSet,
    PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, Scope, TokenResponse, TokenUrl,
};
use serde::Deserialize;
use sqlx::SqlitePool;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

const STATE_TTL_SECS: i64 = 600;

const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const GOOGLE_USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v2/userinfo";

#[derive(Debug, thiserror::Error)]
pub enum OAuthError {
    #[error("Unknown provider: {0}")]
    UnknownProvider(String),
    #[error("Provider {0} is not configured")]
    NotConfigured(Provider),
    #[error("Invalid or expired OAuth state")]
    InvalidState,
    #[error("Provider did not confirm the email address")]
    UnverifiedEmail,
    #[error("OAuth configuration error: {0}")]
    Configuration(String),
    #[error("Token exchange failed: {0}")]
    Exchange(String),
    #[error("Failed to fetch user info: {0}")]
    UserInfo(String),
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    Google,
}

impl Provider {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Google => "google",
        }
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "google" => Ok(Provider::Google),
            other => Err(OAuthError::UnknownProvider(other.to_string())),
        }
    }
}

/// First leg of a login: where to send the browser, and the secrets to keep
/// until it comes back.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    pub url: String,
    pub state: String,
    pub pkce_verifier: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderIdentity {
    pub email: String,
    pub email_verified: bool,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    fn begin_auth(&self) -> AuthorizationRequest;
    async fn complete_auth(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderIdentity, OAuthError>;
}

#[derive(Debug, Clone)]
pub struct OAuthConfig {
    pub client_id: ClientId,
    pub client_secret: ClientSecret,
    pub auth_url: AuthUrl,
    pub token_url: TokenUrl,
    pub redirect_url: RedirectUrl,
    pub userinfo_url: String,
}

impl OAuthConfig {
    /// Reads `GOOGLE_CLIENT_ID` and `GOOGLE_CLIENT_SECRET`. The callback is
    /// `{base_url}/auth/google/callback`.
    pub fn google_from_env(base_url: &str) -> Result<Self, OAuthError> {
        let client_id = std::env::var("GOOGLE_CLIENT_ID")
            .map_err(|_| OAuthError::Configuration("GOOGLE_CLIENT_ID not set".to_string()))?;
        let client_secret = std::env::var("GOOGLE_CLIENT_SECRET")
            .map_err(|_| OAuthError::Configuration("GOOGLE_CLIENT_SECRET not set".to_string()))?;

        Self::google(client_id, client_secret, base_url)
    }

    pub fn google(
        client_id: impl Into<String>,
        client_secret: impl Into<String>,
        base_url: &str,
    ) -> Result<Self, OAuthError> {
        let redirect = format!(
            "{}/auth/{}/callback",
            base_url.trim_end_matches('/'),
            Provider::Google
        );

        Ok(Self {
            client_id: ClientId::new(client_id.into()),
            client_secret: ClientSecret::new(client_secret.into()),
            auth_url: AuthUrl::new(GOOGLE_AUTH_URL.to_string())
                .map_err(|e| OAuthError::Configuration(e.to_string()))?,
            token_url: TokenUrl::new(GOOGLE_TOKEN_URL.to_string())
                .map_err(|e| OAuthError::Configuration(e.to_string()))?,
            redirect_url: RedirectUrl::new(redirect)
                .map_err(|e| OAuthError::Configuration(e.to_string()))?,
            userinfo_url: GOOGLE_USERINFO_URL.to_string(),
        })
    }
}

/// OAuth client type with auth URL and token URL set.
type ConfiguredClient = oauth2::Client<
    oauth2::basic::BasicErrorResponse,
    oauth2::basic::BasicTokenResponse,
    oauth2::basic::BasicTokenIntrospectionResponse,
    oauth2::StandardRevocableToken,
    oauth2::basic::BasicRevocationErrorResponse,
    EndpointSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointNotSet,
    EndpointSet,
>;

#[derive(Debug, Deserialize)]
struct GoogleUser {
    email: String,
    #[serde(default)]
    verified_email: bool,
}

pub struct GoogleProvider {
    config: OAuthConfig,
    http_client: reqwest::Client,
}

impl GoogleProvider {
    pub fn new(config: OAuthConfig) -> Result<Self, OAuthError> {
        // Redirects stay off for the token exchange.
        let http_client = reqwest::ClientBuilder::new()
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(|e| OAuthError::Configuration(e.to_string()))?;

        Ok(Self {
            config,
            http_client,
        })
    }

    fn create_client(&self) -> ConfiguredClient {
        BasicClient::new(self.config.client_id.clone())
            .set_client_secret(self.config.client_secret.clone())
            .set_auth_uri(self.config.auth_url.clone())
            .set_token_uri(self.config.token_url.clone())
            .set_redirect_uri(self.config.redirect_url.clone())
    }
}

#[async_trait]
impl IdentityProvider for GoogleProvider {
    fn begin_auth(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let (auth_url, csrf_state) = self
            .create_client()
            .authorize_url(CsrfToken::new_random)
            .add_scope(Scope::new("openid".to_string()))
            .add_scope(Scope::new("email".to_string()))
            .set_pkce_challenge(pkce_challenge)
            .url();

        AuthorizationRequest {
            url: auth_url.to_string(),
            state: csrf_state.secret().clone(),
            pkce_verifier: pkce_verifier.secret().clone(),
        }
    }

    async fn complete_auth(
        &self,
        code: &str,
        pkce_verifier: &str,
    ) -> Result<ProviderIdentity, OAuthError> {
        let token = self
            .create_client()
            .exchange_code(AuthorizationCode::new(code.to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(pkce_verifier.to_string()))
            .request_async(&self.http_client)
            .await
            .map_err(|e| OAuthError::Exchange(e.to_string()))?;

        let google_user: GoogleUser = self
            .http_client
            .get(&self.config.userinfo_url)
            .bearer_auth(token.access_token().secret())
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| OAuthError::UserInfo(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::UserInfo(e.to_string()))?;

        Ok(ProviderIdentity {
            email: google_user.email,
            email_verified: google_user.verified_email,
        })
    }
}

pub struct OAuthService {
    pool: SqlitePool,
    google: Option<Arc<dyn IdentityProvider>>,
}

impl OAuthService {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool, google: None }
    }

    pub fn with_provider(mut self, provider: Provider, imp: Arc<dyn IdentityProvider>) -> Self {
        match provider {
            Provider::Google => self.google = Some(imp),
        }
        self
    }

    pub fn is_configured(&self, provider: Provider) -> bool {
        self.provider(provider).is_ok()
    }

    fn provider(&self, provider: Provider) -> Result<&Arc<dyn IdentityProvider>, OAuthError> {
        let imp = match provider {
            Provider::Google => self.google.as_ref(),
        };
        imp.ok_or(OAuthError::NotConfigured(provider))
    }

    /// Starts a login and remembers its state and PKCE verifier.
    pub async fn begin(&self, provider: Provider) -> Result<AuthorizationRequest, OAuthError> {
        let request = self.provider(provider)?.begin_auth();

        sqlx::query(
            r#"
            INSERT INTO oauth_states (state, provider, pkce_verifier, expires_at)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(&request.state)
        .bind(provider.as_str())
        .bind(&request.pkce_verifier)
        .bind(Utc::now().timestamp() + STATE_TTL_SECS)
        .execute(&self.pool)
        .await?;

        Ok(request)
    }

    /// Consumes `state` and asks the provider who logged in. Fails without
    /// contacting the provider when the state is unknown, expired, already
    /// used or belongs to another provider.
    pub async fn complete(
        &self,
        provider: Provider,
        code: &str,
        state: &str,
    ) -> Result<ProviderIdentity, OAuthError> {
        let imp = self.provider(provider)?;

        let pkce_verifier: Option<String> = sqlx::query_scalar(
            r#"
            DELETE FROM oauth_states
            WHERE state = ? AND provider = ? AND expires_at > ?
            RETURNING pkce_verifier
            "#,
        )
        .bind(state)
        .bind(provider.as_str())
        .bind(Utc::now().timestamp())
        .fetch_optional(&self.pool)
        .await?;

        let pkce_verifier = pkce_verifier.ok_or(OAuthError::InvalidState)?;

        let identity = imp.complete_auth(code, &pkce_verifier).await?;
        if !identity.email_verified {
            tracing::warn!(provider = %provider, "provider identity without verified email");
            return Err(OAuthError::UnverifiedEmail);
        }

        Ok(identity)
    }

    pub async fn purge_expired_states(&self) -> Result<u64, OAuthError> {
        let result = sqlx::query("DELETE FROM oauth_states WHERE expires_at <= ?")
            .bind(Utc::now().timestamp())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }
}
