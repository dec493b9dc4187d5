use crate::auth::password::{unusable_password_hash, verify_against_dummy, verify_password, HashError};
use crate::auth::token::{generate_token, VERIFICATION_TOKEN_BYTES};
use crate::models::user::User;
use crate::repositories::user_repository::{RepositoryError, UserRepository};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum AuthServiceError {
    /// Covers unknown email, unverified account and wrong password alike.
    #[error("Invalid email or password")]
    InvalidCredentials,
    #[error("User not found")]
    UserNotFound,
    #[error(transparent)]
    Hashing(#[from] HashError),
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),
}

pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

pub struct AuthService {
    user_repository: Arc<dyn UserRepository>,
}

impl AuthService {
    pub fn new(user_repository: Arc<dyn UserRepository>) -> Self {
        Self { user_repository }
    }

    pub async fn authenticate(&self, request: LoginRequest) -> Result<User, AuthServiceError> {
        let Some(user) = self
            .user_repository
            .find_by_email(request.email.trim())
            .await?
        else {
            verify_against_dummy(&request.password);
            return Err(AuthServiceError::InvalidCredentials);
        };

        // Hash first so an unverified account costs the same as a wrong password.
        let password_ok = verify_password(&request.password, &user.password_hash);
        if !password_ok || !user.is_verified() {
            tracing::debug!(user_id = user.id, "login rejected");
            return Err(AuthServiceError::InvalidCredentials);
        }

        Ok(user)
    }

    /// Maps an email vouched for by an identity provider onto a verified
    /// local account, creating one if needed.
    ///
    /// Lookup and create are not atomic. When a concurrent callback creates
    /// the same email first, the insert fails with a conflict and the winner's
    /// row is read back once. A second miss is reported as an error.
    pub async fn resolve_oauth_identity(&self, email: &str) -> Result<User, AuthServiceError> {
        let user = match self.user_repository.find_by_email(email).await? {
            Some(user) => user,
            None => {
                let password_hash = unusable_password_hash()?;
                let token = generate_token(VERIFICATION_TOKEN_BYTES);
                match self
                    .user_repository
                    .create_user(email, &password_hash, &token)
                    .await
                {
                    Ok(user) => {
                        tracing::info!(user_id = user.id, "account created from identity provider");
                        user
                    }
                    Err(RepositoryError::Conflict) => self
                        .user_repository
                        .find_by_email(email)
                        .await?
                        .ok_or(RepositoryError::Conflict)?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        if user.is_verified() {
            return Ok(user);
        }

        self.user_repository.mark_verified(user.id).await?;
        self.get_user_by_id(user.id).await
    }

    pub async fn get_user_by_id(&self, user_id: i64) -> Result<User, AuthServiceError> {
        self.user_repository
            .find_by_id(user_id)
            .await?
            .ok_or(AuthServiceError::UserNotFound)
    }
}
