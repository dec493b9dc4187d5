use crate::auth::password::{hash_password, HashError};
use crate::auth::token::{generate_token, VERIFICATION_TOKEN_BYTES};
use crate::models::user::User;
use crate::repositories::user_repository::{RepositoryError, UserRepository};
use crate::services::mail_queue::{MailQueue, OutgoingMail};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    #[error("Invalid email address")]
    InvalidEmail,
    #[error("Password must not be empty")]
    EmptyPassword,
    #[error("Email already registered")]
    EmailTaken,
    #[error("Invalid or expired token")]
    InvalidToken,
    #[error(transparent)]
    Hashing(#[from] HashError),
    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),
}

pub struct SignupRequest {
    pub email: String,
    pub password: String,
}

/// Outcome of a signup. The raw verification token is only ever held here
/// and in the outgoing email.
#[derive(Debug)]
pub struct Registration {
    pub user: User,
    pub verification_token: String,
}

pub struct UserService {
    repository: Arc<dyn UserRepository>,
    mail_queue: MailQueue,
    base_url: String,
}

impl UserService {
    pub fn new(
        repository: Arc<dyn UserRepository>,
        mail_queue: MailQueue,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            repository,
            mail_queue,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    /// Creates an unverified account and queues its verification email.
    /// Delivery problems are reported to the mail observer only.
    pub async fn register(&self, request: SignupRequest) -> Result<Registration, UserServiceError> {
        let email = request.email.trim();
        validate_email(email)?;
        if request.password.is_empty() {
            return Err(UserServiceError::EmptyPassword);
        }

        let password_hash = hash_password(&request.password)?;
        let verification_token = generate_token(VERIFICATION_TOKEN_BYTES);

        let user = match self
            .repository
            .create_user(email, &password_hash, &verification_token)
            .await
        {
            Ok(user) => user,
            Err(RepositoryError::Conflict) => return Err(UserServiceError::EmailTaken),
            Err(e) => return Err(e.into()),
        };

        tracing::info!(user_id = user.id, "account created, verification pending");
        self.send_verification(&user.email, &verification_token);

        Ok(Registration {
            user,
            verification_token,
        })
    }

    /// Consumes a verification token. Unknown, consumed and never-issued
    /// tokens all fail the same way.
    pub async fn verify_email(&self, token: &str) -> Result<i64, UserServiceError> {
        match self.repository.verify_user(token).await {
            Ok(user_id) => {
                tracing::info!(user_id, "email verified");
                Ok(user_id)
            }
            Err(RepositoryError::NotFound) => Err(UserServiceError::InvalidToken),
            Err(e) => Err(e.into()),
        }
    }

    /// Issues a fresh verification token to an unverified account. Returns
    /// the new token when one was sent; unknown or verified emails yield
    /// `None` so callers can respond identically in every case.
    pub async fn resend_verification(&self, email: &str) -> Result<Option<String>, UserServiceError> {
        let Some(user) = self.repository.find_by_email(email.trim()).await? else {
            return Ok(None);
        };
        if user.is_verified() {
            return Ok(None);
        }

        let token = generate_token(VERIFICATION_TOKEN_BYTES);
        match self
            .repository
            .replace_verification_token(user.id, &token)
            .await
        {
            Ok(()) => {}
            // Verified between the lookup and the update.
            Err(RepositoryError::NotFound) => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        self.send_verification(&user.email, &token);
        Ok(Some(token))
    }

    /// Operator override: verifies without a token.
    pub async fn mark_verified(&self, id: i64) -> Result<(), UserServiceError> {
        Ok(self.repository.mark_verified(id).await?)
    }

    pub async fn find_user_by_email(&self, email: &str) -> Result<Option<User>, UserServiceError> {
        Ok(self.repository.find_by_email(email).await?)
    }

    pub async fn find_user_by_id(&self, id: i64) -> Result<Option<User>, UserServiceError> {
        Ok(self.repository.find_by_id(id).await?)
    }

    pub async fn list_users(
        &self,
        limit: Option<i64>,
        offset: Option<i64>,
    ) -> Result<Vec<User>, UserServiceError> {
        Ok(self.repository.list_users(limit, offset).await?)
    }

    pub async fn delete_user(&self, id: i64) -> Result<(), UserServiceError> {
        Ok(self.repository.delete_user(id).await?)
    }

    pub fn verification_link(&self, token: &str) -> String {
        format!("{}/verify?token={}", self.base_url, token)
    }

    fn send_verification(&self, email: &str, token: &str) {
        let link = self.verification_link(token);
        self.mail_queue.submit(OutgoingMail::new(
            email,
            "Verify your email",
            format!("Please verify your email by clicking here: {}", link),
        ));
    }
}

fn validate_email(email: &str) -> Result<(), UserServiceError> {
    if email.is_empty() || email.len() > 255 || !email.contains('@') {
        return Err(UserServiceError::InvalidEmail);
    }
    Ok(())
}
