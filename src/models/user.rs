use serde::{Deserialize, Serialize};
use sqlx::FromRow;

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    /// SHA-256 of the outstanding verification token; `None` once verified.
    #[serde(skip_serializing)]
    pub verification_token: Option<String>,
    pub verified_at: Option<String>,
    pub created_at: Option<String>,
}

impl User {
    pub fn is_verified(&self) -> bool {
        self.verified_at.is_some()
    }
}
