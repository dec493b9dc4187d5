use chrono::{DateTime, Utc};

/// A validated, unexpired session as seen by request handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSession {
    pub user_id: i64,
    pub csrf_token: String,
    pub expires_at: i64,
}

/// A freshly issued session. `token` is the only copy of the raw secret; the
/// store keeps its hash.
#[derive(Debug, Clone)]
pub struct IssuedSession {
    pub token: String,
    pub csrf_token: String,
    pub user_id: i64,
    pub expires_at: i64,
}

impl IssuedSession {
    pub fn expires_at_utc(&self) -> Option<DateTime<Utc>> {
        DateTime::from_timestamp(self.expires_at, 0)
    }
}

impl From<&IssuedSession> for ActiveSession {
    fn from(issued: &IssuedSession) -> Self {
        Self {
            user_id: issued.user_id,
            csrf_token: issued.csrf_token.clone(),
            expires_at: issued.expires_at,
        }
    }
}
