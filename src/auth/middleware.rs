use crate::models::session::ActiveSession;
use crate::AppState;
use axum::{
    extract::{FromRequestParts, Request, State},
    http::request::Parts,
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use std::convert::Infallible;

/// Who is making the request. Inserted by [`load_session`] for every
/// request; handlers extract it directly.
#[derive(Debug, Clone, Default)]
pub struct SessionContext {
    /// Raw token from the cookie, valid or not. Kept so login can retire it.
    pub token: Option<String>,
    pub session: Option<ActiveSession>,
}

impl SessionContext {
    pub fn user_id(&self) -> Option<i64> {
        self.session.as_ref().map(|s| s.user_id)
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_some()
    }
}

impl<S> FromRequestParts<S> for SessionContext
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(parts
            .extensions
            .get::<SessionContext>()
            .cloned()
            .unwrap_or_default())
    }
}

/// Validates the session cookie once per request. A missing, unknown or
/// expired token yields an anonymous context, never an error.
pub async fn load_session(
    State(state): State<AppState>,
    jar: CookieJar,
    mut request: Request,
    next: Next,
) -> Response {
    let token = jar
        .get(&state.session_config.name)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());

    let session = match &token {
        Some(token) => match state.session_service.validate(token).await {
            Ok(session) => session,
            Err(e) => {
                tracing::error!("Failed to validate session: {}", e);
                None
            }
        },
        None => None,
    };

    request
        .extensions_mut()
        .insert(SessionContext { token, session });
    next.run(request).await
}

pub async fn require_auth(context: SessionContext, request: Request, next: Next) -> Response {
    if context.is_authenticated() {
        next.run(request).await
    } else {
        Redirect::to("/login").into_response()
    }
}

pub async fn redirect_if_authenticated(
    context: SessionContext,
    request: Request,
    next: Next,
) -> Response {
    if context.is_authenticated() {
        Redirect::to("/guestbook").into_response()
    } else {
        next.run(request).await
    }
}
