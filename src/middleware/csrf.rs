use crate::auth::middleware::SessionContext;
use crate::auth::token::{constant_time_eq, generate_token, CSRF_TOKEN_BYTES};
use crate::config::session::{SessionConfig, CSRF_COOKIE};
use crate::AppState;
use axum::{
    body::Body,
    extract::{Request, State},
    http::{header::CONTENT_TYPE, Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use std::collections::HashSet;
use tracing::{debug, warn};

pub const CSRF_HEADER: &str = "X-CSRF-Token";
pub const CSRF_FIELD: &str = "csrf_token";

const MAX_FORM_BYTES: usize = 64 * 1024;

#[derive(Debug, thiserror::Error)]
pub enum CsrfError {
    #[error("no token was issued to this client")]
    NotIssued,
    #[error("token missing from request")]
    Missing,
    #[error("token mismatch")]
    Mismatch,
    #[error("request body could not be read")]
    UnreadableBody,
}

impl IntoResponse for CsrfError {
    fn into_response(self) -> Response {
        (
            StatusCode::FORBIDDEN,
            format!("CSRF validation failed: {}", self),
        )
            .into_response()
    }
}

/// Decides which requests need an anti-forgery token and checks it.
#[derive(Debug, Clone, Default)]
pub struct CsrfGuard {
    exempt_paths: HashSet<String>,
}

impl CsrfGuard {
    pub fn new<I, S>(exempt_paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            exempt_paths: exempt_paths.into_iter().map(Into::into).collect(),
        }
    }

    /// Exact match only. Prefixes are never exempt.
    pub fn is_exempt(&self, path: &str) -> bool {
        self.exempt_paths.contains(path)
    }

    pub fn requires_token(&self, method: &Method, path: &str) -> bool {
        !matches!(
            *method,
            Method::GET | Method::HEAD | Method::OPTIONS | Method::TRACE
        ) && !self.is_exempt(path)
    }

    pub fn verify(&self, expected: Option<&str>, provided: Option<&str>) -> Result<(), CsrfError> {
        let expected = expected.filter(|t| !t.is_empty()).ok_or(CsrfError::NotIssued)?;
        let provided = provided.filter(|t| !t.is_empty()).ok_or(CsrfError::Missing)?;

        if constant_time_eq(expected, provided) {
            Ok(())
        } else {
            Err(CsrfError::Mismatch)
        }
    }
}

/// The token a form rendered for this request must embed. Authenticated
/// requests use the session's token; anonymous ones get (or keep) a
/// `csrf_token` cookie.
pub fn form_token(
    context: &SessionContext,
    jar: CookieJar,
    config: &SessionConfig,
) -> (CookieJar, String) {
    if let Some(session) = &context.session {
        return (jar, session.csrf_token.clone());
    }

    let existing = jar
        .get(CSRF_COOKIE)
        .map(|cookie| cookie.value().to_string())
        .filter(|value| !value.is_empty());

    match existing {
        Some(token) => (jar, token),
        None => {
            let token = generate_token(CSRF_TOKEN_BYTES);
            (jar.add(config.csrf_cookie(token.clone())), token)
        }
    }
}

#[derive(Deserialize)]
struct CsrfForm {
    csrf_token: Option<String>,
}

/// Rejects state-changing requests whose token does not match before they
/// reach a handler. Must run inside `load_session`.
pub async fn csrf_validation_middleware(
    State(state): State<AppState>,
    context: SessionContext,
    jar: CookieJar,
    request: Request,
    next: Next,
) -> Response {
    let method = request.method().clone();
    let path = request.uri().path().to_string();

    if !state.csrf.requires_token(&method, &path) {
        return next.run(request).await;
    }

    debug!("Validating CSRF for {} {}", method, path);

    let expected = match &context.session {
        Some(session) => Some(session.csrf_token.clone()),
        None => jar.get(CSRF_COOKIE).map(|c| c.value().to_string()),
    };

    let header_token = request
        .headers()
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let (request, provided) = match header_token {
        Some(token) => (request, Some(token)),
        None if is_form(&request) => match read_form_token(request).await {
            Ok(pair) => pair,
            Err(e) => {
                warn!("CSRF rejected {} {}: {}", method, path, e);
                return reject(e, &state, &context, jar);
            }
        },
        None => (request, None),
    };

    if let Err(e) = state.csrf.verify(expected.as_deref(), provided.as_deref()) {
        warn!("CSRF rejected {} {}: {}", method, path, e);
        return reject(e, &state, &context, jar);
    }

    next.run(request).await
}

/// A session cookie that no longer resolves to a session is cleared on the
/// way out, so an expired login cannot wedge the browser behind 403s.
fn reject(
    error: CsrfError,
    state: &AppState,
    context: &SessionContext,
    jar: CookieJar,
) -> Response {
    if context.token.is_some() && context.session.is_none() {
        let jar = jar.remove(state.session_config.removal_cookie());
        return (jar, error).into_response();
    }
    error.into_response()
}

fn is_form(request: &Request) -> bool {
    request
        .headers()
        .get(CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(|v| v.starts_with("application/x-www-form-urlencoded"))
        .unwrap_or(false)
}

/// Buffers the form body to read the token, then puts the bytes back for
/// the handler's own `Form` extractor.
async fn read_form_token(request: Request) -> Result<(Request, Option<String>), CsrfError> {
    let (parts, body) = request.into_parts();
    let bytes = axum::body::to_bytes(body, MAX_FORM_BYTES)
        .await
        .map_err(|_| CsrfError::UnreadableBody)?;

    let token = serde_urlencoded::from_bytes::<CsrfForm>(&bytes)
        .ok()
        .and_then(|form| form.csrf_token);

    Ok((Request::from_parts(parts, Body::from(bytes)), token))
}
