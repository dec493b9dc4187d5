use crate::auth::middleware::SessionContext;
use crate::auth::token::constant_time_eq;
use crate::config::session::OAUTH_STATE_COOKIE;
use crate::error::AppError;
use crate::services::oauth_service::Provider;
use crate::AppState;
use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;
use tracing::warn;

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    code: Option<String>,
    state: Option<String>,
    error: Option<String>,
}

/// GET /auth/{provider} - Redirect to the provider's consent page
pub async fn begin_auth_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let provider: Provider = provider.parse()?;
    let request = state.oauth_service.begin(provider).await?;

    let jar = jar.add(state.session_config.oauth_state_cookie(request.state));
    Ok((jar, Redirect::to(&request.url)).into_response())
}

/// GET /auth/{provider}/callback - Finish login and issue a session
pub async fn callback_handler(
    State(state): State<AppState>,
    Path(provider): Path<String>,
    context: SessionContext,
    jar: CookieJar,
    Query(query): Query<CallbackQuery>,
) -> Result<Response, AppError> {
    let provider: Provider = provider.parse()?;

    if let Some(error) = query.error {
        warn!(provider = %provider, "provider returned error: {}", error);
        return Err(AppError::OAuthFailed);
    }
    let (Some(code), Some(returned_state)) = (query.code, query.state) else {
        return Err(AppError::OAuthFailed);
    };

    // The state must come back to the browser that started the flow.
    let cookie_state = jar.get(OAUTH_STATE_COOKIE).map(|c| c.value().to_string());
    let jar = jar.remove(state.session_config.oauth_state_removal_cookie());
    if !cookie_state
        .as_deref()
        .is_some_and(|expected| constant_time_eq(expected, &returned_state))
    {
        warn!(provider = %provider, "OAuth state cookie missing or mismatched");
        return Err(AppError::OAuthFailed);
    }

    let identity = state
        .oauth_service
        .complete(provider, &code, &returned_state)
        .await?;
    let user = state
        .auth_service
        .resolve_oauth_identity(&identity.email)
        .await?;
    let issued = state
        .session_service
        .establish(context.token.as_deref(), user.id)
        .await?;

    tracing::info!(user_id = user.id, provider = %provider, "provider login");
    let jar = jar.add(state.session_config.session_cookie(issued.token));
    Ok((jar, Redirect::to("/guestbook")).into_response())
}
