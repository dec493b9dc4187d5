use crate::auth::middleware::SessionContext;
use crate::error::AppError;
use crate::middleware::csrf::form_token;
use crate::services::{
    auth_service::{AuthServiceError, LoginRequest},
    oauth_service::Provider,
    user_service::{SignupRequest, UserServiceError},
};
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Form, Query, State},
    http::StatusCode,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

#[derive(Template, WebTemplate)]
#[template(path = "auth/signup.html")]
struct SignupTemplate {
    authenticated: bool,
    error: Option<String>,
    notice: Option<String>,
    csrf_token: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/login.html")]
struct LoginTemplate {
    authenticated: bool,
    error: Option<String>,
    google_enabled: bool,
    csrf_token: String,
}

#[derive(Template, WebTemplate)]
#[template(path = "auth/verify.html")]
struct VerifyTemplate {
    authenticated: bool,
    verified: bool,
    message: String,
    csrf_token: String,
}

#[derive(Deserialize)]
pub struct SignupForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct LoginForm {
    email: String,
    password: String,
}

#[derive(Deserialize)]
pub struct VerifyQuery {
    token: Option<String>,
}

#[derive(Deserialize)]
pub struct ResendForm {
    email: String,
}

const SIGNUP_NOTICE: &str = "User created! Please check your email to verify your account.";
const RESEND_NOTICE: &str =
    "If an unverified account exists for that address, a new verification link is on its way.";

fn signup_page_response(
    state: &AppState,
    context: &SessionContext,
    jar: CookieJar,
    status: StatusCode,
    error: Option<String>,
    notice: Option<String>,
) -> Response {
    let (jar, csrf_token) = form_token(context, jar, &state.session_config);
    let template = SignupTemplate {
        authenticated: context.is_authenticated(),
        error,
        notice,
        csrf_token,
    };
    (status, jar, template).into_response()
}

fn login_page_response(
    state: &AppState,
    context: &SessionContext,
    jar: CookieJar,
    status: StatusCode,
    error: Option<String>,
) -> Response {
    let (jar, csrf_token) = form_token(context, jar, &state.session_config);
    let template = LoginTemplate {
        authenticated: context.is_authenticated(),
        error,
        google_enabled: state.oauth_service.is_configured(Provider::Google),
        csrf_token,
    };
    (status, jar, template).into_response()
}

pub async fn signup_page(
    State(state): State<AppState>,
    context: SessionContext,
    jar: CookieJar,
) -> Response {
    signup_page_response(&state, &context, jar, StatusCode::OK, None, None)
}

pub async fn signup_handler(
    State(state): State<AppState>,
    context: SessionContext,
    jar: CookieJar,
    Form(form): Form<SignupForm>,
) -> Response {
    let request = SignupRequest {
        email: form.email,
        password: form.password,
    };

    match state.user_service.register(request).await {
        Ok(_) => signup_page_response(
            &state,
            &context,
            jar,
            StatusCode::OK,
            None,
            Some(SIGNUP_NOTICE.to_string()),
        ),
        Err(err) => {
            let status = match err {
                UserServiceError::InvalidEmail | UserServiceError::EmptyPassword => {
                    StatusCode::BAD_REQUEST
                }
                UserServiceError::EmailTaken => StatusCode::CONFLICT,
                _ => return AppError::from(err).into_response(),
            };
            signup_page_response(&state, &context, jar, status, Some(err.to_string()), None)
        }
    }
}

pub async fn login_page(
    State(state): State<AppState>,
    context: SessionContext,
    jar: CookieJar,
) -> Response {
    login_page_response(&state, &context, jar, StatusCode::OK, None)
}

pub async fn login_handler(
    State(state): State<AppState>,
    context: SessionContext,
    jar: CookieJar,
    Form(form): Form<LoginForm>,
) -> Response {
    let request = LoginRequest {
        email: form.email,
        password: form.password,
    };

    let user = match state.auth_service.authenticate(request).await {
        Ok(user) => user,
        Err(AuthServiceError::InvalidCredentials) => {
            return login_page_response(
                &state,
                &context,
                jar,
                StatusCode::UNAUTHORIZED,
                Some(AuthServiceError::InvalidCredentials.to_string()),
            );
        }
        Err(err) => return AppError::from(err).into_response(),
    };

    // Whatever token the browser arrived with is retired here.
    let issued = match state
        .session_service
        .establish(context.token.as_deref(), user.id)
        .await
    {
        Ok(issued) => issued,
        Err(err) => return AppError::from(err).into_response(),
    };

    tracing::info!(user_id = user.id, "password login");
    let jar = jar.add(state.session_config.session_cookie(issued.token));
    (jar, Redirect::to("/guestbook")).into_response()
}

pub async fn logout_handler(
    State(state): State<AppState>,
    context: SessionContext,
    jar: CookieJar,
) -> Result<Response, AppError> {
    if let Some(token) = context.token.as_deref() {
        state.session_service.destroy(token).await?;
    }

    let jar = jar.remove(state.session_config.removal_cookie());
    Ok((jar, Redirect::to("/")).into_response())
}

pub async fn verify_handler(
    State(state): State<AppState>,
    context: SessionContext,
    jar: CookieJar,
    Query(query): Query<VerifyQuery>,
) -> Response {
    let Some(token) = query.token.filter(|t| !t.is_empty()) else {
        return (StatusCode::BAD_REQUEST, "Missing token").into_response();
    };

    let (status, verified, message) = match state.user_service.verify_email(&token).await {
        Ok(_) => (
            StatusCode::OK,
            true,
            "Email verified successfully! You can now login.".to_string(),
        ),
        Err(UserServiceError::InvalidToken) => (
            StatusCode::BAD_REQUEST,
            false,
            UserServiceError::InvalidToken.to_string(),
        ),
        Err(err) => return AppError::from(err).into_response(),
    };

    let (jar, csrf_token) = form_token(&context, jar, &state.session_config);
    let template = VerifyTemplate {
        authenticated: context.is_authenticated(),
        verified,
        message,
        csrf_token,
    };
    (status, jar, template).into_response()
}

/// Same answer whether or not a mail went out.
pub async fn resend_verification_handler(
    State(state): State<AppState>,
    context: SessionContext,
    jar: CookieJar,
    Form(form): Form<ResendForm>,
) -> Response {
    if let Err(err) = state.user_service.resend_verification(&form.email).await {
        return AppError::from(err).into_response();
    }

    let (jar, csrf_token) = form_token(&context, jar, &state.session_config);
    let template = VerifyTemplate {
        authenticated: context.is_authenticated(),
        verified: false,
        message: RESEND_NOTICE.to_string(),
        csrf_token,
    };
    (jar, template).into_response()
}
