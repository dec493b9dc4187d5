use crate::auth::middleware::SessionContext;
use crate::error::AppError;
use crate::middleware::csrf::form_token;
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{
    extract::{Form, State},
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;
use serde::Deserialize;

pub const DEFAULT_MESSAGE: &str = "Hello! Welcome to the guestbook.";
const MAX_MESSAGE_CHARS: usize = 1000;

#[derive(Template, WebTemplate)]
#[template(path = "guestbook.html")]
struct GuestbookTemplate {
    authenticated: bool,
    message: String,
    csrf_token: String,
}

#[derive(Deserialize)]
pub struct GuestbookForm {
    message: String,
}

/// GET /guestbook
pub async fn guestbook_page(
    State(state): State<AppState>,
    context: SessionContext,
    jar: CookieJar,
) -> Result<Response, AppError> {
    let message = state
        .guestbook_repository
        .get_message()
        .await?
        .unwrap_or_else(|| DEFAULT_MESSAGE.to_string());

    let (jar, csrf_token) = form_token(&context, jar, &state.session_config);
    let template = GuestbookTemplate {
        authenticated: context.is_authenticated(),
        message,
        csrf_token,
    };
    Ok((jar, template).into_response())
}

/// POST /guestbook
pub async fn update_guestbook(
    State(state): State<AppState>,
    Form(form): Form<GuestbookForm>,
) -> Result<Redirect, AppError> {
    let message = form.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation("Message must not be empty".to_string()));
    }
    if message.chars().count() > MAX_MESSAGE_CHARS {
        return Err(AppError::Validation(format!(
            "Message must be at most {} characters",
            MAX_MESSAGE_CHARS
        )));
    }

    state.guestbook_repository.upsert_message(message).await?;
    Ok(Redirect::to("/guestbook"))
}
