use crate::auth::middleware::SessionContext;
use crate::middleware::csrf::form_token;
use crate::AppState;
use askama::Template;
use askama_web::WebTemplate;
use axum::{extract::State, response::IntoResponse};
use axum_extra::extract::cookie::CookieJar;

#[derive(Template, WebTemplate)]
#[template(path = "index.html")]
struct IndexTemplate {
    authenticated: bool,
    csrf_token: String,
}

pub async fn index_handler(
    State(state): State<AppState>,
    context: SessionContext,
    jar: CookieJar,
) -> impl IntoResponse {
    let (jar, csrf_token) = form_token(&context, jar, &state.session_config);
    (
        jar,
        IndexTemplate {
            authenticated: context.is_authenticated(),
            csrf_token,
        },
    )
}

/// Build identifier from `GITSHA`, `local` when unset.
pub async fn version_handler() -> String {
    std::env::var("GITSHA")
        .ok()
        .filter(|sha| !sha.is_empty())
        .unwrap_or_else(|| "local".to_string())
}
