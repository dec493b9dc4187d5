use crate::{auth, handlers, middleware as app_middleware, AppState};
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower_http::trace::TraceLayer;

/// Builds the full router. Layers run outermost first: tracing, security
/// headers, session loading, then CSRF validation.
pub fn build_app(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/guestbook",
            get(handlers::guestbook_page).post(handlers::update_guestbook),
        )
        .route_layer(middleware::from_fn(auth::middleware::require_auth));

    let guest_routes = Router::new()
        .route(
            "/signup",
            get(auth::handlers::signup_page).post(auth::handlers::signup_handler),
        )
        .route(
            "/login",
            get(auth::handlers::login_page).post(auth::handlers::login_handler),
        )
        .route_layer(middleware::from_fn(
            auth::middleware::redirect_if_authenticated,
        ));

    Router::new()
        .route("/", get(handlers::index_handler))
        .route("/version", get(handlers::version_handler))
        .route("/logout", post(auth::handlers::logout_handler))
        .route("/verify", get(auth::handlers::verify_handler))
        .route(
            "/verify/resend",
            post(auth::handlers::resend_verification_handler),
        )
        .route("/auth/{provider}", get(handlers::begin_auth_handler))
        .route(
            "/auth/{provider}/callback",
            get(handlers::callback_handler),
        )
        .merge(guest_routes)
        .merge(protected_routes)
        .layer(middleware::from_fn_with_state(
            state.clone(),
            app_middleware::csrf_validation_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::middleware::load_session,
        ))
        .layer(middleware::from_fn(app_middleware::add_security_headers))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
