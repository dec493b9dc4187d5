// End-to-end walk through the browser flow: signup, verify, login, post,
// logout.

use axum::{
    body::Body,
    http::{header, Method, Request, Response, StatusCode},
    Router,
};
use guestbook::{
    app::build_app,
    handlers::guestbook_handlers::DEFAULT_MESSAGE,
    test_utils::test_helpers::{self, TestApp},
};
use tower::ServiceExt;

fn set_cookie_value<B>(response: &Response<B>, name: &str) -> Option<String> {
    let prefix = format!("{}=", name);
    response
        .headers()
        .get_all(header::SET_COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .find_map(|value| {
            value
                .split(';')
                .next()
                .and_then(|pair| pair.strip_prefix(prefix.as_str()))
                .map(str::to_string)
        })
}

async fn body_text(response: Response<Body>) -> String {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(bytes.to_vec()).unwrap()
}

/// Pulls the hidden `csrf_token` value out of a rendered form.
fn hidden_token(html: &str) -> String {
    let marker = r#"name="csrf_token" value=""#;
    let start = html.find(marker).expect("form carries a csrf token") + marker.len();
    let end = html[start..].find('"').unwrap() + start;
    html[start..end].to_string()
}

fn get(uri: &str, cookie: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::COOKIE, cookie)
        .body(Body::empty())
        .unwrap()
}

fn post_form(uri: &str, cookie: &str, fields: &[(&str, &str)]) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::COOKIE, cookie)
        .body(Body::from(serde_urlencoded::to_string(fields).unwrap()))
        .unwrap()
}

async fn send(router: &Router, request: Request<Body>) -> Response<Body> {
    router.clone().oneshot(request).await.unwrap()
}

#[tokio::test]
async fn test_full_account_lifecycle() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let test_app = TestApp::new(pool);
    let router = build_app(test_app.state.clone());

    // Signup page issues the anonymous token as cookie and hidden field.
    let response = send(&router, get("/signup", "")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let anon = set_cookie_value(&response, "csrf_token").unwrap();
    assert_eq!(hidden_token(&body_text(response).await), anon);
    let anon_cookie = format!("csrf_token={}", anon);

    let response = send(
        &router,
        post_form(
            "/signup",
            &anon_cookie,
            &[
                ("email", "new@x.com"),
                ("password", "secret"),
                ("csrf_token", &anon),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response)
        .await
        .contains("User created! Please check your email to verify your account."));

    // Not verified yet.
    let response = send(
        &router,
        post_form(
            "/login",
            &anon_cookie,
            &[
                ("email", "new@x.com"),
                ("password", "secret"),
                ("csrf_token", &anon),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(body_text(response).await.contains("Invalid email or password"));

    let mail = test_app.wait_for_mail(1).await;
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].to, "new@x.com");
    assert_eq!(mail[0].subject, "Verify your email");
    let link_start = mail[0].body.find("http://").unwrap();
    let link = &mail[0].body[link_start..];
    let path = link.trim_start_matches(test_helpers::TEST_BASE_URL);
    assert!(path.starts_with("/verify?token="));

    let response = send(&router, get(path, &anon_cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(body_text(response)
        .await
        .contains("Email verified successfully! You can now login."));

    // The link only works once.
    let response = send(&router, get(path, &anon_cookie)).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = send(
        &router,
        post_form(
            "/login",
            &anon_cookie,
            &[
                ("email", "new@x.com"),
                ("password", "secret"),
                ("csrf_token", &anon),
            ],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/guestbook");
    let session = set_cookie_value(&response, "session").unwrap();
    let session_cookie = format!("session={}", session);

    // Logged-in users are sent away from the guest pages.
    let response = send(&router, get("/login", &session_cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/guestbook");

    let response = send(&router, get("/guestbook", &session_cookie)).await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains(DEFAULT_MESSAGE));
    let session_csrf = hidden_token(&html);
    assert_ne!(session_csrf, anon);

    let response = send(
        &router,
        post_form(
            "/guestbook",
            &session_cookie,
            &[("message", "Signed, new"), ("csrf_token", &session_csrf)],
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let response = send(&router, get("/guestbook", &session_cookie)).await;
    assert!(body_text(response).await.contains("Signed, new"));

    let response = send(
        &router,
        post_form("/logout", &session_cookie, &[("csrf_token", &session_csrf)]),
    )
    .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/");

    let response = send(&router, get("/guestbook", &session_cookie)).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[header::LOCATION], "/login");
}

#[tokio::test]
async fn test_duplicate_signup_is_conflict() {
    let pool = test_helpers::create_test_db().await.unwrap();
    test_helpers::insert_test_user(&pool, "taken@x.com", "pw", true)
        .await
        .unwrap();
    let test_app = TestApp::new(pool);
    let router = build_app(test_app.state.clone());

    let cookie = "csrf_token=tok";
    let response = send(
        &router,
        post_form(
            "/signup",
            cookie,
            &[
                ("email", "taken@x.com"),
                ("password", "other"),
                ("csrf_token", "tok"),
            ],
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert!(body_text(response).await.contains("Email already registered"));
}

#[tokio::test]
async fn test_invalid_signup_is_bad_request() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let test_app = TestApp::new(pool.clone());
    let router = build_app(test_app.state.clone());

    let response = send(
        &router,
        post_form(
            "/signup",
            "csrf_token=tok",
            &[("email", "no-at-sign"), ("password", "pw"), ("csrf_token", "tok")],
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(test_helpers::count_rows(&pool, "users").await.unwrap(), 0);
}

#[tokio::test]
async fn test_verify_without_token_is_bad_request() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let test_app = TestApp::new(pool);
    let router = build_app(test_app.state.clone());

    let response = send(&router, get("/verify", "")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Missing token");

    let response = send(&router, get("/verify?token=bogus", "")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(body_text(response).await.contains("Invalid or expired token"));
}

#[tokio::test]
async fn test_resend_answers_the_same_for_unknown_and_pending_accounts() {
    let pool = test_helpers::create_test_db().await.unwrap();
    test_helpers::insert_test_user(&pool, "pending@x.com", "pw", false)
        .await
        .unwrap();
    let test_app = TestApp::new(pool);
    let router = build_app(test_app.state.clone());

    let mut bodies = Vec::new();
    for email in ["pending@x.com", "ghost@x.com"] {
        let response = send(
            &router,
            post_form(
                "/verify/resend",
                "csrf_token=tok",
                &[("email", email), ("csrf_token", "tok")],
            ),
        )
        .await;
        assert_eq!(response.status(), StatusCode::OK);
        bodies.push(body_text(response).await);
    }
    assert_eq!(bodies[0], bodies[1]);

    let mail = test_app.wait_for_mail(1).await;
    assert_eq!(mail.len(), 1);
    assert_eq!(mail[0].to, "pending@x.com");
}

#[tokio::test]
async fn test_security_headers_are_set() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let test_app = TestApp::new(pool);
    let router = build_app(test_app.state.clone());

    let response = send(&router, get("/", "")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()["x-frame-options"], "DENY");
    assert_eq!(response.headers()["x-content-type-options"], "nosniff");
    assert!(response.headers().contains_key("content-security-policy"));
}
