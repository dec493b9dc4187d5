use guestbook::{
    repositories::user_repository::SqliteUserRepository,
    services::{
        auth_service::{AuthService, AuthServiceError, LoginRequest},
        email_service::RecordingMailer,
        mail_queue::{MailQueue, TracingDeliveryObserver},
        session_service::SessionService,
        user_service::{SignupRequest, UserService, UserServiceError},
    },
    test_utils::test_helpers,
};
use std::sync::Arc;

fn login(email: &str, password: &str) -> LoginRequest {
    LoginRequest {
        email: email.to_string(),
        password: password.to_string(),
    }
}

#[tokio::test]
async fn test_authenticate_success() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let user_id = test_helpers::insert_test_user(&pool, "auth@example.com", "correctpassword", true)
        .await
        .unwrap();
    let auth_service = AuthService::new(Arc::new(SqliteUserRepository::new(pool)));

    let user = auth_service
        .authenticate(login("auth@example.com", "correctpassword"))
        .await
        .unwrap();
    assert_eq!(user.id, user_id);
    assert_eq!(user.email, "auth@example.com");
}

#[tokio::test]
async fn test_authenticate_trims_email() {
    let pool = test_helpers::create_test_db().await.unwrap();
    test_helpers::insert_test_user(&pool, "auth@example.com", "pw", true)
        .await
        .unwrap();
    let auth_service = AuthService::new(Arc::new(SqliteUserRepository::new(pool)));

    assert!(auth_service
        .authenticate(login("  auth@example.com ", "pw"))
        .await
        .is_ok());
}

#[tokio::test]
async fn test_authenticate_wrong_password() {
    let pool = test_helpers::create_test_db().await.unwrap();
    test_helpers::insert_test_user(&pool, "wrongpass@example.com", "correctpassword", true)
        .await
        .unwrap();
    let auth_service = AuthService::new(Arc::new(SqliteUserRepository::new(pool)));

    let result = auth_service
        .authenticate(login("wrongpass@example.com", "wrongpassword"))
        .await;
    assert!(matches!(result, Err(AuthServiceError::InvalidCredentials)));
}

#[tokio::test]
async fn test_authenticate_nonexistent_user() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let auth_service = AuthService::new(Arc::new(SqliteUserRepository::new(pool)));

    let result = auth_service
        .authenticate(login("nobody@example.com", "anything"))
        .await;
    assert!(matches!(result, Err(AuthServiceError::InvalidCredentials)));
}

#[tokio::test]
async fn test_unverified_user_gets_same_error_as_wrong_password() {
    let pool = test_helpers::create_test_db().await.unwrap();
    test_helpers::insert_test_user(&pool, "pending@example.com", "pw", false)
        .await
        .unwrap();
    let auth_service = AuthService::new(Arc::new(SqliteUserRepository::new(pool)));

    let unverified = auth_service
        .authenticate(login("pending@example.com", "pw"))
        .await
        .unwrap_err();
    let wrong = auth_service
        .authenticate(login("pending@example.com", "nope"))
        .await
        .unwrap_err();

    assert_eq!(unverified.to_string(), wrong.to_string());
    assert_eq!(unverified.to_string(), "Invalid email or password");
}

#[tokio::test]
async fn test_duplicate_signup_keeps_original_password() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let repository = Arc::new(SqliteUserRepository::new(pool.clone()));
    let mailer = RecordingMailer::new();
    let (queue, workers) =
        MailQueue::spawn(Arc::new(mailer.clone()), Arc::new(TracingDeliveryObserver), 8, 1);
    let user_service = UserService::new(repository.clone(), queue, test_helpers::TEST_BASE_URL);
    let auth_service = AuthService::new(repository);

    let first = user_service
        .register(SignupRequest {
            email: "a@x.com".to_string(),
            password: "pw1".to_string(),
        })
        .await
        .unwrap();
    let second = user_service
        .register(SignupRequest {
            email: "a@x.com".to_string(),
            password: "pw2".to_string(),
        })
        .await;
    assert!(matches!(second, Err(UserServiceError::EmailTaken)));

    user_service
        .verify_email(&first.verification_token)
        .await
        .unwrap();

    assert!(auth_service.authenticate(login("a@x.com", "pw1")).await.is_ok());
    assert!(auth_service.authenticate(login("a@x.com", "pw2")).await.is_err());

    drop(user_service);
    workers.join().await;
    assert_eq!(mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_login_requires_verification_then_issues_session() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let repository = Arc::new(SqliteUserRepository::new(pool.clone()));
    let mailer = RecordingMailer::new();
    let (queue, workers) =
        MailQueue::spawn(Arc::new(mailer.clone()), Arc::new(TracingDeliveryObserver), 8, 1);
    let user_service = UserService::new(repository.clone(), queue, test_helpers::TEST_BASE_URL);
    let auth_service = AuthService::new(repository);
    let sessions = SessionService::new(pool);

    let registration = user_service
        .register(SignupRequest {
            email: "new@x.com".to_string(),
            password: "secret".to_string(),
        })
        .await
        .unwrap();

    assert!(matches!(
        auth_service.authenticate(login("new@x.com", "secret")).await,
        Err(AuthServiceError::InvalidCredentials)
    ));

    let verified_id = user_service
        .verify_email(&registration.verification_token)
        .await
        .unwrap();
    assert_eq!(verified_id, registration.user.id);

    let user = auth_service
        .authenticate(login("new@x.com", "secret"))
        .await
        .unwrap();
    let issued = sessions.establish(None, user.id).await.unwrap();
    let active = sessions.validate(&issued.token).await.unwrap().unwrap();
    assert_eq!(active.user_id, user.id);

    drop(user_service);
    workers.join().await;
    let sent = mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0]
        .body
        .contains(&format!("/verify?token={}", registration.verification_token)));
}

#[tokio::test]
async fn test_oauth_identity_creates_verified_account() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let auth_service = AuthService::new(Arc::new(SqliteUserRepository::new(pool.clone())));

    let user = auth_service
        .resolve_oauth_identity("g@x.com")
        .await
        .unwrap();
    assert!(user.is_verified());

    // The generated password can never be used to log in.
    assert!(auth_service.authenticate(login("g@x.com", "")).await.is_err());

    let again = auth_service
        .resolve_oauth_identity("g@x.com")
        .await
        .unwrap();
    assert_eq!(again.id, user.id);
    assert_eq!(test_helpers::count_rows(&pool, "users").await.unwrap(), 1);
}

#[tokio::test]
async fn test_get_user_by_id() {
    let pool = test_helpers::create_test_db().await.unwrap();
    let id = test_helpers::insert_test_user(&pool, "id@x.com", "pw", true)
        .await
        .unwrap();
    let auth_service = AuthService::new(Arc::new(SqliteUserRepository::new(pool)));

    assert_eq!(auth_service.get_user_by_id(id).await.unwrap().email, "id@x.com");
    assert!(matches!(
        auth_service.get_user_by_id(id + 100).await,
        Err(AuthServiceError::UserNotFound)
    ));
}
