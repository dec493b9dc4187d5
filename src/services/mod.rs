pub mod auth_service;
pub mod email_service;
pub mod mail_queue;
pub mod oauth_service;
pub mod session_service;
pub mod user_service;
