pub mod csrf;
pub mod security_headers;

pub use csrf::{csrf_validation_middleware, form_token, CsrfError, CsrfGuard, CSRF_FIELD, CSRF_HEADER};
pub use security_headers::add_security_headers;
