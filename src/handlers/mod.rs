pub mod guestbook_handlers;
pub mod home_handlers;
pub mod oauth_handlers;

pub use guestbook_handlers::{guestbook_page, update_guestbook};
pub use home_handlers::{index_handler, version_handler};
pub use oauth_handlers::{begin_auth_handler, callback_handler};
