pub mod guestbook_repository;
pub mod user_repository;

pub use guestbook_repository::{GuestbookRepository, SqliteGuestbookRepository};
pub use user_repository::{RepositoryError, SqliteUserRepository, UserRepository};
