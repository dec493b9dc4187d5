pub mod session;
pub mod user;

pub use session::{ActiveSession, IssuedSession};
pub use user::User;
