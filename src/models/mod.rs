pub mod auth_response;
pub mod notification;
pub mod user;

pub use auth_response::AuthResponse;
pub use notification::ChangeNotification;
pub use user::User;
