pub mod error;
pub mod session;

pub use error::AppError;
pub use session::{Role, Session};
