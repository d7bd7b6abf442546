pub mod board;
pub mod filter;
pub mod lifecycle;
pub mod normalize;
pub mod write_back;

pub use board::AppointmentBoard;
pub use filter::filter;
pub use lifecycle::AppointmentStatusMachine;
pub use normalize::{normalize_appointment, normalize_appointments};
pub use write_back::{full_replace_body, StatusWriteBack};
