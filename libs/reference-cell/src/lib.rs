// =====================================================================================
// REFERENCE CELL - RECORD NORMALIZATION & LAZY REFERENCE RESOLUTION
// =====================================================================================

pub mod error;
pub mod models;
pub mod services;

pub use error::ReferenceError;
pub use models::*;
pub use services::*;
