pub mod backend;
pub mod rest;

pub use backend::ClinicBackend;
pub use rest::RestClient;
