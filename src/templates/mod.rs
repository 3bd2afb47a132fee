pub mod combine;
pub mod csv;
pub mod export;
pub mod loader;
pub mod types;
pub mod validation;
