pub mod assembly;
pub mod enhance;
