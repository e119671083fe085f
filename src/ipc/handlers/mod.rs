pub mod backup;
pub mod core;
pub mod fichas;
pub mod import;
pub mod reports;
pub mod setup;
