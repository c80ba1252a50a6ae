// Database module for Cicero
// Provides SQLite persistence for user settings

pub mod manager;
pub mod migrations;
pub mod settings_repo;

pub use manager::DatabaseManager;
