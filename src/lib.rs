//! Bookkeeping document ingestion and export archival.

pub mod config;
pub mod context;
pub mod domains;
pub mod errors;
pub mod types;
pub mod utils;

mod db_migration;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use context::AppContext;
pub use db_migration::run_migrations;
