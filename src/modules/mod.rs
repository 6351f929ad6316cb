pub mod config;
pub mod http_api;
pub mod log_ids;
pub mod logger;
pub mod relief_db;
