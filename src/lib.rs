//! relief_hub: disaster-relief help requests whose contact details are
//! disclosed only to the requester and the volunteers committed to them.

pub mod errors;
pub mod middleware;
pub mod modules;
pub mod privacy;

pub use errors::{AppError, AppResult};
pub use modules::config::AppConfig;
pub use modules::http_api::{build_router, start_server, AppState};
pub use modules::relief_db::ReliefDb;
