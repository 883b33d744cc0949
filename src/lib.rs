pub mod app;
pub mod crypto;
pub mod domain;
pub mod infra;
pub mod transport;
pub mod workers;

// Convenience re-exports (keeps call-sites clean)
pub use app::database_service::DatabaseService;
pub use app::{Actor, AppError, AppResult};
pub use domain::Role;
pub use infra::Config;
pub use transport::http::{create_router, ApiDoc, AppState};
