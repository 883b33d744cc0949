pub mod auth;
pub mod error;
pub mod extract;
pub mod router;
pub mod types;
pub mod handlers {
    pub mod admin;
    pub mod auth;
    pub mod downloads;
    pub mod forum;
    pub mod health;
    pub mod licenses;
    pub mod moderation;
    pub mod orders;
    pub mod products;
    pub mod subscriptions;
    pub mod uploads;
    pub mod webhooks;
}

pub use error::{ApiError, ApiResult};
pub use router::{create_router, ApiDoc};
pub use types::AppState;
