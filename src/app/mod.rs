//! Service layer: request-independent operations over the database.

pub mod analytics;
pub mod database_service;
pub mod error;
pub mod forum;
pub mod licenses;
pub mod moderation;
pub mod orders;
pub mod products;
pub mod subscriptions;
pub mod uploads;
pub mod users;
pub mod webhooks;

pub use error::{AppError, AppResult};

use crate::domain::Role;

/// The authenticated user on whose behalf an operation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Actor {
    pub id: i64,
    pub role: Role,
}

impl Actor {
    pub fn is_at_least(&self, role: Role) -> bool {
        self.role.has_at_least(role)
    }

    /// Owner of a resource, or an admin.
    pub fn owns_or_admin(&self, owner_id: i64) -> bool {
        self.id == owner_id || self.is_at_least(Role::Admin)
    }
}

/// Clamps client-provided paging values.
pub fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (limit.unwrap_or(20).clamp(1, 100), offset.unwrap_or(0).max(0))
}
