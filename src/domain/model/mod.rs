//! Records persisted in Postgres.
//!
//! Each struct maps a table row via `sqlx::FromRow`; status columns are TEXT
//! decoded into the enums declared next to the record.

pub mod forum;
pub mod license;
pub mod moderation;
pub mod order;
pub mod product;
pub mod subscription;
pub mod upload;
pub mod user;
pub mod webhook;

pub use forum::{Comment, ContentStatus, Topic};
pub use license::{License, LicenseStatus};
pub use moderation::{ModerationAction, ModerationLog, TargetType};
pub use order::{Order, OrderStatus, PaymentProvider};
pub use product::{Product, ProductStatus};
pub use subscription::{Plan, Subscription, SubscriptionStatus};
pub use upload::{Upload, UploadStatus};
pub use user::User;
pub use webhook::WebhookEvent;
