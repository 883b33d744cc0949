//! Periodic background tasks started by the server binary.
//!
//! Each worker ticks on a fixed interval and exits when `shutdown()` is called.

pub mod moderation_queue;
pub mod quarantine_cleanup;

pub use moderation_queue::ModerationQueueWorker;
pub use quarantine_cleanup::QuarantineCleanupWorker;
