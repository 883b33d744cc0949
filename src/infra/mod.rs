pub mod config;
pub mod logging;
pub mod moderation;
pub mod payments;
pub mod storage;

pub use config::Config;
