// Music streaming settings service
// Per-guild config storage, feature flags, change broadcast and audit log

pub mod api;
pub mod error;
pub mod features;
pub mod models;
pub mod store;
pub mod utils;

pub use error::{ConfigError, Result};
