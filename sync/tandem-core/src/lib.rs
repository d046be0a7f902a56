//!
//! tandem-core - Shared Foundations
//!
//! Types shared by every tandem crate:
//!
//! - `SyncError` for recoverable failures, with errno-style codes
//! - `fatal` for conditions that must terminate the process
//! - `Config` with TOML and environment loaders
//!

pub mod config;
pub mod errors;
pub mod fatal;

pub use config::*;
pub use errors::*;
pub use fatal::fatal;
