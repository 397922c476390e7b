//! Dirbind Core Library
//!
//! Error and configuration types shared by the Dirbind crates.

pub mod config;
pub mod error;

pub use config::DirbindConfig;
pub use error::{Error, Result};

/// Dirbind version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// LDAP protocol version spoken by every connection
pub const LDAP_PROTOCOL_VERSION: u8 = 3;

/// Default network-level connect timeout (seconds)
pub const DEFAULT_NETWORK_TIMEOUT_SECS: u64 = 5;

/// Placeholder substituted with the escaped username in filter templates
pub const USERNAME_PLACEHOLDER: &str = "{username}";
