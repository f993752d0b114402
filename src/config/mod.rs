//! Configuration for the ralphloop binary.
//!
//! A single YAML file, found via the search chain in [`GlobalConfig::load`].
//! Command-line flags override individual values afterwards.

mod global;

pub use self::global::GlobalConfig;

/// Alias used by the binary.
pub type Config = GlobalConfig;
