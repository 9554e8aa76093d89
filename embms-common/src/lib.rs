//! Common types and infrastructure shared by the embms crates.
//!
//! This crate provides the pieces every other crate needs: the shared
//! error type, PLMN identity handling, YAML configuration structures for
//! the MCE node, and the tracing-based logging bootstrap.

pub mod config;
pub mod error;
pub mod logging;
pub mod types;

pub use config::{load_mce_config, MceConfig};
pub use error::Error;
pub use types::Plmn;
