//! Common utilities and shared functionality
//!
//! Identifiers, money helpers, the clock seam and the configuration loader.

pub mod config;
pub mod traits;
pub mod types;
