//! # LarvaCare Core
//! Shared configuration and error types used across the LarvaCare crates.

pub mod config;
pub mod error;

pub use config::LarvaCareConfig;
pub use error::{CareError, Result};
