// src/utils/mod.rs
//! Common utilities shared across the shim

pub mod config;
pub mod errors;

pub use config::ShimConfig;
pub use errors::{Result, ShimError};
