//! # mixdb Common Library
//!
//! Shared code for the mixdb tools including:
//! - Database schema, migrations and row models
//! - Configuration loading and root folder resolution
//! - Reconciliation tolerances
//! - Common error type

pub mod config;
pub mod db;
pub mod error;

pub use config::ReconcileConfig;
pub use error::{Error, Result};
