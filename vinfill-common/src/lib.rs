//! # vinfill Common Library
//!
//! Shared code for the vinfill enrichment service:
//! - Error and result types
//! - Bootstrap configuration (TOML, root folder resolution)
//! - SQLite pool initialization and the settings table
//! - Timestamp utilities

pub mod config;
pub mod db;
pub mod error;
pub mod time;

pub use error::{Error, Result};
