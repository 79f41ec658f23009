//! Database pool initialization and shared tables

pub mod init;

pub use init::*;
