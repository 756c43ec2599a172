//! Core functionality: error types, configuration, and failure routing.

pub mod config;
pub mod error;
pub mod error_pages;
