//! Core types: errors, configuration, byte formatting.

pub mod bytes;
pub mod config;
pub mod errors;
