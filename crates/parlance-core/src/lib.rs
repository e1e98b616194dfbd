//! Core types, config, errors, and wire protocol for Parlance.

pub mod config;
pub mod error;
pub mod protocol;
