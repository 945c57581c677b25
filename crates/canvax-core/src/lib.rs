//! Core config, errors, and wire protocol for Canvax.

pub mod config;
pub mod error;
pub mod protocol;
