//! Schema module - Configuration types for NEAT populations.

mod config;

pub use config::*;
