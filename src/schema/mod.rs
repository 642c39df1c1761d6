//! Schema module - Configuration and universe layout for pixel shows.

mod config;
mod topology;

pub use config::*;
pub use topology::*;
