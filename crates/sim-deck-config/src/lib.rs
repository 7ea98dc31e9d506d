//! Configuration parsing for sim-deck
//!
//! This crate parses the KDL catalog that defines global daemon settings and
//! the per-aircraft profiles of buttons and macros.

mod error;
mod model;
mod parser;

pub use error::ConfigError;
pub use model::*;
pub use parser::{parse_config, parse_config_str};
