//! Configuration module for Sumi-Harvest
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use sumi_harvest::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("harvest.toml")).unwrap();
//! println!("Concurrency ceiling: {}", config.engine.concurrency);
//! ```

mod parser;
mod types;
mod validation;

pub use types::{
    BrowserConfig, Config, EngineConfig, OutputConfig, ProxyConfig, QueueConfig, UserAgentConfig,
};

pub use parser::{config_hash, load_config, load_config_with_hash, parse_config};
pub use validation::validate;
