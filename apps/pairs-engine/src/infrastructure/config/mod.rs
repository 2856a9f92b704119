//! Configuration Module
//!
//! Configuration loading for the pairs engine.

mod settings;

pub use settings::{ConfigError, EngineConfig, FeedSettings, ServerSettings};
