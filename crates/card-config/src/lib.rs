//! YAML card configuration loading
//!
//! Loads a card configuration from YAML with support for two custom tags:
//!
//! - `!include path` - Include another YAML file
//! - `!env_var NAME [default]` - Environment variable substitution
//!
//! The result is a `serde_json::Value` tree ready for the card engine.
//!
//! # Example
//!
//! ```ignore
//! use card_config::load_card_config;
//!
//! let config = load_card_config("/config/cards/front-door.yaml")?;
//! ```

mod error;
mod loader;

pub use error::{ConfigError, ConfigResult};
pub use loader::{load_card_config, load_card_config_str, CardConfigLoader};
