//! Operator configuration, read once from the environment at startup.
//!
//! A `.env` file is honored via dotenvy. The per-extension override map is
//! assembled here and stays immutable for the run; extension reloads re-read
//! the same map.

pub mod error;
pub mod settings;

pub use {
    error::{Error, Result},
    settings::{BotConfig, VERSION},
};
