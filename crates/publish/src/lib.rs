//! Publish extension.
//!
//! Relays messages from each guild's configured publishing channel to the
//! external endpoint, attaching the source key resolved for the author
//! (user override over guild default). Also serves the key- and
//! channel-management command surface.

pub mod extension;
pub mod sink;

pub use {
    extension::PublishExtension,
    sink::{HttpSink, PublishSink},
};
