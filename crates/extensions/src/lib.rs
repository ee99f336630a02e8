//! Extension (feature module) system.
//!
//! Each extension implements the [`Extension`] trait with declared default
//! settings and command specs. The [`ExtensionHost`] owns the load/reload
//! lifecycle and runs the settings merge on every (re)load; the
//! [`CommandRouter`] dispatches the prefix command surface with scope checks
//! and identifier validation.

pub mod error;
pub mod host;
pub mod plugin;
pub mod router;
pub mod settings;

pub use {
    error::{Error, Result},
    host::{ExtensionHost, LoadState},
    plugin::{
        CommandContext, CommandInvocation, CommandScope, CommandSpec, Extension,
        ExtensionContext, InboundMessage, LifecycleOps,
    },
    router::CommandRouter,
    settings::{ExtensionOverrides, ResolvedSettings, SettingsMap, ValueKind, resolve},
};
