use std::error::Error as StdError;

use crate::settings::ValueKind;

/// Crate-wide result type for extension operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Typed errors shared across the extension system.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// An operator override does not match the declared default's type.
    /// Fatal to that extension's load, never to the process.
    #[error(
        "invalid setting `{key}` for extension `{extension}`: \
         {value} was passed, expected {expected}"
    )]
    ConfigurationType {
        extension: String,
        key: String,
        value: serde_json::Value,
        expected: ValueKind,
    },

    /// A declared setting is absent or has an unusable value.
    #[error("missing setting `{key}` for extension `{extension}`")]
    MissingSetting { extension: String, key: String },

    /// A user-supplied identifier is not a valid integer id.
    #[error("invalid identifier: `{input}`")]
    InvalidIdentifier { input: String },

    /// The caller is not allowed to run the command.
    #[error("permission denied")]
    PermissionDenied,

    /// A requested extension id is not registered.
    #[error("unknown extension: {id}")]
    UnknownExtension { id: String },

    /// Command arguments don't match the command's surface. The message is
    /// shown to the invoking user verbatim.
    #[error("{message}")]
    Usage { message: String },

    /// Wrapped source error from a collaborator (store, sink, gateway).
    #[error("{context}: {source}")]
    External {
        context: String,
        #[source]
        source: Box<dyn StdError + Send + Sync>,
    },
}

impl Error {
    #[must_use]
    pub fn invalid_identifier(input: impl std::fmt::Display) -> Self {
        Self::InvalidIdentifier {
            input: input.to_string(),
        }
    }

    #[must_use]
    pub fn unknown_extension(id: impl std::fmt::Display) -> Self {
        Self::UnknownExtension { id: id.to_string() }
    }

    #[must_use]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn missing_setting(extension: impl Into<String>, key: impl Into<String>) -> Self {
        Self::MissingSetting {
            extension: extension.into(),
            key: key.into(),
        }
    }

    #[must_use]
    pub fn external(
        context: impl Into<String>,
        source: impl StdError + Send + Sync + 'static,
    ) -> Self {
        Self::External {
            context: context.into(),
            source: Box::new(source),
        }
    }

    /// Whether this error should be shown to the invoking user as-is.
    ///
    /// Everything else is logged with context and answered with a generic
    /// failure message.
    #[must_use]
    pub fn is_user_facing(&self) -> bool {
        matches!(
            self,
            Self::InvalidIdentifier { .. }
                | Self::PermissionDenied
                | Self::UnknownExtension { .. }
                | Self::Usage { .. }
        )
    }
}
