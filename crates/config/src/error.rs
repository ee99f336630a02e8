/// Crate-wide result type for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("missing required environment variable `{name}`")]
    MissingVar { name: &'static str },

    #[error("invalid value `{value}` for environment variable `{name}`")]
    InvalidVar { name: &'static str, value: String },
}

impl Error {
    #[must_use]
    pub fn invalid_var(name: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidVar {
            name,
            value: value.into(),
        }
    }
}
