//! Typed operator configuration.

use std::env;

use {
    bloom_extensions::{ExtensionOverrides, SettingsMap},
    chrono_tz::Tz,
    secrecy::Secret,
    serde_json::Value,
    tracing::info,
};

use crate::error::{Error, Result};

/// Version string reported by the utils extension.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

const DEFAULT_TIMEZONE: &str = "America/New_York";
const DEFAULT_PREFIX: &str = "=";
const DEFAULT_DATABASE_PATH: &str = "bloom.db";

/// Everything the operator controls about a run.
#[derive(Clone)]
pub struct BotConfig {
    /// Chat-platform bot token.
    pub token: Secret<String>,
    /// Operator identity; lifecycle commands are restricted to this user.
    pub owner_id: Option<u64>,
    /// Staging guild announced at startup; the command surface is global,
    /// the id is kept for operational parity with deployments that scope
    /// testing there.
    pub testing_guild_id: Option<u64>,
    /// Development mode; enables the development extension by default.
    pub dev: bool,
    /// Process timezone for load timestamps and uptime reporting.
    pub timezone: Tz,
    /// Command prefixes, e.g. `=`.
    pub prefixes: Vec<String>,
    /// sqlx connection string for the key-resolution store.
    pub database_url: String,
    /// Extensions to register and load, in load order.
    pub enabled_extensions: Vec<String>,
    /// Per-extension setting overrides merged over extension defaults.
    pub extension_settings: ExtensionOverrides,
}

impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("token", &"[REDACTED]")
            .field("owner_id", &self.owner_id)
            .field("dev", &self.dev)
            .field("timezone", &self.timezone)
            .field("database_url", &self.database_url)
            .field("enabled_extensions", &self.enabled_extensions)
            .finish_non_exhaustive()
    }
}

impl BotConfig {
    /// Read configuration from the process environment. A `.env` file in the
    /// working directory is loaded first when present.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let token = env::var("BOT_TOKEN").map_err(|_| Error::MissingVar { name: "BOT_TOKEN" })?;
        let owner_id = opt_id_var("DISCORD_OWNER_ID")?;
        let testing_guild_id = opt_id_var("TESTING_GUILD_ID")?;
        let dev = match env::var("DEV") {
            Ok(raw) => parse_bool("DEV", &raw)?,
            Err(_) => true,
        };
        if dev {
            info!("running in development mode");
        }

        let timezone = env::var("TIMEZONE").unwrap_or_else(|_| DEFAULT_TIMEZONE.into());
        let timezone: Tz = timezone
            .parse()
            .map_err(|_| Error::invalid_var("TIMEZONE", timezone.clone()))?;

        let prefixes = match env::var("BOT_PREFIXES") {
            Ok(raw) => parse_list(&raw),
            Err(_) => vec![DEFAULT_PREFIX.to_string()],
        };

        let database_url = env::var("DATABASE_URL").unwrap_or_else(|_| {
            let path = env::var("DATABASE_PATH").unwrap_or_else(|_| DEFAULT_DATABASE_PATH.into());
            format!("sqlite://{path}?mode=rwc")
        });

        let enabled_extensions = match env::var("ENABLED_EXTENSIONS") {
            Ok(raw) => parse_list(&raw),
            Err(_) => default_extensions(dev),
        };

        let extension_settings = publish_overrides(
            env::var("PUBLISH_URL").ok(),
            env::var("PUBLISH_API_KEY").ok(),
        );

        Ok(Self {
            token: Secret::new(token),
            owner_id,
            testing_guild_id,
            dev,
            timezone,
            prefixes,
            database_url,
            enabled_extensions,
            extension_settings,
        })
    }
}

/// Extensions loaded when the operator names none.
fn default_extensions(dev: bool) -> Vec<String> {
    let mut extensions = vec!["utils".to_string(), "publish".to_string()];
    if dev {
        extensions.push("development".to_string());
    }
    extensions
}

/// Operator overrides for the publish extension. Only variables the operator
/// actually set end up in the map; everything else falls back to the
/// extension's declared defaults at merge time.
fn publish_overrides(url: Option<String>, api_key: Option<String>) -> ExtensionOverrides {
    let mut publish = SettingsMap::new();
    if let Some(url) = url {
        publish.insert("publish_url".into(), Value::String(url));
    }
    if let Some(api_key) = api_key {
        publish.insert("publish_api_key".into(), Value::String(api_key));
    }

    let mut overrides = ExtensionOverrides::new();
    if !publish.is_empty() {
        overrides.insert("publish".into(), publish);
    }
    overrides
}

fn parse_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(name: &'static str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(Error::invalid_var(name, raw)),
    }
}

fn parse_id(name: &'static str, raw: &str) -> Result<u64> {
    raw.trim()
        .parse::<u64>()
        .map_err(|_| Error::invalid_var(name, raw))
}

fn opt_id_var(name: &'static str) -> Result<Option<u64>> {
    match env::var(name) {
        Ok(raw) => parse_id(name, &raw).map(Some),
        Err(_) => Ok(None),
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn list_parsing_trims_and_drops_empties() {
        assert_eq!(parse_list("utils, publish ,"), vec!["utils", "publish"]);
        assert!(parse_list("").is_empty());
    }

    #[test]
    fn bool_parsing_accepts_common_spellings() {
        assert!(parse_bool("DEV", "True").unwrap());
        assert!(!parse_bool("DEV", "0").unwrap());
        assert!(parse_bool("DEV", "maybe").is_err());
    }

    #[test]
    fn id_parsing_rejects_non_integers() {
        assert_eq!(parse_id("DISCORD_OWNER_ID", "42").unwrap(), 42);
        assert!(matches!(
            parse_id("DISCORD_OWNER_ID", "abc"),
            Err(Error::InvalidVar { name: "DISCORD_OWNER_ID", .. })
        ));
    }

    #[test]
    fn development_extension_follows_dev_mode() {
        assert_eq!(default_extensions(false), vec!["utils", "publish"]);
        assert_eq!(
            default_extensions(true),
            vec!["utils", "publish", "development"]
        );
    }

    #[test]
    fn publish_overrides_only_contain_set_variables() {
        assert!(publish_overrides(None, None).is_empty());

        let overrides = publish_overrides(Some("https://x".into()), None);
        let publish = overrides.get("publish").unwrap();
        assert_eq!(publish.get("publish_url").unwrap(), "https://x");
        assert!(!publish.contains_key("publish_api_key"));

        let overrides = publish_overrides(None, Some("secret".into()));
        let publish = overrides.get("publish").unwrap();
        assert!(!publish.contains_key("publish_url"));
        assert_eq!(publish.get("publish_api_key").unwrap(), "secret");
    }
}
