//! Application configuration for zivi.
//!
//! User config lives at `~/.zivi/zivi.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Result, ZiviError};
use crate::types::{Language, Locale, OutputFormat};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "zivi.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".zivi";

// ---------------------------------------------------------------------------
// Config structs (matching zivi.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Remote service settings.
    #[serde(default)]
    pub api: ApiConfig,

    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Pacing of sequential detail fetches.
    #[serde(default)]
    pub pacing: PacingSettings,

    /// Fallback country labels per display language.
    #[serde(default)]
    pub countries: CountryDefaults,
}

/// `[api]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Base URL of the ZiviConnect web API.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Name of the env var holding the bearer token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            token_env: default_token_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_base_url() -> String {
    "https://ziviconnect.admin.ch/web-zdp/api".into()
}
fn default_token_env() -> String {
    "ZIVI_TOKEN".into()
}
fn default_timeout_secs() -> u64 {
    30
}

/// `[defaults]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Locale for API responses and localized record fields.
    #[serde(default)]
    pub locale: Locale,

    /// Output encoding.
    #[serde(default)]
    pub format: OutputFormat,
}

/// `[pacing]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PacingSettings {
    /// Minimum ms between the starts of two detail fetches.
    #[serde(default = "default_min_interval")]
    pub min_interval_ms: u64,

    /// Upper bound (exclusive) of the random ms added to the minimum.
    #[serde(default = "default_fluctuation")]
    pub fluctuation_ms: u64,
}

impl Default for PacingSettings {
    fn default() -> Self {
        Self {
            min_interval_ms: default_min_interval(),
            fluctuation_ms: default_fluctuation(),
        }
    }
}

fn default_min_interval() -> u64 {
    1500
}
fn default_fluctuation() -> u64 {
    1500
}

/// `[countries]` section.
///
/// The remote service omits the country for most Swiss addresses; this label
/// is used when the localized lookup misses.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountryDefaults {
    #[serde(default = "default_country_de")]
    pub de: String,
    #[serde(default = "default_country_fr")]
    pub fr: String,
    #[serde(default = "default_country_it")]
    pub it: String,
}

impl Default for CountryDefaults {
    fn default() -> Self {
        Self {
            de: default_country_de(),
            fr: default_country_fr(),
            it: default_country_it(),
        }
    }
}

impl CountryDefaults {
    /// Fallback label for the given display language.
    pub fn for_language(&self, language: Language) -> &str {
        match language {
            Language::De => &self.de,
            Language::Fr => &self.fr,
            Language::It => &self.it,
        }
    }
}

fn default_country_de() -> String {
    "Schweiz".into()
}
fn default_country_fr() -> String {
    "Suisse".into()
}
fn default_country_it() -> String {
    "Svizzera".into()
}

// ---------------------------------------------------------------------------
// Runtime configs (merged from config + CLI flags)
// ---------------------------------------------------------------------------

/// Bounds of the jittered wait between detail fetches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PacingConfig {
    /// Minimum time between the starts of two consecutive fetches.
    pub min_interval: Duration,
    /// Width of the uniform jitter window added to `min_interval`.
    pub fluctuation: Duration,
}

impl From<&AppConfig> for PacingConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            min_interval: Duration::from_millis(config.pacing.min_interval_ms),
            fluctuation: Duration::from_millis(config.pacing.fluctuation_ms),
        }
    }
}

/// Settings for turning detail records into table rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RowConfig {
    /// Language of localized fields.
    pub language: Language,
    /// Label used when a record has no country in `language`.
    pub fallback_country: String,
}

impl RowConfig {
    /// Build the row settings for `locale` from the loaded config.
    pub fn new(config: &AppConfig, locale: Locale) -> Self {
        let language = locale.language();
        Self {
            language,
            fallback_country: config.countries.for_language(language).to_string(),
        }
    }
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.zivi/`).
pub fn config_dir() -> Result<PathBuf> {
    let home =
        dirs::home_dir().ok_or_else(|| ZiviError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.zivi/zivi.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| ZiviError::io(path, e))?;

    toml::from_str(&content)
        .map_err(|e| ZiviError::config(format!("failed to parse {}: {e}", path.display())))
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| ZiviError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content = toml::to_string_pretty(&config).map_err(|e| ZiviError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| ZiviError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Resolve the bearer token: an explicit value wins, otherwise the env var
/// named by `[api].token_env` must be set and non-empty.
pub fn resolve_token(config: &AppConfig, explicit: Option<&str>) -> Result<String> {
    if let Some(token) = explicit.filter(|t| !t.is_empty()) {
        return Ok(token.to_string());
    }

    let var_name = &config.api.token_env;
    match std::env::var(var_name) {
        Ok(val) if !val.is_empty() => Ok(val),
        _ => Err(ZiviError::config(format!(
            "authentication token not found. Set the {var_name} environment variable \
             or pass --token"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_serializes() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize default config");
        assert!(toml_str.contains("base_url"));
        assert!(toml_str.contains("ZIVI_TOKEN"));
        assert!(toml_str.contains("Schweiz"));
    }

    #[test]
    fn config_roundtrip() {
        let config = AppConfig::default();
        let toml_str = toml::to_string_pretty(&config).expect("serialize");
        let parsed: AppConfig = toml::from_str(&toml_str).expect("deserialize");
        assert_eq!(parsed.pacing.min_interval_ms, 1500);
        assert_eq!(parsed.api.token_env, "ZIVI_TOKEN");
        assert_eq!(parsed.defaults.locale, Locale::DeCh);
    }

    #[test]
    fn partial_config_uses_defaults() {
        let toml_str = r#"
[defaults]
locale = "it-CH"
format = "csv"

[countries]
it = "CH"
"#;
        let config: AppConfig = toml::from_str(toml_str).expect("parse");
        assert_eq!(config.defaults.locale, Locale::ItCh);
        assert_eq!(config.defaults.format, OutputFormat::Csv);
        assert_eq!(config.countries.it, "CH");
        assert_eq!(config.countries.de, "Schweiz");
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn pacing_config_from_app_config() {
        let mut app = AppConfig::default();
        app.pacing.min_interval_ms = 250;
        app.pacing.fluctuation_ms = 100;
        let pacing = PacingConfig::from(&app);
        assert_eq!(pacing.min_interval, Duration::from_millis(250));
        assert_eq!(pacing.fluctuation, Duration::from_millis(100));
    }

    #[test]
    fn row_config_picks_locale_country() {
        let app = AppConfig::default();
        let row = RowConfig::new(&app, Locale::FrCh);
        assert_eq!(row.language, Language::Fr);
        assert_eq!(row.fallback_country, "Suisse");
    }

    #[test]
    fn token_resolution() {
        let mut config = AppConfig::default();
        // Use a unique env var name to avoid interfering with other tests
        config.api.token_env = "ZIVI_TEST_NONEXISTENT_TOKEN_12345".into();

        let result = resolve_token(&config, None);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("token not found"));

        let token = resolve_token(&config, Some("abc")).unwrap();
        assert_eq!(token, "abc");
    }
}
