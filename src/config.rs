use anyhow::{ensure, Result};
use serde::{Deserialize, Deserializer};
use std::path::Path;

/// Transport used when `TRANSPORT_TYPE` is unset or empty.
pub const DEFAULT_TRANSPORT: &str = "daily";

/// Upper bound for `daily.room_ttl_secs` (one year)
pub const MAX_ROOM_TTL_SECS: u64 = 365 * 24 * 60 * 60;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub service: ServiceConfig,
    pub daily: DailyConfig,
    pub azure: AzureConfig,
    pub bot: BotConfig,

    /// Enabled transports, parsed from the comma-separated `transport_type` value
    #[serde(rename = "transport_type", deserialize_with = "deserialize_transports")]
    pub enabled_transports: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    pub name: String,
    pub http: HttpConfig,
    /// Directory holding `client.html`
    pub client_dir: String,
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DailyConfig {
    pub api_key: Option<String>,
    pub api_url: String,
    pub room_ttl_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AzureConfig {
    pub api_key: Option<String>,
    pub region: Option<String>,
    pub voice: String,
    /// Override for the synthesis endpoint (defaults to the regional Azure URL)
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BotConfig {
    pub greeting: String,
    pub idle_timeout_secs: u64,
    pub handle_sigint: bool,
}

impl Config {
    /// Load configuration: defaults, then an optional file, then environment variables.
    pub fn load(path: Option<&str>) -> Result<Self> {
        let defaults = Config::default();

        let mut builder = config::Config::builder()
            .set_default("service.name", defaults.service.name)?
            .set_default("service.http.bind", defaults.service.http.bind)?
            .set_default("service.http.port", defaults.service.http.port as i64)?
            .set_default("service.client_dir", defaults.service.client_dir)?
            .set_default("service.cors_origins", defaults.service.cors_origins)?
            .set_default("daily.api_url", defaults.daily.api_url)?
            .set_default("daily.room_ttl_secs", defaults.daily.room_ttl_secs as i64)?
            .set_default("azure.voice", defaults.azure.voice)?
            .set_default("bot.greeting", defaults.bot.greeting)?
            .set_default("bot.idle_timeout_secs", defaults.bot.idle_timeout_secs as i64)?
            .set_default("bot.handle_sigint", defaults.bot.handle_sigint)?
            .set_default("transport_type", DEFAULT_TRANSPORT)?;

        if let Some(path) = path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        let settings = builder
            .set_override_option("daily.api_key", env_var("DAILY_API_KEY"))?
            .set_override_option("daily.api_url", env_var("DAILY_API_URL"))?
            .set_override_option("azure.api_key", env_var("AZURE_SPEECH_API_KEY"))?
            .set_override_option("azure.region", env_var("AZURE_SPEECH_REGION"))?
            .set_override_option("azure.voice", env_var("AZURE_SPEECH_VOICE"))?
            .set_override_option("transport_type", env_var("TRANSPORT_TYPE"))?
            .build()?;

        let cfg: Config = settings.try_deserialize()?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Reject values that would only fail later, per request
    pub fn validate(&self) -> Result<()> {
        ensure!(
            (1..=MAX_ROOM_TTL_SECS).contains(&self.daily.room_ttl_secs),
            "daily.room_ttl_secs must be between 1 and {} (got {})",
            MAX_ROOM_TTL_SECS,
            self.daily.room_ttl_secs
        );
        Ok(())
    }

    /// First enabled transport
    pub fn default_transport(&self) -> &str {
        self.enabled_transports
            .first()
            .map(String::as_str)
            .unwrap_or(DEFAULT_TRANSPORT)
    }

    pub fn is_transport_enabled(&self, name: &str) -> bool {
        self.enabled_transports.iter().any(|t| t == name)
    }
}

/// Load a `.env` file (`path`, or `.env` in the working directory) into the
/// process environment. File values replace variables that are already set.
/// Returns whether a file was loaded.
pub fn load_env_file(path: Option<&Path>) -> bool {
    let loaded = match path {
        Some(path) => dotenvy::from_path_override(path),
        None => dotenvy::dotenv_override().map(|_| ()),
    };
    loaded.is_ok()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service: ServiceConfig {
                name: "azuredebug-server".to_string(),
                http: HttpConfig {
                    bind: "localhost".to_string(),
                    port: 7860,
                },
                client_dir: "client".to_string(),
                cors_origins: [
                    "null", // browser file:// pages
                    "http://localhost:3000",
                    "http://127.0.0.1:3000",
                    "http://localhost:4321",
                    "https://app.neocertif.com",
                    "https://demo.neocertif.com",
                    "https://voiceagent.neocertif.com",
                    "https://ad.neocertif.com",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            },
            daily: DailyConfig {
                api_key: None,
                api_url: "https://api.daily.co/v1".to_string(),
                room_ttl_secs: 7200, // 2 hours
            },
            azure: AzureConfig {
                api_key: None,
                region: None,
                voice: "fr-FR-VivienneMultilingualNeural".to_string(),
                endpoint: None,
            },
            bot: BotConfig {
                greeting: "Bonjour le monde je suis ici en France!".to_string(),
                idle_timeout_secs: 300,
                handle_sigint: false,
            },
            enabled_transports: vec![DEFAULT_TRANSPORT.to_string()],
        }
    }
}

/// Parse a comma-separated transport list: trimmed, lower-cased, order preserved.
/// An empty list falls back to `["daily"]`.
pub fn parse_enabled_transports(raw: &str) -> Vec<String> {
    let transports: Vec<String> = raw
        .split(',')
        .map(|item| item.trim().to_lowercase())
        .filter(|item| !item.is_empty())
        .collect();

    if transports.is_empty() {
        vec![DEFAULT_TRANSPORT.to_string()]
    } else {
        transports
    }
}

fn deserialize_transports<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    Ok(parse_enabled_transports(&raw))
}

fn env_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.trim().is_empty())
}
