// ABOUTME: Bot configuration loaded from config.toml with TWITCH_*/OPENAI_* env overrides
// ABOUTME: Covers chat login, token refresh, transport reconnects and TTS settings
use crate::backoff::ReconnectPolicy;
use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub bot: BotConfig,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auth: Option<AuthConfig>,
    #[serde(default)]
    pub transport: TransportConfig,
    #[serde(default)]
    pub tts: TtsConfig,
}

#[derive(Clone, Serialize, Deserialize)]
pub struct BotConfig {
    pub username: String,
    /// Chat access token, with or without the "oauth:" prefix
    pub access_token: String,
    #[serde(default)]
    pub channels: Vec<String>,
}

// Custom Debug impl to redact access_token
impl std::fmt::Debug for BotConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BotConfig")
            .field("username", &self.username)
            .field("access_token", &"[REDACTED]")
            .field("channels", &self.channels)
            .finish()
    }
}

// ─── AuthConfig ─────────────────────────────────────────────────

/// Refresh-token grant settings. When absent the access token is never renewed.
#[derive(Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    pub refresh_token: String,
    pub client_id: String,
    pub client_secret: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
}

// Custom Debug impl to redact refresh_token and client_secret
impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("refresh_token", &"[REDACTED]")
            .field("client_id", &self.client_id)
            .field("client_secret", &"[REDACTED]")
            .field("token_url", &self.token_url)
            .field("refresh_interval_secs", &self.refresh_interval_secs)
            .finish()
    }
}

impl AuthConfig {
    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.refresh_interval_secs)
    }
}

// ─── TransportConfig ────────────────────────────────────────────

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransportConfig {
    #[serde(default = "default_transport_url")]
    pub url: String,
    /// Reconnect automatically after a dropped connection
    #[serde(default = "default_true")]
    pub reconnect: bool,
    #[serde(default = "default_reconnect_initial_secs")]
    pub reconnect_initial_secs: u64,
    #[serde(default = "default_reconnect_max_secs")]
    pub reconnect_max_secs: u64,
    /// Consecutive failed reconnects before giving up (0 = never)
    #[serde(default)]
    pub reconnect_max_attempts: u32,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            url: default_transport_url(),
            reconnect: true,
            reconnect_initial_secs: default_reconnect_initial_secs(),
            reconnect_max_secs: default_reconnect_max_secs(),
            reconnect_max_attempts: 0,
        }
    }
}

impl TransportConfig {
    pub fn reconnect_policy(&self) -> ReconnectPolicy {
        ReconnectPolicy {
            initial_delay: Duration::from_secs(self.reconnect_initial_secs),
            max_delay: Duration::from_secs(self.reconnect_max_secs),
            max_attempts: self.reconnect_max_attempts,
        }
    }
}

// ─── TtsConfig ──────────────────────────────────────────────────

#[derive(Clone, Serialize, Deserialize)]
pub struct TtsConfig {
    #[serde(default)]
    pub enabled: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    #[serde(default = "default_tts_base_url")]
    pub base_url: String,
    #[serde(default = "default_tts_model")]
    pub model: String,
    #[serde(default = "default_tts_voice")]
    pub voice: String,
    #[serde(default = "default_tts_format")]
    pub format: String,
    #[serde(default = "default_tts_output_path")]
    pub output_path: String,
}

impl Default for TtsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            api_key: None,
            base_url: default_tts_base_url(),
            model: default_tts_model(),
            voice: default_tts_voice(),
            format: default_tts_format(),
            output_path: default_tts_output_path(),
        }
    }
}

// Custom Debug impl to redact api_key
impl std::fmt::Debug for TtsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtsConfig")
            .field("enabled", &self.enabled)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("voice", &self.voice)
            .field("format", &self.format)
            .field("output_path", &self.output_path)
            .finish()
    }
}

pub const DEFAULT_TOKEN_URL: &str = "https://id.twitch.tv/oauth2/token";
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 4 * 60 * 60; // 4 hours

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_transport_url() -> String {
    "wss://irc-ws.chat.twitch.tv:443".to_string()
}

fn default_reconnect_initial_secs() -> u64 {
    2
}

fn default_reconnect_max_secs() -> u64 {
    60
}

fn default_tts_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_tts_model() -> String {
    "tts-1".to_string()
}

fn default_tts_voice() -> String {
    "alloy".to_string()
}

fn default_tts_format() -> String {
    "mp3".to_string()
}

fn default_tts_output_path() -> String {
    "./public/file.mp3".to_string()
}

fn default_true() -> bool {
    true
}

/// Interpret a flag value the way the TTS switch is written in env files.
///
/// Looser than an exact `"true"` match: surrounding whitespace is ignored,
/// case is ignored and `"1"` also counts as on. Anything else is off.
pub fn parse_flag(value: &str) -> bool {
    let value = value.trim();
    value.eq_ignore_ascii_case("true") || value == "1"
}

/// Split a comma-separated channel list, dropping empty entries
fn split_channels(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Find the config file, checking multiple locations in order:
    /// 1. HERALD_CONFIG_PATH env var (if set)
    /// 2. ./config.toml (current directory - for development)
    /// 3. ~/.config/herald/config.toml (XDG config dir)
    fn find_config_file() -> Option<PathBuf> {
        if let Ok(env_path) = std::env::var("HERALD_CONFIG_PATH") {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Some(path);
            }
        }

        let local_config = PathBuf::from("config.toml");
        if local_config.exists() {
            return Some(local_config);
        }

        let xdg_config = paths::config_file();
        if xdg_config.exists() {
            return Some(xdg_config);
        }

        None
    }

    /// Load configuration from config.toml with environment variable overrides
    pub fn load() -> Result<Self> {
        let config = if let Some(config_path) = Self::find_config_file() {
            tracing::info!(
                path = %config_path.display(),
                "Loading configuration from file"
            );
            Self::from_file(&config_path)?
        } else {
            tracing::info!("No config file found, using environment variables and defaults");
            Config {
                bot: BotConfig {
                    username: String::new(),
                    access_token: String::new(),
                    channels: Vec::new(),
                },
                auth: None,
                transport: TransportConfig::default(),
                tts: TtsConfig::default(),
            }
        };

        config.with_env_overrides()?.validated()
    }

    /// Load an explicit config file, then apply env overrides and validation
    pub fn load_from(path: &std::path::Path) -> Result<Self> {
        Self::from_file(path)?.with_env_overrides()?.validated()
    }

    fn from_file(path: &std::path::Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        toml::from_str::<Config>(&content)
            .with_context(|| format!("Failed to parse {}", path.display()))
    }

    fn with_env_overrides(mut self) -> Result<Self> {
        if let Ok(val) = std::env::var("TWITCH_BOT_USERNAME") {
            self.bot.username = val;
        }
        if let Ok(val) = std::env::var("TWITCH_OAUTH_TOKEN") {
            self.bot.access_token = val;
        }
        if let Ok(val) = std::env::var("TWITCH_CHANNELS") {
            self.bot.channels = split_channels(&val);
        }

        let refresh_token = std::env::var("TWITCH_REFRESH_TOKEN").ok();
        let client_id = std::env::var("TWITCH_CLIENT_ID").ok();
        let client_secret = std::env::var("TWITCH_CLIENT_SECRET").ok();
        match self.auth {
            Some(ref mut auth) => {
                if let Some(val) = refresh_token {
                    auth.refresh_token = val;
                }
                if let Some(val) = client_id {
                    auth.client_id = val;
                }
                if let Some(val) = client_secret {
                    auth.client_secret = val;
                }
            }
            None => {
                // Env vars alone can enable renewal when all three are present
                if let (Some(refresh_token), Some(client_id), Some(client_secret)) =
                    (refresh_token, client_id, client_secret)
                {
                    self.auth = Some(AuthConfig {
                        refresh_token,
                        client_id,
                        client_secret,
                        token_url: default_token_url(),
                        refresh_interval_secs: default_refresh_interval_secs(),
                    });
                }
            }
        }
        if let Some(ref mut auth) = self.auth {
            if let Ok(val) = std::env::var("TWITCH_TOKEN_URL") {
                auth.token_url = val;
            }
        }

        if let Ok(val) = std::env::var("OPENAI_API_KEY") {
            self.tts.api_key = Some(val);
        }
        if let Ok(val) = std::env::var("ENABLE_TTS") {
            self.tts.enabled = parse_flag(&val);
        }

        Ok(self)
    }

    fn validated(mut self) -> Result<Self> {
        if self.bot.username.trim().is_empty() {
            anyhow::bail!(
                "bot.username is required (set in config.toml or TWITCH_BOT_USERNAME env var)"
            );
        }
        if self.bot.access_token.trim().is_empty() {
            anyhow::bail!(
                "bot.access_token is required (set in config.toml or TWITCH_OAUTH_TOKEN env var)"
            );
        }
        self.bot.channels.retain(|c| !c.trim().is_empty());

        if let Some(ref auth) = self.auth {
            if auth.refresh_token.trim().is_empty()
                || auth.client_id.trim().is_empty()
                || auth.client_secret.trim().is_empty()
            {
                anyhow::bail!(
                    "auth requires refresh_token, client_id and client_secret to all be set"
                );
            }
            if auth.refresh_interval_secs == 0 {
                anyhow::bail!("auth.refresh_interval_secs must be greater than zero");
            }
        }

        if self.transport.reconnect_initial_secs == 0 {
            anyhow::bail!("transport.reconnect_initial_secs must be greater than zero");
        }
        if self.transport.reconnect_max_secs < self.transport.reconnect_initial_secs {
            anyhow::bail!(
                "transport.reconnect_max_secs must be at least transport.reconnect_initial_secs"
            );
        }

        if self.tts.enabled
            && self
                .tts
                .api_key
                .as_deref()
                .map(|k| k.trim().is_empty())
                .unwrap_or(true)
        {
            anyhow::bail!("tts.api_key is required when TTS is enabled (or set OPENAI_API_KEY)");
        }

        Ok(self)
    }
}
