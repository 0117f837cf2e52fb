// ABOUTME: Tests for loading bot configuration from TOML and the environment
// ABOUTME: Checks env overrides, env-only token refresh and validation errors

use herald_core::config::Config;
use serial_test::serial;
use std::io::Write;
use std::path::PathBuf;

/// Helper to clear all config-related env vars
fn clear_config_env_vars() {
    for key in [
        "HERALD_CONFIG_PATH",
        "TWITCH_BOT_USERNAME",
        "TWITCH_OAUTH_TOKEN",
        "TWITCH_CHANNELS",
        "TWITCH_REFRESH_TOKEN",
        "TWITCH_CLIENT_ID",
        "TWITCH_CLIENT_SECRET",
        "TWITCH_TOKEN_URL",
        "OPENAI_API_KEY",
        "ENABLE_TTS",
    ] {
        std::env::remove_var(key);
    }
}

fn write_config(dir: &tempfile::TempDir, content: &str) -> PathBuf {
    let path = dir.path().join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    file.write_all(content.as_bytes()).unwrap();
    path
}

const FULL_CONFIG: &str = r#"
[bot]
username = "herald_bot"
access_token = "oauth:file-token"
channels = ["alpha", "beta"]

[auth]
refresh_token = "file-refresh"
client_id = "file-client"
client_secret = "file-secret"
refresh_interval_secs = 600

[transport]
reconnect = false

[tts]
enabled = true
api_key = "sk-file"
voice = "nova"
"#;

#[test]
#[serial]
fn test_config_loads_from_toml_file() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, FULL_CONFIG);
    std::env::set_var("HERALD_CONFIG_PATH", &path);

    let config = Config::load().unwrap();

    assert_eq!(config.bot.username, "herald_bot");
    assert_eq!(config.bot.access_token, "oauth:file-token");
    assert_eq!(config.bot.channels, vec!["alpha", "beta"]);
    let auth = config.auth.as_ref().unwrap();
    assert_eq!(auth.client_id, "file-client");
    assert_eq!(auth.refresh_interval_secs, 600);
    assert_eq!(auth.token_url, "https://id.twitch.tv/oauth2/token");
    assert!(!config.transport.reconnect);
    assert!(config.tts.enabled);
    assert_eq!(config.tts.voice, "nova");
    assert_eq!(config.tts.model, "tts-1");

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_config_env_var_overrides() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, FULL_CONFIG);

    std::env::set_var("TWITCH_BOT_USERNAME", "env_bot");
    std::env::set_var("TWITCH_OAUTH_TOKEN", "env-token");
    std::env::set_var("TWITCH_CHANNELS", "gamma, delta,");
    std::env::set_var("TWITCH_CLIENT_SECRET", "env-secret");
    std::env::set_var("TWITCH_TOKEN_URL", "http://localhost:9999/token");
    std::env::set_var("ENABLE_TTS", "false");

    let config = Config::load_from(&path).unwrap();

    assert_eq!(config.bot.username, "env_bot");
    assert_eq!(config.bot.access_token, "env-token");
    assert_eq!(config.bot.channels, vec!["gamma", "delta"]);
    let auth = config.auth.as_ref().unwrap();
    assert_eq!(auth.client_secret, "env-secret");
    assert_eq!(auth.refresh_token, "file-refresh");
    assert_eq!(auth.token_url, "http://localhost:9999/token");
    assert!(!config.tts.enabled);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_env_alone_enables_token_refresh() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[bot]
username = "herald_bot"
access_token = "abc"
"#,
    );

    std::env::set_var("TWITCH_REFRESH_TOKEN", "r");
    std::env::set_var("TWITCH_CLIENT_ID", "id");
    std::env::set_var("TWITCH_CLIENT_SECRET", "s");

    let config = Config::load_from(&path).unwrap();
    let auth = config.auth.expect("auth built from env");
    assert_eq!(auth.refresh_token, "r");
    assert_eq!(auth.refresh_interval_secs, 4 * 60 * 60);

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_partial_refresh_env_does_not_enable_refresh() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[bot]
username = "herald_bot"
access_token = "abc"
"#,
    );
    std::env::set_var("TWITCH_REFRESH_TOKEN", "r");

    let config = Config::load_from(&path).unwrap();
    assert!(config.auth.is_none());

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_missing_username_is_rejected() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[bot]
username = ""
access_token = "abc"
"#,
    );

    let err = Config::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("bot.username"));
}

#[test]
#[serial]
fn test_tts_enabled_requires_api_key() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[bot]
username = "herald_bot"
access_token = "abc"

[tts]
enabled = true
"#,
    );

    let err = Config::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("tts.api_key"));

    std::env::set_var("OPENAI_API_KEY", "sk-env");
    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.tts.api_key.as_deref(), Some("sk-env"));

    clear_config_env_vars();
}

#[test]
#[serial]
fn test_incomplete_auth_section_is_rejected() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[bot]
username = "herald_bot"
access_token = "abc"

[auth]
refresh_token = "r"
client_id = ""
client_secret = "s"
"#,
    );

    let err = Config::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("auth requires"));
}

#[test]
#[serial]
fn test_zero_reconnect_delay_is_rejected() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[bot]
username = "herald_bot"
access_token = "abc"

[transport]
reconnect_initial_secs = 0
"#,
    );

    let err = Config::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("transport.reconnect_initial_secs"));
}

#[test]
#[serial]
fn test_reconnect_cap_below_initial_delay_is_rejected() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(
        &dir,
        r#"
[bot]
username = "herald_bot"
access_token = "abc"

[transport]
reconnect_initial_secs = 30
reconnect_max_secs = 5
"#,
    );

    let err = Config::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("transport.reconnect_max_secs"));
}

#[test]
#[serial]
fn test_invalid_toml_reports_path() {
    clear_config_env_vars();
    let dir = tempfile::tempdir().unwrap();
    let path = write_config(&dir, "[bot\nusername = ");

    let err = Config::load_from(&path).unwrap_err();
    assert!(format!("{err:#}").contains("Failed to parse"));
}
