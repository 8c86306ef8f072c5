use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

pub const ENV_TELEGRAM_TOKEN: &str = "TELEGRAM_TOKEN";
pub const ENV_SPREADSHEET_ID: &str = "SPREADSHEET_ID";
pub const ENV_GOOGLE_CREDENTIALS: &str = "GOOGLE_CREDENTIALS";

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    #[serde(default = "default_server_config")]
    pub server: ServerConfig,
    #[serde(default = "default_telegram_config")]
    pub telegram: TelegramConfig,
    #[serde(default = "default_sheets_config")]
    pub sheets: SheetsConfig,
    #[serde(default = "default_snapshot_config")]
    pub snapshot: SnapshotConfig,
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    #[serde(default = "default_listen_addr")]
    pub listen_addr: String,
    #[serde(default = "default_webhook_path")]
    pub webhook_path: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
    /// Alternative Bot API endpoint (local bot API server, test mocks)
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default = "default_confirmation_text")]
    pub confirmation_text: String,
    #[serde(default = "default_photo_caption")]
    pub photo_caption: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SheetsConfig {
    #[serde(default)]
    pub spreadsheet_id: String,
    /// Raw service-account credential JSON
    #[serde(default)]
    pub credentials_json: String,
    #[serde(default = "default_log_tab")]
    pub log_tab: String,
    #[serde(default = "default_status_tab")]
    pub status_tab: String,
    #[serde(default = "default_sheets_api_base_url")]
    pub api_base_url: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SnapshotConfig {
    #[serde(default = "default_max_rows")]
    pub max_rows: usize,
    /// TrueType font override; the embedded DejaVu Sans is used when unset
    #[serde(default)]
    pub font_path: Option<PathBuf>,
    #[serde(default = "default_width")]
    pub width: u32,
    #[serde(default = "default_row_height")]
    pub row_height: u32,
}

fn default_listen_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_webhook_path() -> String {
    "/api/bot".to_string()
}

fn default_confirmation_text() -> String {
    "✅ Test reply received!".to_string()
}

fn default_photo_caption() -> String {
    "📊 Current status".to_string()
}

fn default_log_tab() -> String {
    "Log".to_string()
}

fn default_status_tab() -> String {
    "Status".to_string()
}

fn default_sheets_api_base_url() -> String {
    "https://sheets.googleapis.com/v4".to_string()
}

fn default_max_rows() -> usize {
    30
}

fn default_width() -> u32 {
    1000
}

fn default_row_height() -> u32 {
    36
}

fn default_http_timeout_secs() -> u64 {
    10
}

fn default_server_config() -> ServerConfig {
    ServerConfig {
        listen_addr: default_listen_addr(),
        webhook_path: default_webhook_path(),
    }
}

fn default_telegram_config() -> TelegramConfig {
    TelegramConfig {
        bot_token: String::new(),
        api_url: None,
        confirmation_text: default_confirmation_text(),
        photo_caption: default_photo_caption(),
    }
}

fn default_sheets_config() -> SheetsConfig {
    SheetsConfig {
        spreadsheet_id: String::new(),
        credentials_json: String::new(),
        log_tab: default_log_tab(),
        status_tab: default_status_tab(),
        api_base_url: default_sheets_api_base_url(),
    }
}

fn default_snapshot_config() -> SnapshotConfig {
    SnapshotConfig {
        max_rows: default_max_rows(),
        font_path: None,
        width: default_width(),
        row_height: default_row_height(),
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: default_server_config(),
            telegram: default_telegram_config(),
            sheets: default_sheets_config(),
            snapshot: default_snapshot_config(),
            http_timeout_secs: default_http_timeout_secs(),
        }
    }
}

impl Config {
    /// Per-call timeout applied to every outbound HTTP client.
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// Load the TOML file (if it exists) and layer the process environment on top.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            Self::parse(&content)?
        } else {
            Config::default()
        };

        config.apply_env(|key| std::env::var(key).ok());
        config.warn_missing();
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content).context("Failed to parse config file")?;
        config.validate().context("Invalid configuration")?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        let path = &self.server.webhook_path;
        if !path.starts_with('/') {
            anyhow::bail!("server.webhook_path must start with '/': {:?}", path);
        }
        if path == "/healthz" {
            anyhow::bail!("server.webhook_path collides with the health endpoint");
        }
        if self.snapshot.max_rows == 0 {
            anyhow::bail!("snapshot.max_rows must be at least 1");
        }
        Ok(())
    }

    /// Environment values win over the file. Empty values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(token) = get(ENV_TELEGRAM_TOKEN) {
            self.telegram.bot_token = token;
        }
        if let Some(id) = get(ENV_SPREADSHEET_ID) {
            self.sheets.spreadsheet_id = id;
        }
        if let Some(creds) = get(ENV_GOOGLE_CREDENTIALS) {
            self.sheets.credentials_json = creds;
        }
    }

    /// Missing secrets are not fatal; the affected calls fail at request time.
    fn warn_missing(&self) {
        if self.telegram.bot_token.is_empty() {
            warn!("{} is not set; replies will fail", ENV_TELEGRAM_TOKEN);
        }
        if self.sheets.spreadsheet_id.is_empty() {
            warn!("{} is not set; spreadsheet calls will fail", ENV_SPREADSHEET_ID);
        }
        if self.sheets.credentials_json.is_empty() {
            warn!(
                "{} is not set; spreadsheet calls will fail",
                ENV_GOOGLE_CREDENTIALS
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.server.webhook_path, "/api/bot");
        assert_eq!(config.snapshot.max_rows, 30);
        assert_eq!(config.http_timeout_secs, 10);
        assert_eq!(config.sheets.log_tab, "Log");
        assert_eq!(config.sheets.status_tab, "Status");
        assert!(config.telegram.api_url.is_none());
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config = Config::parse(
            r#"
http_timeout_secs = 3

[sheets]
log_tab = "Inbox"

[telegram]
confirmation_text = "got it"
"#,
        )
        .unwrap();
        assert_eq!(config.http_timeout(), Duration::from_secs(3));
        assert_eq!(config.sheets.log_tab, "Inbox");
        assert_eq!(config.sheets.status_tab, "Status");
        assert_eq!(config.telegram.confirmation_text, "got it");
        assert_eq!(config.telegram.photo_caption, "📊 Current status");
    }

    #[test]
    fn test_env_overrides_file_values() {
        let mut config = Config::parse(
            r#"
[telegram]
bot_token = "from-file"

[sheets]
spreadsheet_id = "file-sheet"
"#,
        )
        .unwrap();

        let env: HashMap<&str, &str> = [
            (ENV_TELEGRAM_TOKEN, "123:abc"),
            (ENV_SPREADSHEET_ID, "  "),
            (ENV_GOOGLE_CREDENTIALS, "{}"),
        ]
        .into_iter()
        .collect();
        config.apply_env(|key| env.get(key).map(|v| v.to_string()));

        assert_eq!(config.telegram.bot_token, "123:abc");
        // blank env value does not clobber the file
        assert_eq!(config.sheets.spreadsheet_id, "file-sheet");
        assert_eq!(config.sheets.credentials_json, "{}");
    }

    #[test]
    fn test_missing_file_falls_back_to_defaults() {
        let config = Config::load(Path::new("/nonexistent/sheetbot.toml")).unwrap();
        assert_eq!(config.server.listen_addr, "0.0.0.0:8080");
    }

    #[test]
    fn test_webhook_path_needs_leading_slash() {
        let err = Config::parse("[server]\nwebhook_path = \"api/bot\"").unwrap_err();
        assert!(format!("{:#}", err).contains("must start with '/'"));
        assert!(Config::parse("[server]\nwebhook_path = \"/healthz\"").is_err());
        assert!(Config::parse("[server]\nwebhook_path = \"/hooks/telegram\"").is_ok());
    }

    #[test]
    fn test_invalid_file_fails_load() {
        let path = std::env::temp_dir().join(format!("sheetbot-config-{}.toml", std::process::id()));
        std::fs::write(&path, "[server]\nwebhook_path = \"bot\"\n").unwrap();
        let result = Config::load(&path);
        std::fs::remove_file(&path).unwrap();
        assert!(result.is_err());
    }

    #[test]
    fn test_invalid_toml_is_an_error() {
        assert!(Config::parse("server = [").is_err());
    }
}
