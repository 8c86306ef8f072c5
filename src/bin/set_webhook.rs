//! Register the sheetbot webhook with Telegram.
//!
//! Usage:
//!   set_webhook <public-base-url> [--config config.toml]
//!   set_webhook --delete [--config config.toml]
//!
//! The bot token comes from `TELEGRAM_TOKEN` or `[telegram] bot_token`, the
//! webhook path from `[server] webhook_path` (default `/api/bot`).

use anyhow::{Context, Result};
use reqwest::Url;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use teloxide::prelude::*;

const DEFAULT_WEBHOOK_PATH: &str = "/api/bot";

// ── Raw TOML parse structs (loose, all fields optional so partial configs load) ──

#[derive(Deserialize, Default)]
struct RawConfig {
    telegram: Option<RawTelegram>,
    server: Option<RawServer>,
}

#[derive(Deserialize, Default)]
struct RawTelegram {
    bot_token: Option<String>,
    api_url: Option<String>,
}

#[derive(Deserialize, Default)]
struct RawServer {
    webhook_path: Option<String>,
}

#[derive(Debug, PartialEq)]
enum Action {
    Set { base_url: String },
    Delete,
}

#[derive(Debug, PartialEq)]
struct Args {
    action: Action,
    config_path: PathBuf,
}

fn parse_args<I>(args: I) -> Result<Args>
where
    I: IntoIterator<Item = String>,
{
    let mut base_url = None;
    let mut delete = false;
    let mut config_path = PathBuf::from("config.toml");

    let mut args = args.into_iter();
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--delete" => delete = true,
            "--config" => {
                config_path = args
                    .next()
                    .map(PathBuf::from)
                    .context("--config needs a path")?;
            }
            other if other.starts_with("--") => anyhow::bail!("Unknown flag: {}", other),
            other => base_url = Some(other.to_string()),
        }
    }

    let action = match (delete, base_url) {
        (true, None) => Action::Delete,
        (true, Some(_)) => anyhow::bail!("--delete takes no URL"),
        (false, Some(base_url)) => Action::Set { base_url },
        (false, None) => anyhow::bail!("usage: set_webhook <public-base-url> | --delete"),
    };

    Ok(Args {
        action,
        config_path,
    })
}

/// Join the public base URL and the webhook path without doubling slashes.
fn webhook_url(base: &str, path: &str) -> Result<Url> {
    let joined = format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    );
    let url = Url::parse(&joined).with_context(|| format!("Invalid webhook URL: {}", joined))?;
    if url.scheme() != "https" {
        anyhow::bail!("Telegram only delivers webhooks over https: {}", url);
    }
    Ok(url)
}

fn load_raw_config(path: &Path) -> Result<RawConfig> {
    if !path.exists() {
        return Ok(RawConfig::default());
    }
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;
    toml::from_str(&content).context("Failed to parse config file")
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = parse_args(std::env::args().skip(1))?;
    let raw = load_raw_config(&args.config_path)?;

    let telegram = raw.telegram.unwrap_or_default();
    let token = std::env::var("TELEGRAM_TOKEN")
        .ok()
        .filter(|t| !t.trim().is_empty())
        .or(telegram.bot_token)
        .context("TELEGRAM_TOKEN is not set and config has no bot_token")?;

    let mut bot = Bot::new(token);
    if let Some(api_url) = telegram.api_url {
        let url: Url = api_url
            .parse()
            .with_context(|| format!("Invalid Telegram API URL: {}", api_url))?;
        bot = bot.set_api_url(url);
    }

    match args.action {
        Action::Set { base_url } => {
            let path = raw
                .server
                .and_then(|s| s.webhook_path)
                .unwrap_or_else(|| DEFAULT_WEBHOOK_PATH.to_string());
            let url = webhook_url(&base_url, &path)?;
            bot.set_webhook(url.clone())
                .await
                .context("setWebhook failed")?;
            tracing::info!("Webhook set to {}", url);
        }
        Action::Delete => {
            bot.delete_webhook().await.context("deleteWebhook failed")?;
            tracing::info!("Webhook removed");
        }
    }

    Ok(())
}

// ── Tests ──────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Result<Args> {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn test_webhook_url_joins_without_double_slash() {
        let url = webhook_url("https://bot.example.com/", "/api/bot").unwrap();
        assert_eq!(url.as_str(), "https://bot.example.com/api/bot");
    }

    #[test]
    fn test_webhook_url_keeps_base_path() {
        let url = webhook_url("https://example.com/hooks", "api/bot").unwrap();
        assert_eq!(url.as_str(), "https://example.com/hooks/api/bot");
    }

    #[test]
    fn test_webhook_url_requires_https() {
        assert!(webhook_url("http://example.com", "/api/bot").is_err());
        assert!(webhook_url("not a url", "/api/bot").is_err());
    }

    #[test]
    fn test_parse_set() {
        let parsed = args(&["https://bot.example.com", "--config", "prod.toml"]).unwrap();
        assert_eq!(
            parsed.action,
            Action::Set {
                base_url: "https://bot.example.com".to_string()
            }
        );
        assert_eq!(parsed.config_path, PathBuf::from("prod.toml"));
    }

    #[test]
    fn test_parse_delete() {
        let parsed = args(&["--delete"]).unwrap();
        assert_eq!(parsed.action, Action::Delete);
        assert_eq!(parsed.config_path, PathBuf::from("config.toml"));
    }

    #[test]
    fn test_parse_rejects_bad_combinations() {
        assert!(args(&[]).is_err());
        assert!(args(&["--delete", "https://x.example"]).is_err());
        assert!(args(&["--config"]).is_err());
        assert!(args(&["--verbose"]).is_err());
    }

    #[test]
    fn test_raw_config_reads_path_and_token() {
        let raw: RawConfig = toml::from_str(
            r#"
[telegram]
bot_token = "123:abc"

[server]
webhook_path = "/hook"
"#,
        )
        .unwrap();
        assert_eq!(raw.telegram.unwrap().bot_token.as_deref(), Some("123:abc"));
        assert_eq!(raw.server.unwrap().webhook_path.as_deref(), Some("/hook"));
    }
}
