//! Module for global bot configuration.
//!
//! Tunables that never change at runtime are plain constants. Everything an operator may want to
//! change lives in [`Config`], read from a TOML file with secrets layered on top from the
//! environment.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context as _};
use serde::Deserialize;

/// The prefix that is always accepted, in every guild and in DMs.
pub(crate) const DEFAULT_PREFIX: &str = "i.";
/// How many custom prefixes a guild may add on top of the default one.
pub(crate) const MAX_CUSTOM_PREFIXES: usize = 9;
/// Longest prefix, in characters.
pub(crate) const MAX_PREFIX_LEN: usize = 10;

/// How long the owner has to type the confirmation code for restart/shutdown.
pub(crate) const POWER_CONFIRM_TIMEOUT: Duration = Duration::from_secs(15);
/// How long a moderator has to react to a kick/ban/hardpurge prompt.
pub(crate) const REACTION_CONFIRM_TIMEOUT: Duration = Duration::from_secs(30);
/// Lifetime of interactive embeds (help pages, avatar buttons).
pub(crate) const INTERACTIVE_TIMEOUT: Duration = Duration::from_secs(180);

/// Idle time after the queue runs dry before leaving the voice channel.
pub(crate) const IDLE_DISCONNECT: Duration = Duration::from_secs(30);
pub(crate) const DEFAULT_VOLUME: u16 = 50;
pub(crate) const MAX_VOLUME: u16 = 150;
/// Upcoming tracks listed by the queue command.
pub(crate) const QUEUE_PREVIEW: usize = 10;

/// Discord refuses timeouts longer than this.
pub(crate) const MAX_TIMEOUT: Duration = Duration::from_secs(28 * 24 * 60 * 60);
/// Number of cases shown when listing a user's history.
pub(crate) const CASE_HISTORY_PREVIEW: usize = 5;

/// Time to fill in the help request form.
pub(crate) const MODAL_TIMEOUT: Duration = Duration::from_secs(300);
/// How long a help request's buttons keep working.
pub(crate) const HELP_TICKET_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);

/// Discord's cap on an embed description, in characters.
pub(crate) const EMBED_DESCRIPTION_LIMIT: usize = 4096;
/// Discord's cap on an embed field value, in characters.
pub(crate) const EMBED_FIELD_LIMIT: usize = 1024;

/// Most messages one purge may delete.
pub(crate) const MAX_PURGE: u32 = 1000;

/// Commands per page in the interactive help.
pub(crate) const HELP_PAGE_SIZE: usize = 5;

/// Environment variable that points at the config file.
pub(crate) const CONFIG_PATH_VAR: &str = "LAZYBOT_CONFIG";
const DEFAULT_CONFIG_PATH: &str = "config.toml";

/// Operator configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct Config {
    /// Bot token. Only ever read from `DISCORD_TOKEN`.
    #[serde(skip)]
    pub(crate) token: String,
    /// Extra owners on top of the application owner.
    pub(crate) owners: Vec<u64>,
    /// Directory for the SQLite files and the daily word list.
    pub(crate) data_dir: PathBuf,
    /// Directory that receives incident dumps.
    pub(crate) error_dir: PathBuf,
    pub(crate) lavalink: Option<LavalinkConfig>,
    pub(crate) ai: AiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct LavalinkConfig {
    pub(crate) host: String,
    pub(crate) port: u16,
    pub(crate) password: String,
    pub(crate) ssl: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub(crate) struct AiConfig {
    /// Gemini API key. Only ever read from `GEMINI_API_KEY`.
    #[serde(skip)]
    pub(crate) api_key: Option<String>,
    pub(crate) model: String,
    pub(crate) endpoint: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            token: String::new(),
            owners: Vec::new(),
            data_dir: PathBuf::from("db"),
            error_dir: PathBuf::from("errors"),
            lavalink: None,
            ai: AiConfig::default(),
        }
    }
}

impl Default for LavalinkConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 2333,
            password: "youshallnotpass".to_string(),
            ssl: false,
        }
    }
}

impl Default for AiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: "gemini-1.5-flash".to_string(),
            endpoint: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
        }
    }
}

impl LavalinkConfig {
    /// `host:port`, the form lavalink-rs wants.
    pub(crate) fn address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Base URL of the node's REST API.
    pub(crate) fn rest_url(&self) -> String {
        let scheme = if self.ssl { "https" } else { "http" };
        format!("{}://{}", scheme, self.address())
    }
}

impl Config {
    /// Parses a config file's contents. Secrets are not touched.
    pub(crate) fn parse(raw: &str) -> anyhow::Result<Self> {
        toml::from_str(raw).context("invalid config file")
    }

    /// Loads the config file (a missing file means defaults) and layers the environment on top.
    pub(crate) fn load() -> anyhow::Result<Self> {
        let path = std::env::var(CONFIG_PATH_VAR).unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into());
        let mut config = Self::read(Path::new(&path))?;
        config.apply_env(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    fn read(path: &Path) -> anyhow::Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::parse(&raw),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(e) => Err(e).with_context(|| format!("could not read {}", path.display())),
        }
    }

    /// Pulls secrets from `lookup`, which is the process environment outside of tests.
    pub(crate) fn apply_env(
        &mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> anyhow::Result<()> {
        self.token = lookup("DISCORD_TOKEN")
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| anyhow!("DISCORD_TOKEN is not set"))?;
        self.ai.api_key = lookup("GEMINI_API_KEY").filter(|k| !k.trim().is_empty());
        // a password alone doesn't enable music
        if let (Some(node), Some(password)) = (self.lavalink.as_mut(), lookup("LAVALINK_PASSWORD")) {
            node.password = password;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.data_dir, PathBuf::from("db"));
        assert!(config.lavalink.is_none());
        assert_eq!(config.ai.model, "gemini-1.5-flash");
    }

    #[test]
    fn test_file_values() {
        let config = Config::parse(
            r#"
            owners = [42]
            data_dir = "/var/lib/lazybot"

            [lavalink]
            host = "music.local"
            port = 443
            ssl = true
            "#,
        )
        .unwrap();
        assert_eq!(config.owners, vec![42]);
        let lavalink = config.lavalink.unwrap();
        assert_eq!(lavalink.rest_url(), "https://music.local:443");
        assert_eq!(lavalink.password, "youshallnotpass");
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::parse("[lavalink]").unwrap();
        config
            .apply_env(env(&[
                ("DISCORD_TOKEN", "abc"),
                ("GEMINI_API_KEY", "key"),
                ("LAVALINK_PASSWORD", "hunter2"),
            ]))
            .unwrap();
        assert_eq!(config.token, "abc");
        assert_eq!(config.ai.api_key.as_deref(), Some("key"));
        assert_eq!(config.lavalink.unwrap().password, "hunter2");
    }

    #[test]
    fn test_password_alone_leaves_music_off() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("DISCORD_TOKEN", "abc"), ("LAVALINK_PASSWORD", "hunter2")]))
            .unwrap();
        assert!(config.lavalink.is_none());
    }

    #[test]
    fn test_missing_token() {
        let mut config = Config::default();
        assert!(config.apply_env(env(&[])).is_err());
        assert!(config.apply_env(env(&[("DISCORD_TOKEN", "  ")])).is_err());
    }

    #[test]
    fn test_blank_ai_key_disables() {
        let mut config = Config::default();
        config
            .apply_env(env(&[("DISCORD_TOKEN", "abc"), ("GEMINI_API_KEY", "")]))
            .unwrap();
        assert!(config.ai.api_key.is_none());
    }
}
