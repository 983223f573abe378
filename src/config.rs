use std::collections::{HashMap, HashSet};

use serde::Deserialize;
use thiserror::Error;

use crate::util::env::{self, EnvErr};

pub const ENV_PREFIX: &str = "KARMABOT_";

/// Raw startup settings, read once from `KARMABOT_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct Settings {
    #[serde(default)]
    pub slack_bot_token: String,
    #[serde(default)]
    pub slack_app_token: String,
    #[serde(default = "default_db")]
    pub db: String,
    #[serde(default = "default_max_points")]
    pub max_points: u32,
    #[serde(default = "default_leaderboard_limit")]
    pub leaderboard_limit: u32,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "enabled")]
    pub motivate: bool,
    #[serde(default = "enabled")]
    pub reactji: bool,
    #[serde(default = "default_upvotes")]
    pub upvote_reactions: Vec<String>,
    #[serde(default = "default_downvotes")]
    pub downvote_reactions: Vec<String>,
    #[serde(default = "enabled")]
    pub self_karma: bool,
    #[serde(default)]
    pub reply_mode: ReplyMode,
    #[serde(default)]
    pub blacklist: Vec<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    pub webui_listen_addr: Option<String>,
    pub webui_url: Option<String>,
    pub webui_totp: Option<String>,
    pub otel_endpoint: Option<String>,
}

impl Settings {
    pub fn from_env() -> ConfigResult<Self> {
        Ok(env::from_env(ENV_PREFIX)?)
    }

    /// Dashboard settings, present only when a listen address is configured.
    pub fn webui(&self) -> Option<WebUiSettings> {
        let listen_addr = self.webui_listen_addr.clone()?;
        let url = self
            .webui_url
            .clone()
            .unwrap_or_else(|| format!("http://{listen_addr}"));

        Some(WebUiSettings {
            url: url.trim_end_matches('/').to_string(),
            listen_addr,
            totp_secret: self.webui_totp.clone(),
            leaderboard_limit: self.leaderboard_limit,
        })
    }
}

#[derive(Debug, Clone)]
pub struct WebUiSettings {
    pub listen_addr: String,
    pub url: String,
    pub totp_secret: Option<String>,
    pub leaderboard_limit: u32,
}

/// Where command replies are posted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReplyMode {
    #[default]
    Channel,
    Thread,
    Ephemeral,
}

/// Alias username -> canonical username. Canonical names are never aliases themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AliasTable(HashMap<String, String>);

impl AliasTable {
    /// Builds the table from `canonical++alias1++alias2` groups.
    pub fn parse<I, S>(groups: I) -> ConfigResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut table: HashMap<String, String> = HashMap::new();

        for group in groups {
            let group = group.as_ref();
            let names: Vec<String> = group
                .split("++")
                .map(|name| name.trim().to_lowercase())
                .collect();

            let [canonical, aliases @ ..] = names.as_slice() else {
                return Err(ConfigError::InvalidAlias(group.to_string()));
            };

            if aliases.is_empty() || names.iter().any(String::is_empty) {
                return Err(ConfigError::InvalidAlias(group.to_string()));
            }

            for alias in aliases {
                if alias == canonical {
                    return Err(ConfigError::InvalidAlias(group.to_string()));
                }

                if let Some(existing) = table.get(alias)
                    && existing != canonical
                {
                    return Err(ConfigError::ConflictingAlias {
                        alias: alias.clone(),
                        first: existing.clone(),
                        second: canonical.clone(),
                    });
                }

                table.insert(alias.clone(), canonical.clone());
            }
        }

        if let Some(chained) = table.values().find(|canonical| table.contains_key(*canonical)) {
            return Err(ConfigError::AliasChain(chained.clone()));
        }

        Ok(Self(table))
    }

    /// Returns the canonical name for `name` (expected lowercase), or `name` itself.
    pub fn resolve<'a>(&'a self, name: &'a str) -> &'a str {
        self.0.get(name).map(String::as_str).unwrap_or(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }
}

#[derive(Debug, Clone, Default)]
pub struct ReactionConfig {
    pub enabled: bool,
    pub upvote: HashSet<String>,
    pub downvote: HashSet<String>,
}

/// Immutable runtime configuration shared by every component of the bot.
#[derive(Debug, Clone)]
pub struct Config {
    pub max_points: u32,
    pub leaderboard_limit: u32,
    pub debug: bool,
    pub motivate: bool,
    pub self_karma: bool,
    pub reply_mode: ReplyMode,
    pub blacklist: HashSet<String>,
    pub aliases: AliasTable,
    pub reactji: ReactionConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_points: default_max_points(),
            leaderboard_limit: default_leaderboard_limit(),
            debug: false,
            motivate: true,
            self_karma: true,
            reply_mode: ReplyMode::Channel,
            blacklist: HashSet::new(),
            aliases: AliasTable::default(),
            reactji: ReactionConfig {
                enabled: true,
                upvote: default_upvotes().into_iter().collect(),
                downvote: default_downvotes().into_iter().collect(),
            },
        }
    }
}

impl TryFrom<&Settings> for Config {
    type Error = ConfigError;

    fn try_from(settings: &Settings) -> ConfigResult<Self> {
        if settings.max_points == 0 {
            return Err(ConfigError::InvalidMaxPoints);
        }

        let aliases = AliasTable::parse(&settings.aliases)?;
        tracing::debug!(alias_count = aliases.len(), "loaded user aliases");

        Ok(Self {
            max_points: settings.max_points,
            leaderboard_limit: settings.leaderboard_limit,
            debug: settings.debug,
            motivate: settings.motivate,
            self_karma: settings.self_karma,
            reply_mode: settings.reply_mode,
            blacklist: settings
                .blacklist
                .iter()
                .map(|user| user.to_lowercase())
                .collect(),
            aliases,
            reactji: ReactionConfig {
                enabled: settings.reactji,
                upvote: settings.upvote_reactions.iter().cloned().collect(),
                downvote: settings.downvote_reactions.iter().cloned().collect(),
            },
        })
    }
}

#[inline]
fn default_db() -> String {
    String::from("./db.sqlite3")
}

#[inline]
const fn default_max_points() -> u32 {
    6
}

#[inline]
const fn default_leaderboard_limit() -> u32 {
    10
}

#[inline]
const fn enabled() -> bool {
    true
}

#[inline]
fn default_upvotes() -> Vec<String> {
    vec![String::from("+1"), String::from("thumbsup")]
}

#[inline]
fn default_downvotes() -> Vec<String> {
    vec![String::from("-1"), String::from("thumbsdown")]
}

pub type ConfigResult<T> = core::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error(transparent)]
    EnvError(#[from] EnvErr),

    #[error("invalid alias group '{0}' (expected `user++alias1++alias2`)")]
    InvalidAlias(String),

    #[error("alias '{alias}' maps to both '{first}' and '{second}'")]
    ConflictingAlias {
        alias: String,
        first: String,
        second: String,
    },

    #[error("'{0}' is used both as a canonical name and as an alias")]
    AliasChain(String),

    #[error("max points must be at least 1")]
    InvalidMaxPoints,
}
