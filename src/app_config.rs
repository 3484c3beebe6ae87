// Runtime configuration, read from the environment (and `.env` via dotenv).

use crate::core::antinuke::WhitelistPolicy;
use anyhow::{anyhow, Context as _, Result};
use std::path::PathBuf;

const DEFAULT_DATA_DIR: &str = "data";
const DEFAULT_LOG_CHANNEL_NAME: &str = "server-logs";
const DEFAULT_ATTRIBUTION_MAX_AGE_SECS: u64 = 30;
const DEFAULT_PRUNE_INTERVAL_SECS: u64 = 60;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub discord_token: String,
    /// Folder holding the SQLite database.
    pub data_dir: PathBuf,
    /// Channel looked up (or created) when a guild has no log channel set.
    pub log_channel_name: String,
    pub whitelist_policy: WhitelistPolicy,
    /// Audit entries older than this are not used for attribution.
    pub attribution_max_age_secs: u64,
    pub prune_interval_secs: u64,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let discord_token = lookup("DISCORD_TOKEN").ok_or_else(|| {
            anyhow!("Missing DISCORD_TOKEN environment variable! Create a .env file with your bot token.")
        })?;

        let whitelist_policy = match lookup("ANTINUKE_WHITELIST_POLICY") {
            Some(raw) => raw
                .parse::<WhitelistPolicy>()
                .map_err(|e| anyhow!(e))
                .context("ANTINUKE_WHITELIST_POLICY must be `record` or `skip`")?,
            None => WhitelistPolicy::default(),
        };

        Ok(Self {
            discord_token,
            data_dir: lookup("ANTINUKE_DATA_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR)),
            log_channel_name: lookup("ANTINUKE_LOG_CHANNEL_NAME")
                .unwrap_or_else(|| DEFAULT_LOG_CHANNEL_NAME.to_string()),
            whitelist_policy,
            attribution_max_age_secs: parse_secs(
                &lookup,
                "ANTINUKE_ATTRIBUTION_MAX_AGE_SECS",
                DEFAULT_ATTRIBUTION_MAX_AGE_SECS,
            )?,
            prune_interval_secs: parse_secs(
                &lookup,
                "ANTINUKE_PRUNE_INTERVAL_SECS",
                DEFAULT_PRUNE_INTERVAL_SECS,
            )?,
        })
    }

    pub fn database_url(&self) -> String {
        format!("sqlite://{}?mode=rwc", self.data_dir.join("antinuke.db").display())
    }

    pub fn attribution_max_age(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.attribution_max_age_secs.min(u32::MAX as u64) as i64)
    }
}

fn parse_secs(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{} must be a whole number of seconds", key)),
        None => Ok(default),
    }
}
