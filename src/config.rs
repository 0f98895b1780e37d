use anyhow::{bail, Context as _, Result};
use std::{env, str::FromStr, time::Duration};

pub const DEFAULT_LOKI_URL: &str = "http://localhost:3100";
pub const DEFAULT_LOKI_SELECTOR: &str = r#"{job="zomboid",source="server"}"#;

#[derive(Debug, Clone)]
pub struct Config {
    pub discord_token: String,
    pub status_channel_id: u64,
    pub status_message_id: u64,
    pub loki_url: String,
    pub loki_selector: String,
    pub loki_timeout: Duration,
    pub poll_period: Duration,
    pub lookback: Duration,
    pub port: u16,
}

impl Config {
    /// Reads configuration from the environment, loading `.env` first if present.
    pub fn from_env() -> Result<Self> {
        let _ = dotenvy::dotenv();
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let discord_token = get("DISCORD_TOKEN").context("'DISCORD_TOKEN' not found")?;
        Ok(Self {
            discord_token,
            status_channel_id: discord_id(&get, "STATUS_CHANNEL_ID")?,
            status_message_id: discord_id(&get, "STATUS_MESSAGE_ID")?,
            loki_url: get("LOKI_URL").unwrap_or_else(|| DEFAULT_LOKI_URL.to_string()),
            loki_selector: get("LOKI_SELECTOR").unwrap_or_else(|| DEFAULT_LOKI_SELECTOR.to_string()),
            loki_timeout: Duration::from_secs(parse_or(&get, "LOKI_TIMEOUT_SECONDS", 10)?),
            poll_period: non_zero_secs(&get, "POLL_SECONDS", 30)?,
            lookback: Duration::from_secs(
                parse_or::<u64>(&get, "LOOKBACK_HOURS", 24)?
                    .checked_mul(3600)
                    .context("'LOOKBACK_HOURS' is too large")?,
            ),
            port: parse_or(&get, "PORT", 3000)?,
        })
    }
}

fn parse_or<T>(get: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match get(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .with_context(|| format!("'{key}' is not valid: {raw:?}")),
        None => Ok(default),
    }
}

fn non_zero_secs(get: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<Duration> {
    let secs: u64 = parse_or(get, key, default)?;
    if secs == 0 {
        bail!("'{key}' must be non-zero");
    }
    Ok(Duration::from_secs(secs))
}

fn discord_id(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<u64> {
    let raw = get(key).with_context(|| format!("'{key}' not found"))?;
    let id: u64 = raw
        .trim()
        .parse()
        .with_context(|| format!("'{key}' is not a snowflake: {raw:?}"))?;
    if id == 0 {
        bail!("'{key}' must be non-zero");
    }
    Ok(id)
}
