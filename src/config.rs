use std::env;
use std::str::FromStr;

// A reading older than a day says nothing about the air right now
const MAX_CACHE_TTL_SECS: u64 = 86_400;
const MAX_TIMEOUT_SECS: u64 = 3_600;

#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub sensor_id: String,
    pub purpleair_base_url: String,
    pub telegram_api_url: String,
    pub cache_ttl_secs: u64,
    pub http_timeout_secs: u64,
    pub poll_timeout_secs: u64,
    pub http_bind_addr: String,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds a config from an arbitrary key lookup so tests don't touch the process env.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Ok(Config {
            bot_token: required(&lookup, "PURPLEAIR_BOT_TOKEN")?,
            sensor_id: required(&lookup, "PURPLEAIR_SENSOR_ID")?,
            purpleair_base_url: lookup("PURPLEAIR_BASE_URL")
                .unwrap_or_else(|| "https://www.purpleair.com/json".to_string()),
            telegram_api_url: lookup("TELEGRAM_API_URL")
                .unwrap_or_else(|| "https://api.telegram.org".to_string()),
            cache_ttl_secs: bounded(&lookup, "CACHE_TTL_SECS", 120, MAX_CACHE_TTL_SECS)?,
            http_timeout_secs: bounded(&lookup, "HTTP_TIMEOUT_SECS", 10, MAX_TIMEOUT_SECS)?,
            poll_timeout_secs: bounded(&lookup, "POLL_TIMEOUT_SECS", 10, MAX_TIMEOUT_SECS)?,
            http_bind_addr: lookup("HTTP_BIND_ADDR")
                .unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        })
    }

    pub fn cache_ttl(&self) -> chrono::Duration {
        let secs = self.cache_ttl_secs.min(MAX_CACHE_TTL_SECS);
        chrono::Duration::seconds(i64::try_from(secs).unwrap_or(0))
    }
}

fn required<F>(lookup: &F, key: &str) -> anyhow::Result<String>
where
    F: Fn(&str) -> Option<String>,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => Ok(value.trim().to_string()),
        _ => Err(anyhow::anyhow!("{} not set", key)),
    }
}

fn parsed<F, T>(lookup: &F, key: &str, default: T) -> anyhow::Result<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("{} is not a valid number: {}", key, raw)),
        None => Ok(default),
    }
}

fn bounded<F>(lookup: &F, key: &str, default: u64, max: u64) -> anyhow::Result<u64>
where
    F: Fn(&str) -> Option<String>,
{
    let value: u64 = parsed(lookup, key, default)?;
    if value > max {
        anyhow::bail!("{} must be at most {}, got {}", key, max, value);
    }
    Ok(value)
}
