use crate::schema::Category;
use anyhow::{Context, bail};
use std::collections::HashMap;
use std::time::Duration;

/// Process configuration, read once at startup. The category map is validated
/// here rather than resolved ad hoc per message, so a bad mapping fails the
/// boot instead of a citizen's submission.
#[derive(Debug, Clone)]
pub struct Config {
    pub db_path: String,
    pub daily_limit: i64,
    pub reminder_days: i64,
    pub reminder_schedule: String,
    pub timezone: chrono_tz::Tz,
    pub default_channel: i64,
    pub channel_map: HashMap<Category, i64>,
    pub placeholder_image: Option<String>,
    pub bot_user_id: i64,
    pub gateway_timeout: Duration,
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

impl Config {
    pub fn from_env() -> anyhow::Result<Config> {
        let default_channel: i64 = std::env::var("ARIZA_DEFAULT_CHANNEL")
            .context("ARIZA_DEFAULT_CHANNEL not set")?
            .parse()
            .context("ARIZA_DEFAULT_CHANNEL is not a channel id")?;

        let bot_user_id: i64 = std::env::var("ARIZA_BOT_USER_ID")
            .context("ARIZA_BOT_USER_ID not set")?
            .parse()
            .context("ARIZA_BOT_USER_ID is not a user id")?;

        let channel_map = match std::env::var("ARIZA_CHANNEL_MAP") {
            Ok(raw) => parse_channel_map(&raw)?,
            Err(_) => HashMap::new(),
        };

        let timezone: chrono_tz::Tz = std::env::var("ARIZA_TIMEZONE")
            .unwrap_or_else(|_| "Asia/Tashkent".to_string())
            .parse()
            .map_err(|e| anyhow::anyhow!("invalid ARIZA_TIMEZONE: {e}"))?;

        Ok(Config {
            db_path: std::env::var("ARIZA_DB_PATH").unwrap_or_else(|_| "ariza.db".to_string()),
            daily_limit: env_parse("ARIZA_DAILY_LIMIT").unwrap_or(5),
            reminder_days: env_parse("ARIZA_REMINDER_DAYS").unwrap_or(15),
            reminder_schedule: std::env::var("ARIZA_REMINDER_SCHEDULE")
                .unwrap_or_else(|_| "0 10 * * *".to_string()),
            timezone,
            default_channel,
            channel_map,
            placeholder_image: std::env::var("ARIZA_PLACEHOLDER_IMAGE").ok(),
            bot_user_id,
            gateway_timeout: Duration::from_millis(
                env_parse("ARIZA_GATEWAY_TIMEOUT_MS").unwrap_or(10_000),
            ),
        })
    }

    /// Destination staff channel for a category, falling back to the default
    /// channel for unmapped categories.
    pub fn channel_for(&self, category: Category) -> i64 {
        self.channel_map
            .get(&category)
            .copied()
            .unwrap_or(self.default_channel)
    }

    /// Every distinct destination channel in use, default included.
    pub fn staff_channels(&self) -> Vec<i64> {
        let mut channels: Vec<i64> = self.channel_map.values().copied().collect();
        channels.push(self.default_channel);
        channels.sort_unstable();
        channels.dedup();
        channels
    }

    pub fn is_staff_channel(&self, channel_id: i64) -> bool {
        self.staff_channels().contains(&channel_id)
    }
}

/// Parses `health=-1001,transport=-1002` into a category map. Unknown
/// category slugs are a startup error, not a silent fallback.
fn parse_channel_map(raw: &str) -> anyhow::Result<HashMap<Category, i64>> {
    let mut map = HashMap::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let Some((slug, channel)) = entry.split_once('=') else {
            bail!("malformed channel map entry `{entry}`, expected category=channel_id");
        };
        let Some(category) = Category::from_slug(slug.trim()) else {
            bail!("unknown category `{}` in channel map", slug.trim());
        };
        let channel_id: i64 = channel
            .trim()
            .parse()
            .with_context(|| format!("invalid channel id for category `{}`", slug.trim()))?;
        if map.insert(category, channel_id).is_some() {
            bail!("duplicate channel map entry for category `{}`", slug.trim());
        }
    }
    Ok(map)
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;

    /// Baseline test config: two mapped categories, everything else routed to
    /// the default channel.
    pub fn config() -> Config {
        let mut channel_map = HashMap::new();
        channel_map.insert(Category::Health, -2001);
        channel_map.insert(Category::Education, -2002);
        Config {
            db_path: ":memory:".to_string(),
            daily_limit: 5,
            reminder_days: 15,
            reminder_schedule: "0 10 * * *".to_string(),
            timezone: chrono_tz::Asia::Tashkent,
            default_channel: -2000,
            channel_map,
            placeholder_image: None,
            bot_user_id: 999_000,
            gateway_timeout: Duration::from_millis(500),
        }
    }
}
