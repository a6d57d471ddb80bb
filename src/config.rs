/// config.rs – Load settings from config.yaml + environment variables.
///
/// Environment variables always override YAML values.
/// The API token is read exclusively from the environment / .env file.
use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Sub-configs
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BotConfig {
    pub log_level: String,
}

impl Default for BotConfig {
    fn default() -> Self {
        Self {
            log_level: "INFO".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct BackendConfig {
    /// Base URL of the bot backend, e.g. http://localhost:8080
    pub base_url: String,
    /// Per-request timeout for plain HTTP calls (not the event stream).
    pub request_timeout_seconds: f64,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8080".into(),
            request_timeout_seconds: 15.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Fixed delay before each reconnection attempt after a drop.
    pub reconnect_delay_seconds: f64,
    /// Log at WARN once this many consecutive attempts have failed.
    pub warn_after_failures: u32,
    /// Fan-out channel capacity for decoded trade events.
    pub channel_capacity: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            reconnect_delay_seconds: 5.0,
            warn_after_failures: 5,
            channel_capacity: 512,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct StatusConfig {
    /// How often (seconds) the main loop asks the status cache to refresh.
    /// The cache itself has no cadence of its own.
    pub refresh_interval_seconds: f64,
}

impl Default for StatusConfig {
    fn default() -> Self {
        Self {
            refresh_interval_seconds: 10.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Dashboard refresh rate in seconds.
    pub refresh_rate: f64,
    /// Entries shown in the recent-trades panel.
    pub recent_trades: usize,
    /// Seconds a trade notification stays visible.
    pub notice_ttl_seconds: f64,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            refresh_rate: 1.0,
            recent_trades: 10,
            notice_ttl_seconds: 5.0,
        }
    }
}

// ---------------------------------------------------------------------------
// Top-level settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Settings {
    pub bot: BotConfig,
    pub backend: BackendConfig,
    pub stream: StreamConfig,
    pub status: StatusConfig,
    pub dashboard: DashboardConfig,

    // API token – populated from env, not from YAML.
    #[serde(skip)]
    pub api_token: Option<String>,
}

impl Settings {
    /// Load settings from *config_path* YAML file, then overlay env vars.
    pub fn load(config_path: &str, base_url_override: Option<String>) -> Result<Self> {
        // Try to load .env file (ignore error if absent)
        let _ = dotenvy::dotenv();

        let mut settings = if std::path::Path::new(config_path).exists() {
            let yaml = std::fs::read_to_string(config_path).context("reading config file")?;
            serde_yaml::from_str::<Settings>(&yaml).context("parsing config YAML")?
        } else {
            Settings::default()
        };

        settings.api_token = std::env::var("BOT_API_TOKEN").ok();

        if let Ok(url) = std::env::var("BOT_BACKEND_URL") {
            settings.backend.base_url = url;
        }
        if let Some(url) = base_url_override {
            settings.backend.base_url = url;
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<()> {
        let url = self.backend.base_url.trim();
        if !url.starts_with("http://") && !url.starts_with("https://") {
            bail!("backend.base_url must start with http:// or https://");
        }
        validate_positive(
            "backend.request_timeout_seconds",
            self.backend.request_timeout_seconds,
        )?;
        validate_positive(
            "stream.reconnect_delay_seconds",
            self.stream.reconnect_delay_seconds,
        )?;
        validate_positive(
            "status.refresh_interval_seconds",
            self.status.refresh_interval_seconds,
        )?;
        validate_positive("dashboard.refresh_rate", self.dashboard.refresh_rate)?;
        validate_positive(
            "dashboard.notice_ttl_seconds",
            self.dashboard.notice_ttl_seconds,
        )?;
        if self.stream.warn_after_failures == 0 {
            bail!("stream.warn_after_failures must be > 0");
        }
        if self.stream.channel_capacity == 0 {
            bail!("stream.channel_capacity must be > 0");
        }
        if self.dashboard.recent_trades == 0 {
            bail!("dashboard.recent_trades must be > 0");
        }
        Ok(())
    }
}

fn validate_positive(name: &str, value: f64) -> Result<()> {
    if !value.is_finite() || value <= 0.0 {
        bail!("{name} must be a finite number > 0");
    }
    Ok(())
}

/// Seconds → whole milliseconds, clamped to at least 1 so sub-millisecond
/// (but valid) settings never produce a zero-period timer.
pub fn interval_millis(seconds: f64) -> u64 {
    ((seconds * 1000.0) as u64).max(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_pass_validation() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn validate_rejects_bad_base_url() {
        let mut settings = Settings::default();
        settings.backend.base_url = "localhost:8080".into();
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_reconnect_delay() {
        let mut settings = Settings::default();
        settings.stream.reconnect_delay_seconds = 0.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_recent_trades() {
        let mut settings = Settings::default();
        settings.dashboard.recent_trades = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn validate_rejects_zero_channel_capacity() {
        let mut settings = Settings::default();
        settings.stream.channel_capacity = 0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn interval_millis_never_returns_zero() {
        assert_eq!(interval_millis(1.0), 1000);
        assert_eq!(interval_millis(0.0005), 1);
        assert_eq!(interval_millis(0.25), 250);
    }

    #[test]
    fn yaml_overrides_defaults() {
        let yaml = "
backend:
  base_url: https://bot.example.com
dashboard:
  recent_trades: 25
";
        let settings: Settings = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(settings.backend.base_url, "https://bot.example.com");
        assert_eq!(settings.dashboard.recent_trades, 25);
        // Untouched sections keep defaults
        assert_eq!(settings.stream.reconnect_delay_seconds, 5.0);
    }
}
