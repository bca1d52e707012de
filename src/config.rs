use chrono::{Duration, FixedOffset};
use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct Settings {
    pub database: DatabaseSettings,
    pub engine: EngineSettings,
    pub application: ApplicationSettings,
}

#[derive(Debug, Deserialize)]
pub struct DatabaseSettings {
    pub url: String,
    pub pool_size: u32,
}

/// Knobs for the payment engine.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineSettings {
    /// Fixed business timezone, minutes east of UTC. Same-day and
    /// today-or-yesterday checks are evaluated in this timezone.
    pub business_tz_offset_minutes: i32,
    /// Grace period for fully reversing an installment's payments.
    pub reset_window_hours: i64,
    /// Statement timeout for waterfall transactions, which may touch many
    /// installment rows.
    pub waterfall_timeout_secs: u64,
}

impl EngineSettings {
    pub fn business_offset(&self) -> FixedOffset {
        FixedOffset::east_opt(self.business_tz_offset_minutes * 60)
            .expect("offset out of range")
    }

    pub fn reset_window(&self) -> Duration {
        Duration::hours(self.reset_window_hours)
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            business_tz_offset_minutes: -240,
            reset_window_hours: 24,
            waterfall_timeout_secs: 30,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ApplicationSettings {
    pub log_level: String,
}

impl Settings {
    pub fn new() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            .add_source(config::File::with_name("config/local").required(false))
            .add_source(config::Environment::with_prefix("APP").separator("__"));

        builder.build()?.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_business_offset() {
        let settings = EngineSettings {
            business_tz_offset_minutes: -240,
            ..EngineSettings::default()
        };
        assert_eq!(settings.business_offset().local_minus_utc(), -240 * 60);
    }

    #[test]
    fn test_reset_window() {
        let settings = EngineSettings::default();
        assert_eq!(settings.reset_window(), Duration::hours(24));
    }
}
