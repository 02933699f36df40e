use crate::error::AppError;
use crate::logging::{LoggerConfig, LoggerFormat};
use crate::reminder::ReminderSettings;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration as StdDuration;
use time::macros::format_description;
use time::{Duration, UtcOffset};

const CONFIG_FILE_NAME: &str = "config.json";
const CONFIG_ENV_VAR: &str = "TASKZEN_CONFIG_PATH";
const BOT_TOKEN_ENV_VAR: &str = "TELEGRAM_BOT_TOKEN";
const CHAT_ID_ENV_VAR: &str = "TELEGRAM_CHAT_ID";
const CRON_SECRET_ENV_VAR: &str = "CRON_SECRET";
const LOG_ENV_VAR: &str = "TASKZEN_LOG";
/// One leap year.
const MAX_DUE_SOON_WINDOW_HOURS: u32 = 24 * 366;

pub const DEFAULT_TELEGRAM_API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReminderConfig {
    pub due_soon_window_hours: u32,
    pub same_day_exclusion: bool,
    pub imminent_windows_minutes: Vec<u32>,
    pub imminent_band_minutes: u32,
    pub recurring_hour: u8,
    pub poll_interval_secs: u64,
    pub dispatch_timeout_secs: u64,
    pub max_in_flight: usize,
    /// `+HH:MM`, `utc`, or unset for the host's local offset.
    pub utc_offset: Option<String>,
    /// Directory for the cross-process dedup record; in-memory when unset.
    pub dedup_dir: Option<PathBuf>,
}

impl Default for ReminderConfig {
    fn default() -> Self {
        Self {
            due_soon_window_hours: 24,
            same_day_exclusion: true,
            imminent_windows_minutes: vec![30, 10],
            imminent_band_minutes: 5,
            recurring_hour: 19,
            poll_interval_secs: 60,
            dispatch_timeout_secs: 10,
            max_in_flight: 4,
            utc_offset: None,
            dedup_dir: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramConfig {
    pub bot_token: Option<String>,
    pub chat_id: Option<String>,
    pub api_base: String,
}

impl Default for TelegramConfig {
    fn default() -> Self {
        Self {
            bot_token: None,
            chat_id: None,
            api_base: DEFAULT_TELEGRAM_API_BASE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind: String,
    pub cron_secret: Option<String>,
    /// Run the in-process timer loop alongside the HTTP trigger.
    pub timer: bool,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8080".to_string(),
            cron_secret: None,
            timer: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    pub level: String,
    pub format: String,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "text".to_string(),
        }
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub reminders: ReminderConfig,
    pub telegram: TelegramConfig,
    pub server: ServerConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone)]
pub struct ConfigLoad {
    pub config: Config,
    pub error: Option<AppError>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ConfigOverrides {
    pub due_soon_window_hours: Option<u32>,
    pub imminent_windows_minutes: Option<Vec<u32>>,
    pub recurring_hour: Option<u8>,
    pub poll_interval_secs: Option<u64>,
    pub utc_offset: Option<String>,
    pub dedup_dir: Option<PathBuf>,
    pub bind: Option<String>,
    pub log_level: Option<String>,
    pub log_format: Option<String>,
}

pub fn config_path() -> Result<PathBuf, AppError> {
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR)
        && !path.trim().is_empty()
    {
        return Ok(PathBuf::from(path));
    }

    if cfg!(windows) {
        let appdata =
            std::env::var("APPDATA").map_err(|_| AppError::invalid_data("APPDATA is not set"))?;
        Ok(PathBuf::from(appdata)
            .join("taskzen")
            .join(CONFIG_FILE_NAME))
    } else {
        let home = std::env::var("HOME").map_err(|_| AppError::invalid_data("HOME is not set"))?;
        Ok(PathBuf::from(home)
            .join(".config")
            .join("taskzen")
            .join(CONFIG_FILE_NAME))
    }
}

pub fn load_config() -> Result<Config, AppError> {
    let path = config_path()?;
    load_config_from_path(&path)
}

pub fn load_config_with_fallback() -> ConfigLoad {
    match config_path() {
        Ok(path) => load_config_with_fallback_from_path(&path),
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_with_fallback_from_path(path: &Path) -> ConfigLoad {
    if !path.exists() {
        return ConfigLoad {
            config: Config::default(),
            error: None,
        };
    }

    match load_config_from_path(path) {
        Ok(config) => ConfigLoad {
            config,
            error: None,
        },
        Err(err) => ConfigLoad {
            config: Config::default(),
            error: Some(err),
        },
    }
}

fn load_config_from_path(path: &Path) -> Result<Config, AppError> {
    let content = std::fs::read_to_string(path)
        .map_err(|err| AppError::io(format!("{}: {}", path.display(), err)))?;
    serde_json::from_str(&content).map_err(|err| {
        AppError::invalid_data(format!("invalid JSON in {}: {}", path.display(), err))
    })
}

/// Secrets come from the environment when present; the file value is the fallback.
pub fn apply_env(config: Config) -> Config {
    apply_env_with(config, |key| std::env::var(key).ok())
}

fn apply_env_with<F>(mut config: Config, lookup: F) -> Config
where
    F: Fn(&str) -> Option<String>,
{
    let non_blank = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

    if let Some(token) = non_blank(BOT_TOKEN_ENV_VAR) {
        config.telegram.bot_token = Some(token);
    }
    if let Some(chat_id) = non_blank(CHAT_ID_ENV_VAR) {
        config.telegram.chat_id = Some(chat_id);
    }
    if let Some(secret) = non_blank(CRON_SECRET_ENV_VAR) {
        config.server.cron_secret = Some(secret);
    }
    if let Some(level) = non_blank(LOG_ENV_VAR) {
        config.log.level = level;
    }
    config
}

pub fn merge_overrides(base: &Config, overrides: &ConfigOverrides) -> Config {
    let mut merged = base.clone();
    let reminders = &mut merged.reminders;

    if let Some(hours) = overrides.due_soon_window_hours {
        reminders.due_soon_window_hours = hours;
    }
    if let Some(windows) = overrides.imminent_windows_minutes.as_ref() {
        reminders.imminent_windows_minutes = windows.clone();
    }
    if let Some(hour) = overrides.recurring_hour {
        reminders.recurring_hour = hour;
    }
    if let Some(secs) = overrides.poll_interval_secs {
        reminders.poll_interval_secs = secs;
    }
    if let Some(offset) = overrides.utc_offset.as_ref() {
        reminders.utc_offset = Some(offset.clone());
    }
    if let Some(dir) = overrides.dedup_dir.as_ref() {
        reminders.dedup_dir = Some(dir.clone());
    }
    if let Some(bind) = overrides.bind.as_ref() {
        merged.server.bind = bind.clone();
    }
    if let Some(level) = overrides.log_level.as_ref() {
        merged.log.level = level.clone();
    }
    if let Some(format) = overrides.log_format.as_ref() {
        merged.log.format = format.clone();
    }

    merged
}

pub fn parse_utc_offset(raw: Option<&str>) -> Result<UtcOffset, AppError> {
    let value = match raw.map(str::trim) {
        None | Some("") => return Ok(local_offset()),
        Some(value) => value,
    };

    if value.eq_ignore_ascii_case("local") {
        return Ok(local_offset());
    }
    if value.eq_ignore_ascii_case("utc") || value == "Z" {
        return Ok(UtcOffset::UTC);
    }

    UtcOffset::parse(
        value,
        format_description!("[offset_hour sign:mandatory]:[offset_minute]"),
    )
    .map_err(|_| AppError::config(format!("utc_offset must look like +HH:MM, got '{value}'")))
}

pub fn local_offset() -> UtcOffset {
    UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC)
}

impl Config {
    pub fn reminder_settings(&self) -> Result<ReminderSettings, AppError> {
        let reminders = &self.reminders;

        if reminders.due_soon_window_hours == 0
            || reminders.due_soon_window_hours > MAX_DUE_SOON_WINDOW_HOURS
        {
            return Err(AppError::config(format!(
                "due_soon_window_hours must be between 1 and {MAX_DUE_SOON_WINDOW_HOURS}"
            )));
        }
        if reminders.imminent_band_minutes == 0 {
            return Err(AppError::config("imminent_band_minutes must be positive"));
        }
        if reminders.imminent_windows_minutes.contains(&0) {
            return Err(AppError::config("imminent windows must be positive"));
        }
        if reminders.recurring_hour > 23 {
            return Err(AppError::config("recurring_hour must be between 0 and 23"));
        }

        let mut windows = reminders.imminent_windows_minutes.clone();
        windows.sort_unstable_by(|a, b| b.cmp(a));
        windows.dedup();

        Ok(ReminderSettings {
            due_soon_window: Duration::hours(i64::from(reminders.due_soon_window_hours)),
            same_day_exclusion: reminders.same_day_exclusion,
            imminent_windows: windows,
            imminent_band: reminders.imminent_band_minutes,
            recurring_hour: reminders.recurring_hour,
        })
    }

    pub fn utc_offset(&self) -> Result<UtcOffset, AppError> {
        parse_utc_offset(self.reminders.utc_offset.as_deref())
    }

    pub fn poll_interval(&self) -> Result<StdDuration, AppError> {
        if self.reminders.poll_interval_secs == 0 {
            return Err(AppError::config("poll_interval_secs must be positive"));
        }
        Ok(StdDuration::from_secs(self.reminders.poll_interval_secs))
    }

    pub fn dispatch_timeout(&self) -> StdDuration {
        StdDuration::from_secs(self.reminders.dispatch_timeout_secs.max(1))
    }

    pub fn logger_config(&self) -> Result<LoggerConfig, AppError> {
        let format: LoggerFormat = self
            .log
            .format
            .parse()
            .map_err(|err: crate::logging::LoggerError| AppError::config(err.to_string()))?;
        Ok(LoggerConfig {
            format,
            level: self.log.level.clone(),
            ..LoggerConfig::default()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        Config, ConfigOverrides, MAX_DUE_SOON_WINDOW_HOURS, apply_env_with, load_config_from_path,
        load_config_with_fallback_from_path, merge_overrides, parse_utc_offset,
    };
    use crate::test_support::temp_path;
    use std::fs;
    use time::{Duration, UtcOffset};

    #[test]
    fn load_config_missing_returns_defaults_without_error() {
        let path = temp_path("missing-config.json");
        let result = load_config_with_fallback_from_path(&path);

        assert_eq!(result.config, Config::default());
        assert!(result.error.is_none());
    }

    #[test]
    fn load_config_invalid_returns_defaults_and_error() {
        let path = temp_path("invalid-config.json");
        fs::write(&path, "{ invalid json ").unwrap();

        let result = load_config_with_fallback_from_path(&path);
        fs::remove_file(&path).ok();

        assert_eq!(result.config, Config::default());
        assert_eq!(result.error.map(|err| err.code()), Some("invalid_data"));
    }

    #[test]
    fn load_config_reads_partial_file() {
        let path = temp_path("valid-config.json");
        let content = serde_json::json!({
            "reminders": {
                "recurring_hour": 20,
                "imminent_windows_minutes": [15]
            },
            "server": { "cron_secret": "s3cret" }
        });
        fs::write(&path, serde_json::to_string(&content).unwrap()).unwrap();

        let loaded = load_config_from_path(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(loaded.reminders.recurring_hour, 20);
        assert_eq!(loaded.reminders.imminent_windows_minutes, vec![15]);
        assert_eq!(loaded.reminders.due_soon_window_hours, 24);
        assert_eq!(loaded.server.cron_secret.as_deref(), Some("s3cret"));
        assert_eq!(loaded.server.bind, "127.0.0.1:8080");
    }

    #[test]
    fn env_credentials_take_precedence_over_file() {
        let mut base = Config::default();
        base.telegram.bot_token = Some("file-token".into());
        base.server.cron_secret = Some("file-secret".into());

        let merged = apply_env_with(base, |key| match key {
            "TELEGRAM_BOT_TOKEN" => Some("env-token".into()),
            "TELEGRAM_CHAT_ID" => Some("42".into()),
            "CRON_SECRET" => Some("   ".into()),
            _ => None,
        });

        assert_eq!(merged.telegram.bot_token.as_deref(), Some("env-token"));
        assert_eq!(merged.telegram.chat_id.as_deref(), Some("42"));
        assert_eq!(merged.server.cron_secret.as_deref(), Some("file-secret"));
    }

    #[test]
    fn merge_overrides_updates_selected_fields() {
        let base = Config::default();
        let overrides = ConfigOverrides {
            recurring_hour: Some(21),
            imminent_windows_minutes: Some(vec![60, 15]),
            bind: Some("0.0.0.0:9000".into()),
            ..ConfigOverrides::default()
        };

        let merged = merge_overrides(&base, &overrides);

        assert_eq!(merged.reminders.recurring_hour, 21);
        assert_eq!(merged.reminders.imminent_windows_minutes, vec![60, 15]);
        assert_eq!(merged.server.bind, "0.0.0.0:9000");
        assert_eq!(base.reminders.recurring_hour, 19);
    }

    #[test]
    fn merge_overrides_with_empty_overrides_returns_clone() {
        let base = Config::default();
        let merged = merge_overrides(&base, &ConfigOverrides::default());

        assert_eq!(merged, base);
    }

    #[test]
    fn reminder_settings_sorts_and_dedups_windows() {
        let mut config = Config::default();
        config.reminders.imminent_windows_minutes = vec![10, 30, 10];

        let settings = config.reminder_settings().unwrap();

        assert_eq!(settings.imminent_windows, vec![30, 10]);
        assert_eq!(settings.due_soon_window, Duration::hours(24));
        assert_eq!(settings.recurring_hour, 19);
    }

    #[test]
    fn reminder_settings_rejects_bad_hour() {
        let mut config = Config::default();
        config.reminders.recurring_hour = 24;

        let err = config.reminder_settings().unwrap_err();
        assert_eq!(err.code(), "config_error");
    }

    #[test]
    fn reminder_settings_rejects_huge_due_soon_window() {
        let mut config = Config::default();
        config.reminders.due_soon_window_hours = 200_000_000;

        let err = config.reminder_settings().unwrap_err();
        assert_eq!(err.code(), "config_error");

        config.reminders.due_soon_window_hours = MAX_DUE_SOON_WINDOW_HOURS;
        assert!(config.reminder_settings().is_ok());
    }

    #[test]
    fn parse_utc_offset_accepts_variants() {
        assert_eq!(parse_utc_offset(Some("utc")).unwrap(), UtcOffset::UTC);
        assert_eq!(
            parse_utc_offset(Some("+02:00")).unwrap(),
            UtcOffset::from_hms(2, 0, 0).unwrap()
        );
        assert_eq!(
            parse_utc_offset(Some("-05:30")).unwrap(),
            UtcOffset::from_hms(-5, -30, 0).unwrap()
        );
        assert!(parse_utc_offset(Some("noon")).is_err());
    }
}
