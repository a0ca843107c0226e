//! Configuration and settings management
//!
//! Loads settings from config files and environment variables and defines
//! the tuning constants used by the Telegram layer.

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;
use std::time::Duration;

/// Token value shipped in sample configs; the bot refuses to start with it.
const PLACEHOLDER_TOKEN: &str = "YOUR_BOT_TOKEN_HERE";

/// Application settings loaded from environment variables
#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Settings {
    /// Telegram Bot API token
    #[serde(default, alias = "bot_token")]
    pub telegram_token: String,

    /// Comma-separated list of allowed user IDs. Unset means everyone.
    #[serde(default, rename = "allowed_users")]
    pub allowed_users_str: Option<String>,

    /// Scratch directory for downloaded media
    #[serde(default = "default_downloads_dir")]
    pub downloads_dir: PathBuf,

    /// yt-dlp executable
    #[serde(default = "default_ytdlp_path")]
    pub ytdlp_path: String,

    /// ffmpeg executable
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Install ffmpeg at startup when it is missing
    #[serde(default = "default_true")]
    pub ffmpeg_auto_install: bool,

    /// Shell command used to install ffmpeg
    #[serde(default = "default_ffmpeg_install_command")]
    pub ffmpeg_install_command: String,

    /// Netscape cookies file handed to yt-dlp
    #[serde(default)]
    pub cookies_file: Option<PathBuf>,

    /// MP3 bitrate for audio extraction
    #[serde(default = "default_audio_bitrate_kbps")]
    pub audio_bitrate_kbps: u32,

    /// yt-dlp is killed after this many seconds
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,

    /// Extra attempts for transient yt-dlp failures
    #[serde(default = "default_download_retries")]
    pub download_retries: usize,

    /// Downloads running at the same time across all chats
    #[serde(default = "default_max_concurrent_downloads")]
    pub max_concurrent_downloads: usize,

    /// Largest file the bot will try to upload, in megabytes
    #[serde(default = "default_max_upload_mb")]
    pub max_upload_mb: u64,

    /// Lifetime of an unanswered download menu
    #[serde(default = "default_menu_ttl_secs")]
    pub menu_ttl_secs: u64,

    /// HTTP timeout of the bot client; bounds a single upload
    #[serde(default = "default_upload_timeout_secs")]
    pub upload_timeout_secs: u64,
}

fn default_downloads_dir() -> PathBuf {
    PathBuf::from("downloads")
}

fn default_ytdlp_path() -> String {
    "yt-dlp".to_string()
}

fn default_ffmpeg_path() -> String {
    "ffmpeg".to_string()
}

const fn default_true() -> bool {
    true
}

fn default_ffmpeg_install_command() -> String {
    "apt-get update && apt-get install -y ffmpeg".to_string()
}

const fn default_audio_bitrate_kbps() -> u32 {
    192
}

const fn default_download_timeout_secs() -> u64 {
    900
}

const fn default_download_retries() -> usize {
    1
}

const fn default_max_concurrent_downloads() -> usize {
    2
}

const fn default_max_upload_mb() -> u64 {
    50
}

const fn default_menu_ttl_secs() -> u64 {
    3600
}

const fn default_upload_timeout_secs() -> u64 {
    600
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            telegram_token: String::new(),
            allowed_users_str: None,
            downloads_dir: default_downloads_dir(),
            ytdlp_path: default_ytdlp_path(),
            ffmpeg_path: default_ffmpeg_path(),
            ffmpeg_auto_install: default_true(),
            ffmpeg_install_command: default_ffmpeg_install_command(),
            cookies_file: None,
            audio_bitrate_kbps: default_audio_bitrate_kbps(),
            download_timeout_secs: default_download_timeout_secs(),
            download_retries: default_download_retries(),
            max_concurrent_downloads: default_max_concurrent_downloads(),
            max_upload_mb: default_max_upload_mb(),
            menu_ttl_secs: default_menu_ttl_secs(),
            upload_timeout_secs: default_upload_timeout_secs(),
        }
    }
}

impl Settings {
    /// Create new settings by loading from environment and files
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use tubegrab_bot::config::Settings;
    ///
    /// let settings = Settings::new().expect("Failed to load configuration");
    /// ```
    ///
    /// # Errors
    ///
    /// Returns a `ConfigError` if loading fails or the token is unusable.
    pub fn new() -> Result<Self, ConfigError> {
        let run_mode = std::env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = Config::builder()
            .add_source(File::with_name("config/default").required(false))
            .add_source(File::with_name(&format!("config/{run_mode}")).required(false))
            // Not checked into git
            .add_source(File::with_name("config/local").required(false))
            // Eg.. `APP__MAX_UPLOAD_MB=20 ./tubegrab-bot`
            .add_source(Environment::with_prefix("APP").separator("__"))
            // Plain UPPER_SNAKE_CASE variables, empty ones treated as unset
            .add_source(Environment::default().ignore_empty(true))
            .build()?;

        let settings: Self = s.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check values that would make the bot unusable.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Message` describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let token = self.telegram_token.trim();
        if token.is_empty() {
            return Err(ConfigError::Message(
                "TELEGRAM_TOKEN is not set".to_string(),
            ));
        }
        if token == PLACEHOLDER_TOKEN {
            return Err(ConfigError::Message(format!(
                "TELEGRAM_TOKEN still holds the placeholder '{PLACEHOLDER_TOKEN}'"
            )));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(ConfigError::Message(
                "MAX_CONCURRENT_DOWNLOADS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Returns the set of Telegram IDs allowed to use the bot.
    ///
    /// `None` means the bot is open to everyone.
    #[must_use]
    pub fn allowed_users(&self) -> Option<HashSet<i64>> {
        let raw = self.allowed_users_str.as_ref()?;
        let ids: HashSet<i64> = raw
            .split(|c: char| c == ',' || c == ';' || c.is_whitespace())
            .filter(|token| !token.is_empty())
            .filter_map(|id| id.parse::<i64>().ok())
            .collect();
        Some(ids)
    }

    /// Whether the given user may use the bot
    #[must_use]
    pub fn is_allowed(&self, user_id: i64) -> bool {
        self.allowed_users()
            .is_none_or(|allowed| allowed.contains(&user_id))
    }

    /// Upload ceiling in bytes
    #[must_use]
    pub const fn max_upload_bytes(&self) -> u64 {
        self.max_upload_mb * 1024 * 1024
    }

    /// yt-dlp timeout as a `Duration`
    #[must_use]
    pub const fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs)
    }

    /// Menu lifetime as a `Duration`
    #[must_use]
    pub const fn menu_ttl(&self) -> Duration {
        Duration::from_secs(self.menu_ttl_secs)
    }

    /// Bot client timeout as a `Duration`
    #[must_use]
    pub const fn upload_timeout(&self) -> Duration {
        Duration::from_secs(self.upload_timeout_secs)
    }
}

// Telegram API retry configuration
/// Retries after the first attempt of a Telegram API call
pub const TELEGRAM_API_MAX_RETRIES: usize = 3;
/// First backoff delay in milliseconds
pub const TELEGRAM_API_INITIAL_BACKOFF_MS: u64 = 500;
/// Backoff ceiling in milliseconds
pub const TELEGRAM_API_MAX_BACKOFF_MS: u64 = 4000;

// yt-dlp retry configuration
/// First backoff delay between yt-dlp attempts in milliseconds
pub const DOWNLOAD_INITIAL_BACKOFF_MS: u64 = 2000;
/// yt-dlp backoff ceiling in milliseconds
pub const DOWNLOAD_MAX_BACKOFF_MS: u64 = 15_000;

/// Files left in the downloads directory longer than this are purged at startup
pub const STALE_DOWNLOAD_AGE_SECS: u64 = 6 * 3600;

/// Cooldown period (seconds) between "Access Denied" messages for same user.
/// Default: 20 minutes.
pub const UNAUTHORIZED_COOLDOWN_SECS: u64 = 1200;
/// Time-to-live (seconds) for cache entries.
/// Default: 2 hours.
pub const UNAUTHORIZED_CACHE_TTL_SECS: u64 = 7200;
/// Maximum cache capacity (number of entries).
pub const UNAUTHORIZED_CACHE_MAX_SIZE: u64 = 10_000;

/// Get unauthorized cooldown from env or default.
///
/// Environment variable: `UNAUTHORIZED_COOLDOWN_SECS`.
#[must_use]
pub fn get_unauthorized_cooldown() -> u64 {
    env_u64("UNAUTHORIZED_COOLDOWN_SECS", UNAUTHORIZED_COOLDOWN_SECS)
}

/// Get unauthorized cache TTL from env or default.
///
/// Environment variable: `UNAUTHORIZED_CACHE_TTL_SECS`.
#[must_use]
pub fn get_unauthorized_cache_ttl() -> u64 {
    env_u64("UNAUTHORIZED_CACHE_TTL_SECS", UNAUTHORIZED_CACHE_TTL_SECS)
}

/// Get unauthorized cache max size from env or default.
///
/// Environment variable: `UNAUTHORIZED_CACHE_MAX_SIZE`.
#[must_use]
pub fn get_unauthorized_cache_max_size() -> u64 {
    env_u64("UNAUTHORIZED_CACHE_MAX_SIZE", UNAUTHORIZED_CACHE_MAX_SIZE)
}

fn env_u64(name: &str, default: u64) -> u64 {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::env;

    // Single test touching the environment to avoid races between tests
    #[test]
    fn test_config_env_loading() -> Result<(), Box<dyn std::error::Error>> {
        env::set_var("TELEGRAM_TOKEN", "123456789:dummy_token");
        env::set_var("MAX_UPLOAD_MB", "20");
        env::set_var("COOKIES_FILE", "");

        let settings = Settings::new()?;
        assert_eq!(settings.telegram_token, "123456789:dummy_token");
        assert_eq!(settings.max_upload_mb, 20);
        assert_eq!(settings.max_upload_bytes(), 20 * 1024 * 1024);
        // Empty variables are ignored
        assert_eq!(settings.cookies_file, None);
        assert_eq!(settings.audio_bitrate_kbps, 192);
        assert_eq!(settings.upload_timeout(), Duration::from_secs(600));

        env::remove_var("MAX_UPLOAD_MB");
        env::remove_var("COOKIES_FILE");

        env::set_var("TELEGRAM_TOKEN", PLACEHOLDER_TOKEN);
        assert!(Settings::new().is_err());

        env::remove_var("TELEGRAM_TOKEN");
        Ok(())
    }

    #[test]
    fn test_validate_rejects_empty_token() {
        let settings = Settings::default();
        assert!(settings.validate().is_err());

        let settings = Settings {
            telegram_token: "  ".to_string(),
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let settings = Settings {
            telegram_token: "1:abc".to_string(),
            max_concurrent_downloads: 0,
            ..Settings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_list_parsing() {
        let mut settings = Settings::default();

        // Unset means open bot
        assert!(settings.allowed_users().is_none());
        assert!(settings.is_allowed(42));

        settings.allowed_users_str = Some("123,456".to_string());
        let allowed = settings.allowed_users().unwrap_or_default();
        assert!(allowed.contains(&123));
        assert!(allowed.contains(&456));
        assert_eq!(allowed.len(), 2);

        settings.allowed_users_str = Some("333; 444 555".to_string());
        let allowed = settings.allowed_users().unwrap_or_default();
        assert_eq!(allowed.len(), 3);
        assert!(settings.is_allowed(444));
        assert!(!settings.is_allowed(42));

        settings.allowed_users_str = Some("abc, 777".to_string());
        let allowed = settings.allowed_users().unwrap_or_default();
        assert!(allowed.contains(&777));
        assert_eq!(allowed.len(), 1);
    }
}
