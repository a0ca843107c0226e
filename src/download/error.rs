//! Download failures and classification of yt-dlp output.

use thiserror::Error;

/// Patterns indicating the video can never be fetched, retrying is pointless
const UNAVAILABLE_PATTERNS: &[&str] = &[
    "Video unavailable",
    "Private video",
    "This video is not available",
    "Sign in to confirm your age",
    "age-restricted",
    "members-only",
    "This video is private",
    "removed by the uploader",
    "no longer available",
    "blocked it in your country",
    "geo-restricted",
    "who has blocked it on copyright grounds",
    "copyright claim",
    "terminated account",
    "This video has been removed",
    "Unsupported URL",
    "is not a valid URL",
    "Unable to extract video data",
    "Premieres in",
    "This live event will begin",
    "Join this channel to get access",
    "HTTP Error 403",
    "HTTP Error 404",
    "Sign in to view this video",
];

/// Patterns indicating transient errors that might be resolved with retry
const TRANSIENT_PATTERNS: &[&str] = &[
    "Connection reset",
    "Connection timed out",
    "Unable to download webpage",
    "HTTP Error 429",
    "HTTP Error 500",
    "HTTP Error 502",
    "HTTP Error 503",
    "Read timed out",
    "network is unreachable",
    "Temporary failure in name resolution",
    "IncompleteRead",
];

/// Everything that can go wrong between a button press and a file on disk
#[derive(Debug, Error)]
pub enum DownloadError {
    /// The extractor says the media cannot be fetched
    #[error("video is unavailable: {0}")]
    Unavailable(String),
    /// Network-level failure, worth another attempt
    #[error("temporary network problem: {0}")]
    Transient(String),
    /// Any other non-zero exit
    #[error("yt-dlp failed: {0}")]
    Failed(String),
    /// yt-dlp exceeded the configured timeout and was killed
    #[error("download did not finish within {0} seconds")]
    TimedOut(u64),
    /// yt-dlp exited cleanly but no file could be located
    #[error("download finished but no output file was produced")]
    MissingOutput,
    /// File exceeds what the Bot API accepts
    #[error("file is too large to send ({size_mb:.1} MB, limit {limit_mb} MB)")]
    TooLarge {
        /// Actual size
        size_mb: f64,
        /// Configured ceiling
        limit_mb: u64,
    },
    /// yt-dlp could not be started at all
    #[error("failed to launch yt-dlp: {0}")]
    Spawn(#[source] std::io::Error),
    /// Local filesystem error
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl DownloadError {
    /// Build an error from yt-dlp's stderr (or stdout when stderr is empty)
    #[must_use]
    pub fn from_output(output: &str) -> Self {
        let message = summarize(output);
        if UNAVAILABLE_PATTERNS.iter().any(|p| output.contains(p)) {
            Self::Unavailable(message)
        } else if TRANSIENT_PATTERNS.iter().any(|p| output.contains(p)) {
            Self::Transient(message)
        } else {
            Self::Failed(message)
        }
    }

    /// Whether another attempt could succeed
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transient(_))
    }
}

/// Maximum length of the extractor message kept in an error
const MAX_ERROR_MESSAGE: usize = 300;

/// Keep the last `ERROR:` line if there is one, otherwise the last non-empty
/// line, without the `ERROR: [youtube] id:` noise.
fn summarize(output: &str) -> String {
    let lines: Vec<&str> = output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .collect();
    let line = lines
        .iter()
        .rev()
        .find(|l| l.starts_with("ERROR:"))
        .or_else(|| lines.last())
        .copied()
        .unwrap_or("no output");

    let mut message = line.trim_start_matches("ERROR:").trim();
    // "[youtube] dQw4w9WgXcQ: Video unavailable" -> "Video unavailable"
    if message.starts_with('[') {
        if let Some((_, rest)) = message.split_once(']') {
            let rest = rest.trim_start();
            message = rest.split_once(": ").map_or(rest, |(_, tail)| tail);
        }
    }
    crate::utils::ellipsize(message, MAX_ERROR_MESSAGE)
}
