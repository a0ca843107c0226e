//! Finding a YouTube link in a chat message.

use lazy_regex::regex;
use url::Url;

const ALLOWED_HOSTS: &[&str] = &[
    "youtube.com",
    "www.youtube.com",
    "m.youtube.com",
    "music.youtube.com",
    "youtu.be",
];

/// Extract the first YouTube link from `text` and return it normalized.
///
/// Links without a scheme get `https://`. Hosts other than `youtube.com`
/// (plus `www.`, `m.`, `music.`) and `youtu.be` are refused, as are links
/// with nothing after the host.
///
/// # Examples
///
/// ```
/// use tubegrab_bot::bot::links::extract_youtube_url;
/// assert_eq!(
///     extract_youtube_url("look: youtu.be/dQw4w9WgXcQ").as_deref(),
///     Some("https://youtu.be/dQw4w9WgXcQ")
/// );
/// assert_eq!(extract_youtube_url("https://vimeo.com/1"), None);
/// ```
#[must_use]
pub fn extract_youtube_url(text: &str) -> Option<String> {
    let candidates = regex!(r"(?i)\b(?:https?://)?(?:[a-z0-9-]+\.)*(?:youtube\.com|youtu\.be)\S*");
    candidates
        .find_iter(text)
        .find_map(|m| normalize(m.as_str().trim_end_matches(['.', ',', ')', '!', '?'])))
}

fn normalize(raw: &str) -> Option<String> {
    let lower = raw.to_ascii_lowercase();
    let with_scheme = if lower.starts_with("http://") || lower.starts_with("https://") {
        raw.to_string()
    } else {
        format!("https://{raw}")
    };

    let url = Url::parse(&with_scheme).ok()?;
    let host = url.host_str()?;
    if !ALLOWED_HOSTS.contains(&host) {
        return None;
    }
    if url.path().trim_matches('/').is_empty() && url.query().is_none() {
        return None;
    }
    Some(url.to_string())
}
