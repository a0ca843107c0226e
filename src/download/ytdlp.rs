//! yt-dlp invocation
//!
//! Runs the extractor as a child process with an argument vector (no shell),
//! bounded by a timeout. yt-dlp is asked to print a small JSON object after
//! the final file move so the title and the real output path (which depends
//! on the container yt-dlp picked) come back without guessing.

use super::{DownloadError, DownloadRequest, DownloadedMedia, MediaTarget};
use crate::config::Settings;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, warn};

/// Template printed by yt-dlp once the file is in its final place
const PRINT_TEMPLATE: &str = "after_move:%(.{title,filepath})j";

/// Suffixes of yt-dlp's intermediate files
const PARTIAL_SUFFIXES: &[&str] = &[".part", ".ytdl", ".temp", ".tmp"];

/// Something that turns a [`DownloadRequest`] into a file on disk
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MediaDownloader: Send + Sync {
    /// Download `request` into a file named `<output_stem>.<ext>`
    async fn download(
        &self,
        request: &DownloadRequest,
        output_stem: &Path,
    ) -> Result<DownloadedMedia, DownloadError>;
}

/// yt-dlp backed downloader
#[derive(Debug, Clone)]
pub struct YtDlp {
    binary: String,
    ffmpeg_location: Option<String>,
    cookies_file: Option<PathBuf>,
    audio_bitrate_kbps: u32,
    timeout: Duration,
}

#[derive(Debug, Deserialize)]
struct PrintedInfo {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    filepath: Option<PathBuf>,
}

impl YtDlp {
    /// Create a downloader for the given binary with default options
    #[must_use]
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
            ffmpeg_location: None,
            cookies_file: None,
            audio_bitrate_kbps: 192,
            timeout: Duration::from_secs(900),
        }
    }

    /// Build from application settings
    #[must_use]
    pub fn from_settings(settings: &Settings) -> Self {
        // A bare command name is resolved through PATH by yt-dlp itself
        let ffmpeg_location = (settings.ffmpeg_path != "ffmpeg").then(|| settings.ffmpeg_path.clone());
        Self {
            binary: settings.ytdlp_path.clone(),
            ffmpeg_location,
            cookies_file: settings.cookies_file.clone(),
            audio_bitrate_kbps: settings.audio_bitrate_kbps,
            timeout: settings.download_timeout(),
        }
    }

    /// Override the process timeout
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Argument vector for one request
    #[must_use]
    pub fn build_args(&self, request: &DownloadRequest, output_stem: &Path) -> Vec<String> {
        let mut args: Vec<String> = vec![
            "--no-playlist".into(),
            "--no-progress".into(),
            "--no-warnings".into(),
            "--no-simulate".into(),
            "--print".into(),
            PRINT_TEMPLATE.into(),
            "-o".into(),
            format!("{}.%(ext)s", output_stem.display()),
        ];

        match request.target {
            MediaTarget::Video(quality) => {
                args.extend([
                    "-f".into(),
                    quality.format_selector().into(),
                    "--merge-output-format".into(),
                    "mp4".into(),
                ]);
            }
            MediaTarget::Audio => {
                args.extend([
                    "-f".into(),
                    "bestaudio/best".into(),
                    "-x".into(),
                    "--audio-format".into(),
                    "mp3".into(),
                    "--audio-quality".into(),
                    format!("{}K", self.audio_bitrate_kbps),
                ]);
            }
        }

        if let Some(ref location) = self.ffmpeg_location {
            args.extend(["--ffmpeg-location".into(), location.clone()]);
        }
        if let Some(ref cookies) = self.cookies_file {
            args.extend(["--cookies".into(), cookies.display().to_string()]);
        }

        args.push("--".into());
        args.push(request.url.clone());
        args
    }

    async fn run(&self, args: &[String]) -> Result<std::process::Output, DownloadError> {
        let child = Command::new(&self.binary)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(DownloadError::Spawn)?;

        // Dropping the future on timeout drops the child, which kills it.
        match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(output) => Ok(output?),
            Err(_) => {
                warn!(timeout_secs = self.timeout.as_secs(), "yt-dlp timed out, killed");
                Err(DownloadError::TimedOut(self.timeout.as_secs()))
            }
        }
    }
}

#[async_trait]
impl MediaDownloader for YtDlp {
    async fn download(
        &self,
        request: &DownloadRequest,
        output_stem: &Path,
    ) -> Result<DownloadedMedia, DownloadError> {
        let args = self.build_args(request, output_stem);
        debug!(binary = %self.binary, ?args, "Executing yt-dlp");

        let output = self.run(&args).await?;
        let stdout = String::from_utf8_lossy(&output.stdout);

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let text = if stderr.trim().is_empty() {
                stdout.as_ref()
            } else {
                stderr.as_ref()
            };
            warn!(status = ?output.status.code(), error = %text.trim(), "yt-dlp exited with failure");
            return Err(DownloadError::from_output(text));
        }

        let printed = parse_printed_info(&stdout);
        let title = printed
            .as_ref()
            .and_then(|p| p.title.clone())
            .filter(|t| !t.trim().is_empty())
            .unwrap_or_else(|| request.target.default_title().to_string());

        let reported = printed.and_then(|p| p.filepath).filter(|p| p.is_file());
        let path = match reported {
            Some(path) => path,
            None => locate_output(output_stem).await?.ok_or(DownloadError::MissingOutput)?,
        };

        let size_bytes = tokio::fs::metadata(&path).await?.len();
        info!(path = %path.display(), size_bytes, title = %title, "yt-dlp finished");

        Ok(DownloadedMedia {
            path,
            title,
            size_bytes,
        })
    }
}

/// Last line of `stdout` that parses as the printed JSON object
fn parse_printed_info(stdout: &str) -> Option<PrintedInfo> {
    stdout
        .lines()
        .rev()
        .map(str::trim)
        .filter(|l| l.starts_with('{'))
        .find_map(|l| serde_json::from_str::<PrintedInfo>(l).ok())
}

fn stem_prefix(output_stem: &Path) -> Option<String> {
    output_stem
        .file_name()
        .map(|n| format!("{}.", n.to_string_lossy()))
}

fn is_partial(name: &str) -> bool {
    PARTIAL_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Every file belonging to `output_stem`, finished or partial
///
/// # Errors
///
/// Returns an error if the directory cannot be read.
pub async fn files_for_stem(output_stem: &Path) -> std::io::Result<Vec<PathBuf>> {
    let Some(prefix) = stem_prefix(output_stem) else {
        return Ok(Vec::new());
    };
    let dir = output_stem.parent().unwrap_or_else(|| Path::new("."));

    let mut found = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e),
    };
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            found.push(entry.path());
        }
    }
    found.sort();
    Ok(found)
}

/// Finished output for `output_stem` when yt-dlp did not report its path
async fn locate_output(output_stem: &Path) -> std::io::Result<Option<PathBuf>> {
    let candidates = files_for_stem(output_stem).await?;
    Ok(candidates.into_iter().find(|p| {
        p.file_name()
            .is_some_and(|n| !is_partial(&n.to_string_lossy()))
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::Quality;

    fn ytdlp() -> YtDlp {
        YtDlp::new("yt-dlp")
    }

    #[test]
    fn test_video_args() {
        let req = DownloadRequest::video("https://youtu.be/abc", Quality::P720F60);
        let args = ytdlp().build_args(&req, Path::new("downloads/0f1e"));

        assert!(args
            .windows(2)
            .any(|w| w[0] == "-f" && w[1] == "bestvideo[height=720][fps>=60]+bestaudio/best"));
        assert!(args.windows(2).any(|w| w[0] == "--merge-output-format" && w[1] == "mp4"));
        assert!(args.windows(2).any(|w| w[0] == "-o" && w[1] == "downloads/0f1e.%(ext)s"));
        assert!(!args.contains(&"-x".to_string()));
        // URL always comes last, after the option terminator
        assert_eq!(
            args[args.len() - 2..].to_vec(),
            vec!["--".to_string(), "https://youtu.be/abc".to_string()]
        );
    }

    #[test]
    fn test_audio_args() {
        let req = DownloadRequest::audio("https://youtu.be/abc");
        let args = ytdlp().build_args(&req, Path::new("downloads/0f1e"));

        assert!(args.contains(&"-x".to_string()));
        assert!(args.windows(2).any(|w| w[0] == "--audio-format" && w[1] == "mp3"));
        assert!(args.windows(2).any(|w| w[0] == "--audio-quality" && w[1] == "192K"));
        assert!(args.windows(2).any(|w| w[0] == "-f" && w[1] == "bestaudio/best"));
    }

    #[test]
    fn test_optional_args_from_settings() {
        let settings = Settings {
            ffmpeg_path: "/opt/ffmpeg/bin/ffmpeg".to_string(),
            cookies_file: Some(PathBuf::from("/secrets/cookies.txt")),
            audio_bitrate_kbps: 320,
            ..Settings::default()
        };
        let args = YtDlp::from_settings(&settings)
            .build_args(&DownloadRequest::audio("https://youtu.be/x"), Path::new("d/s"));

        assert!(args
            .windows(2)
            .any(|w| w[0] == "--ffmpeg-location" && w[1] == "/opt/ffmpeg/bin/ffmpeg"));
        assert!(args
            .windows(2)
            .any(|w| w[0] == "--cookies" && w[1] == "/secrets/cookies.txt"));
        assert!(args.windows(2).any(|w| w[0] == "--audio-quality" && w[1] == "320K"));

        // Default ffmpeg name is left to PATH lookup
        let args = YtDlp::from_settings(&Settings::default())
            .build_args(&DownloadRequest::audio("https://youtu.be/x"), Path::new("d/s"));
        assert!(!args.contains(&"--ffmpeg-location".to_string()));
        assert!(!args.contains(&"--cookies".to_string()));
    }

    #[test]
    fn test_parse_printed_info_takes_last_json_line() {
        let stdout = "[info] something\n{\"title\": \"First\", \"filepath\": \"a.mp4\"}\n{\"title\": \"Second\", \"filepath\": \"b.mp4\"}\n";
        let info = parse_printed_info(stdout);
        assert_eq!(
            info.as_ref().and_then(|i| i.title.as_deref()),
            Some("Second")
        );
        assert_eq!(
            info.and_then(|i| i.filepath),
            Some(PathBuf::from("b.mp4"))
        );
    }

    #[test]
    fn test_parse_printed_info_handles_missing_fields() {
        let info = parse_printed_info("{\"title\": null}");
        assert!(info.is_some_and(|i| i.title.is_none() && i.filepath.is_none()));
        assert!(parse_printed_info("not json").is_none());
    }

    #[tokio::test]
    async fn test_locate_output_skips_partial_files() -> std::io::Result<()> {
        let dir = tempfile::tempdir()?;
        let stem = dir.path().join("abc123");
        tokio::fs::write(dir.path().join("abc123.f137.mp4.part"), b"x").await?;
        tokio::fs::write(dir.path().join("abc123.mp4"), b"video").await?;
        tokio::fs::write(dir.path().join("other.mp4"), b"nope").await?;

        let found = locate_output(&stem).await?;
        assert_eq!(found, Some(dir.path().join("abc123.mp4")));

        let all = files_for_stem(&stem).await?;
        assert_eq!(all.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_locate_output_missing_dir() -> std::io::Result<()> {
        let found = locate_output(Path::new("/nonexistent-tubegrab-dir/abc")).await?;
        assert!(found.is_none());
        Ok(())
    }
}
