//! External tool checks run once at startup.
//!
//! yt-dlp is mandatory. ffmpeg is needed for merging separate video/audio
//! streams and for mp3 extraction; when it is missing the bot tries to
//! install it with a configurable shell command and keeps running either way.

use crate::config::Settings;
use anyhow::{bail, Result};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{error, info, warn};

/// Outcome of a tool check
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ToolStatus {
    /// Found on startup, with its version line
    Present(String),
    /// Installed during startup, with its version line
    Installed(String),
    /// Not available
    Missing,
}

impl ToolStatus {
    /// Whether the tool can be used
    #[must_use]
    pub const fn is_available(&self) -> bool {
        !matches!(self, Self::Missing)
    }
}

/// Run `<binary> <version_arg>` and return the first line of its output.
///
/// `None` when the binary cannot be started or exits with failure.
pub async fn probe(binary: &str, version_arg: &str) -> Option<String> {
    let output = Command::new(binary)
        .arg(version_arg)
        .stdin(Stdio::null())
        .output()
        .await
        .ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    Some(stdout.lines().next().unwrap_or_default().trim().to_string())
}

/// Make sure yt-dlp is runnable.
///
/// # Errors
///
/// Returns an error when the binary is missing; the bot cannot work without it.
pub async fn ensure_ytdlp(settings: &Settings) -> Result<String> {
    match probe(&settings.ytdlp_path, "--version").await {
        Some(version) => {
            info!(binary = %settings.ytdlp_path, %version, "yt-dlp found");
            Ok(version)
        }
        None => bail!(
            "yt-dlp ('{}') is not installed or not executable",
            settings.ytdlp_path
        ),
    }
}

/// Make sure ffmpeg is runnable, installing it when allowed.
pub async fn ensure_ffmpeg(settings: &Settings) -> ToolStatus {
    if let Some(version) = probe(&settings.ffmpeg_path, "-version").await {
        info!(binary = %settings.ffmpeg_path, %version, "ffmpeg found");
        return ToolStatus::Present(version);
    }

    if !settings.ffmpeg_auto_install {
        warn!(
            binary = %settings.ffmpeg_path,
            "ffmpeg not found and auto-install disabled; audio extraction and stream merging will fail"
        );
        return ToolStatus::Missing;
    }

    info!(command = %settings.ffmpeg_install_command, "ffmpeg not found, installing");
    if let Err(e) = run_install(&settings.ffmpeg_install_command).await {
        error!(error = %e, "ffmpeg installation failed");
        return ToolStatus::Missing;
    }

    match probe(&settings.ffmpeg_path, "-version").await {
        Some(version) => {
            info!(%version, "ffmpeg installed");
            ToolStatus::Installed(version)
        }
        None => {
            error!("ffmpeg still unavailable after installation");
            ToolStatus::Missing
        }
    }
}

async fn run_install(command: &str) -> Result<()> {
    let output = Command::new("sh")
        .arg("-c")
        .arg(command)
        .stdin(Stdio::null())
        .output()
        .await?;
    if output.status.success() {
        return Ok(());
    }
    let stderr = String::from_utf8_lossy(&output.stderr);
    bail!(
        "install command exited with {:?}: {}",
        output.status.code(),
        crate::utils::ellipsize(stderr.trim(), 500)
    )
}
