//! Download jobs and file delivery.
//!
//! A job runs on its own tokio task: it downloads, uploads the file back to
//! the chat, removes the local copy and rewrites the menu message with the
//! final status.

use super::resilient::edit_message_safe_resilient;
use super::sessions::MenuSessions;
use super::state::Outcome;
use super::views::{DefaultMenuView, MenuView};
use crate::download::{DownloadRequest, DownloadService, DownloadedMedia, MediaTarget};
use crate::utils::telegram_retry_strategy;
use anyhow::{anyhow, Result};
use std::sync::Arc;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InputFile, MessageId};
use teloxide::RequestError;
use tokio_retry::RetryIf;
use tracing::{error, info, warn};

/// Telegram's caption limit
pub const MAX_CAPTION_CHARS: usize = 1024;

/// Everything a job needs once the button press has been accepted
#[derive(Clone)]
pub struct DownloadJob {
    /// Menu session that started the job
    pub session_id: String,
    /// Chat to deliver to
    pub chat_id: ChatId,
    /// Menu message that shows the status
    pub status_message: MessageId,
    /// What to download
    pub request: DownloadRequest,
}

/// Run `job` to completion. Never fails; every outcome ends up in the chat.
pub async fn run_job(
    bot: Bot,
    service: Arc<DownloadService>,
    sessions: MenuSessions,
    job: DownloadJob,
) {
    let target = job.request.target;
    let outcome = match execute(&bot, &service, &job).await {
        Ok(title) => {
            info!(session_id = %job.session_id, %title, "Download delivered");
            edit_message_safe_resilient(
                &bot,
                job.chat_id,
                job.status_message,
                &DefaultMenuView::download_completed(&title, target),
                None,
            )
            .await;
            Outcome::Delivered
        }
        Err(e) => {
            error!(session_id = %job.session_id, url = %job.request.url, error = %e, "Download job failed");
            let reason = crate::utils::ellipsize(&e.to_string(), 500);
            edit_message_safe_resilient(
                &bot,
                job.chat_id,
                job.status_message,
                &DefaultMenuView::download_failed(&reason, target),
                None,
            )
            .await;
            Outcome::Failed
        }
    };
    sessions.finish(&job.session_id, outcome).await;
}

/// Download and upload, returning the media title
async fn execute(bot: &Bot, service: &DownloadService, job: &DownloadJob) -> Result<String> {
    let media = service.fetch(&job.request).await?;
    let sent = send_media(bot, job.chat_id, &media, job.request.target).await;
    service.discard(&media.path).await;
    sent?;
    Ok(media.title)
}

/// Caption for the uploaded file, cut to Telegram's limit
#[must_use]
pub fn caption_for(title: &str, target: MediaTarget) -> String {
    crate::utils::ellipsize(&DefaultMenuView::caption(title, target), MAX_CAPTION_CHARS)
}

/// Upload `media` as video or audio, falling back to a document when
/// Telegram refuses the native upload.
///
/// Only connection failures, I/O errors and `RetryAfter` are retried.
/// API errors and timeouts are not, so a slow upload is never sent twice.
///
/// # Errors
///
/// Returns an error when the upload and its fallback are refused, or the
/// retries run out.
pub async fn send_media(
    bot: &Bot,
    chat_id: ChatId,
    media: &DownloadedMedia,
    target: MediaTarget,
) -> Result<Message> {
    let caption = caption_for(&media.title, target);
    let caption = caption.as_str();

    RetryIf::spawn(
        telegram_retry_strategy(),
        || async move {
            let attempt = send_media_once(bot, chat_id, media, target, caption).await;
            if let Err(RequestError::RetryAfter(wait)) = &attempt {
                warn!("Telegram asked to wait {wait} before uploading again");
                tokio::time::sleep(wait.duration()).await;
            }
            attempt
        },
        is_retryable_upload_error,
    )
    .await
    .map_err(|e| anyhow!("Telegram upload error: {e}"))
}

/// Failures worth sending the whole file again for
fn is_retryable_upload_error(e: &RequestError) -> bool {
    match e {
        RequestError::RetryAfter(_) | RequestError::Io(_) => true,
        // The file may already be on Telegram's side after a timeout
        RequestError::Network(e) => !e.is_timeout(),
        _ => false,
    }
}

async fn send_media_once(
    bot: &Bot,
    chat_id: ChatId,
    media: &DownloadedMedia,
    target: MediaTarget,
    caption: &str,
) -> Result<Message, RequestError> {
    let file_name = media.file_name();
    let make_file = || InputFile::file(&media.path).file_name(file_name.clone());

    let native = match target {
        MediaTarget::Video(_) => {
            bot.send_video(chat_id, make_file())
                .caption(caption)
                .supports_streaming(true)
                .await
        }
        MediaTarget::Audio => {
            bot.send_audio(chat_id, make_file())
                .caption(caption)
                .title(media.title.clone())
                .await
        }
    };

    match native {
        Err(RequestError::Api(e)) => {
            warn!(
                file_name = %file_name,
                error = %e,
                "Telegram refused {} as native media; falling back to document",
                target.noun()
            );
            bot.send_document(chat_id, make_file())
                .caption(caption)
                .await
        }
        other => other,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bot::state::{MenuAction, MenuState};
    use crate::config::Settings;
    use crate::download::ytdlp::MockMediaDownloader;
    use crate::download::{DownloadError, Quality};
    use mockito::{Matcher, Mock, ServerGuard};
    use std::path::{Path, PathBuf};
    use std::time::Duration;
    use teloxide::types::Seconds;
    use teloxide::ApiError;

    const CHAT: i64 = 1;
    const STATUS_MESSAGE: i32 = 42;

    const MESSAGE_JSON: &str = r#"{
        "ok": true,
        "result": {
            "message_id": 42,
            "from": {"id": 123456, "is_bot": true, "first_name": "Tubegrab"},
            "chat": {"id": 1, "first_name": "User", "type": "private"},
            "date": 1700000000,
            "text": "ok"
        }
    }"#;

    const BAD_REQUEST_JSON: &str =
        r#"{"ok": false, "error_code": 400, "description": "Bad Request: wrong file"}"#;

    /// Telegram call answered with `status` and `body`, expected `hits` times
    async fn telegram_method(
        server: &mut ServerGuard,
        method: &str,
        status: usize,
        body: &'static str,
        hits: usize,
    ) -> Mock {
        server
            .mock("POST", Matcher::Regex(format!("/bot[^/]+/{method}$")))
            .with_status(status)
            .with_header("content-type", "application/json")
            .with_body(body)
            .expect(hits)
            .create_async()
            .await
    }

    fn fake_bot(server: &ServerGuard) -> anyhow::Result<Bot> {
        Ok(Bot::new("123456:test-token").set_api_url(url::Url::parse(&server.url())?))
    }

    /// Service whose downloader writes a small mp4 into `dir`, remembering its path
    fn service_writing_into(
        dir: &Path,
        written: Arc<std::sync::Mutex<Option<PathBuf>>>,
    ) -> DownloadService {
        let mut mock = MockMediaDownloader::new();
        mock.expect_download().times(1).returning(move |_, stem| {
            let path = stem.with_extension("mp4");
            std::fs::write(&path, b"media")?;
            *written.lock().expect("lock") = Some(path.clone());
            Ok::<_, DownloadError>(DownloadedMedia {
                path,
                title: "Clip".to_string(),
                size_bytes: 5,
            })
        });
        let settings = Settings {
            downloads_dir: dir.to_path_buf(),
            download_retries: 0,
            ..Settings::default()
        };
        DownloadService::new(Arc::new(mock), &settings)
    }

    /// Session already moved to `Downloading` by two button presses
    async fn downloading_session(sessions: &MenuSessions) -> anyhow::Result<String> {
        let id = sessions.create("https://youtu.be/abc", CHAT, 7).await;
        sessions.advance(&id, MenuAction::Video).await?;
        sessions
            .advance(&id, MenuAction::Quality(Quality::P720))
            .await?;
        Ok(id)
    }

    fn job(session_id: String) -> DownloadJob {
        DownloadJob {
            session_id,
            chat_id: ChatId(CHAT),
            status_message: MessageId(STATUS_MESSAGE),
            request: DownloadRequest::video("https://youtu.be/abc", Quality::P720),
        }
    }

    #[test]
    fn test_caption_formats() {
        assert_eq!(
            caption_for("Never Gonna", MediaTarget::Video(Quality::P1080)),
            "🎥 Never Gonna - 1080p"
        );
        assert_eq!(caption_for("Track", MediaTarget::Audio), "🎵 Track");
    }

    #[test]
    fn test_caption_is_truncated() {
        let title = "t".repeat(2000);
        let caption = caption_for(&title, MediaTarget::Audio);
        assert_eq!(caption.chars().count(), MAX_CAPTION_CHARS);
        assert!(caption.starts_with("🎵 ttt"));
        assert!(caption.ends_with('…'));
    }

    #[test]
    fn test_only_connection_failures_are_retried() {
        assert!(is_retryable_upload_error(&RequestError::RetryAfter(
            Seconds::from_seconds(1)
        )));
        assert!(is_retryable_upload_error(&RequestError::Io(Arc::new(
            std::io::Error::other("connection reset")
        ))));
        assert!(!is_retryable_upload_error(&RequestError::Api(
            ApiError::BotBlocked
        )));
        assert!(!is_retryable_upload_error(&RequestError::MigrateToChatId(
            ChatId(-100)
        )));
    }

    #[tokio::test]
    async fn test_refused_upload_is_sent_once_then_reported() -> anyhow::Result<()> {
        let mut server = mockito::Server::new_async().await;
        // One native attempt and one document fallback, no retries
        let video = telegram_method(&mut server, "SendVideo", 400, BAD_REQUEST_JSON, 1).await;
        let document =
            telegram_method(&mut server, "SendDocument", 400, BAD_REQUEST_JSON, 1).await;
        let status = server
            .mock("POST", Matcher::Regex("/bot[^/]+/EditMessageText$".to_string()))
            .match_body(Matcher::Regex("Error downloading video".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(MESSAGE_JSON)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir()?;
        let written = Arc::new(std::sync::Mutex::new(None));
        let service = Arc::new(service_writing_into(dir.path(), written.clone()));
        let sessions = MenuSessions::new(Duration::from_secs(60));
        let id = downloading_session(&sessions).await?;

        run_job(fake_bot(&server)?, service, sessions.clone(), job(id.clone())).await;

        video.assert_async().await;
        document.assert_async().await;
        status.assert_async().await;

        let path = written.lock().expect("lock").clone().expect("file was written");
        assert!(!path.exists());
        let session = sessions.get(&id).await.expect("session");
        assert!(matches!(session.state, MenuState::Failed));
        Ok(())
    }

    #[tokio::test]
    async fn test_delivered_job_completes_session() -> anyhow::Result<()> {
        let mut server = mockito::Server::new_async().await;
        let video = telegram_method(&mut server, "SendVideo", 200, MESSAGE_JSON, 1).await;
        let document = telegram_method(&mut server, "SendDocument", 200, MESSAGE_JSON, 0).await;
        let status = server
            .mock("POST", Matcher::Regex("/bot[^/]+/EditMessageText$".to_string()))
            .match_body(Matcher::Regex("Download completed: Clip".to_string()))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(MESSAGE_JSON)
            .expect(1)
            .create_async()
            .await;

        let dir = tempfile::tempdir()?;
        let written = Arc::new(std::sync::Mutex::new(None));
        let service = Arc::new(service_writing_into(dir.path(), written.clone()));
        let sessions = MenuSessions::new(Duration::from_secs(60));
        let id = downloading_session(&sessions).await?;

        run_job(fake_bot(&server)?, service, sessions.clone(), job(id.clone())).await;

        video.assert_async().await;
        document.assert_async().await;
        status.assert_async().await;

        let path = written.lock().expect("lock").clone().expect("file was written");
        assert!(!path.exists());
        let session = sessions.get(&id).await.expect("session");
        assert!(matches!(session.state, MenuState::Completed));
        Ok(())
    }
}
