//! In-memory store of open link menus.

use super::state::{Effect, MenuAction, MenuState, Outcome, Rejection};
use moka::future::Cache;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;
use uuid::Uuid;

/// Length of the id embedded in callback data
const SESSION_ID_LEN: usize = 12;

/// Upper bound on open menus kept in memory
const MAX_SESSIONS: u64 = 50_000;

/// One link and the menu attached to it
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LinkSession {
    /// Normalized video link
    pub url: String,
    /// Chat the menu lives in
    pub chat_id: i64,
    /// User who sent the link
    pub user_id: i64,
    /// Current menu state
    pub state: MenuState,
}

/// Why a button press could not be applied
#[derive(Clone, Copy, Debug, PartialEq, Eq, Error)]
pub enum SessionError {
    /// Unknown id, or the session outlived its TTL
    #[error("menu expired")]
    Expired,
    /// The state machine refused the action
    #[error(transparent)]
    Rejected(#[from] Rejection),
}

/// A successful transition together with a snapshot of the session
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Advanced {
    /// What to do next
    pub effect: Effect,
    /// Session after the transition
    pub session: LinkSession,
}

/// Menu sessions keyed by short random id, expiring after a TTL
#[derive(Clone)]
pub struct MenuSessions {
    cache: Cache<String, Arc<Mutex<LinkSession>>>,
}

impl MenuSessions {
    /// Create a store whose entries live for `ttl`
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(MAX_SESSIONS)
            .time_to_live(ttl)
            .build();
        Self { cache }
    }

    /// Open a menu for `url` and return its id
    pub async fn create(&self, url: impl Into<String>, chat_id: i64, user_id: i64) -> String {
        let id = Uuid::new_v4().as_simple().to_string()[..SESSION_ID_LEN].to_string();
        let session = LinkSession {
            url: url.into(),
            chat_id,
            user_id,
            state: MenuState::ChoosingKind,
        };
        self.cache
            .insert(id.clone(), Arc::new(Mutex::new(session)))
            .await;
        debug!(session_id = %id, "Menu session created");
        id
    }

    /// Snapshot of a session, if it is still alive
    pub async fn get(&self, id: &str) -> Option<LinkSession> {
        let entry = self.cache.get(id).await?;
        let session = entry.lock().await.clone();
        Some(session)
    }

    /// Apply a button press to session `id`.
    ///
    /// The state is checked and updated under the session's lock, so two
    /// quick presses cannot both start a download.
    ///
    /// # Errors
    ///
    /// [`SessionError::Expired`] for unknown ids, [`SessionError::Rejected`]
    /// when the action does not fit the current state.
    pub async fn advance(&self, id: &str, action: MenuAction) -> Result<Advanced, SessionError> {
        let entry = self.cache.get(id).await.ok_or(SessionError::Expired)?;
        let mut session = entry.lock().await;
        let (next, effect) = session.state.advance(action)?;
        debug!(session_id = %id, from = ?session.state, to = ?next, "Menu transition");
        session.state = next;
        Ok(Advanced {
            effect,
            session: session.clone(),
        })
    }

    /// Record the end of a download job. Expired sessions are ignored.
    pub async fn finish(&self, id: &str, outcome: Outcome) {
        if let Some(entry) = self.cache.get(id).await {
            let mut session = entry.lock().await;
            session.state = session.state.finish(outcome);
        }
    }

    /// Number of open menus
    #[must_use]
    pub fn len(&self) -> u64 {
        self.cache.entry_count()
    }

    /// Whether no menu is open
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::download::{MediaTarget, Quality};

    fn sessions() -> MenuSessions {
        MenuSessions::new(Duration::from_secs(60))
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let store = sessions();
        let id = store.create("https://youtu.be/abc", 10, 20).await;

        assert_eq!(id.len(), SESSION_ID_LEN);
        assert!(id.chars().all(|c| c.is_ascii_hexdigit()));

        let session = store.get(&id).await.expect("session exists");
        assert_eq!(session.url, "https://youtu.be/abc");
        assert_eq!(session.chat_id, 10);
        assert_eq!(session.user_id, 20);
        assert_eq!(session.state, MenuState::ChoosingKind);
    }

    #[tokio::test]
    async fn test_unknown_session_is_expired() {
        let store = sessions();
        assert_eq!(
            store.advance("ffffffffffff", MenuAction::Video).await,
            Err(SessionError::Expired)
        );
        assert!(store.get("ffffffffffff").await.is_none());
    }

    #[tokio::test]
    async fn test_full_video_flow() {
        let store = sessions();
        let id = store.create("https://youtu.be/abc", 1, 1).await;

        let step = store.advance(&id, MenuAction::Video).await.expect("video");
        assert_eq!(step.effect, Effect::ShowQualities);

        let step = store
            .advance(&id, MenuAction::Quality(Quality::P480))
            .await
            .expect("quality");
        let target = MediaTarget::Video(Quality::P480);
        assert_eq!(step.effect, Effect::StartDownload(target));
        assert_eq!(step.session.state, MenuState::Downloading(target));

        assert_eq!(
            store.advance(&id, MenuAction::Audio).await,
            Err(SessionError::Rejected(Rejection::Busy))
        );

        store.finish(&id, Outcome::Delivered).await;
        assert_eq!(
            store.get(&id).await.map(|s| s.state),
            Some(MenuState::Completed)
        );
        assert_eq!(
            store.advance(&id, MenuAction::Video).await,
            Err(SessionError::Rejected(Rejection::Finished))
        );
    }

    #[tokio::test]
    async fn test_concurrent_presses_start_one_download() {
        let store = sessions();
        let id = store.create("https://youtu.be/abc", 1, 1).await;

        let (a, b) = tokio::join!(
            store.advance(&id, MenuAction::Audio),
            store.advance(&id, MenuAction::Audio)
        );
        let started = [a, b]
            .into_iter()
            .filter(|r| matches!(r, Ok(Advanced { effect: Effect::StartDownload(_), .. })))
            .count();
        assert_eq!(started, 1);
    }

    #[tokio::test]
    async fn test_sessions_expire() {
        let store = MenuSessions::new(Duration::from_millis(50));
        let id = store.create("https://youtu.be/abc", 1, 1).await;
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert_eq!(
            store.advance(&id, MenuAction::Video).await,
            Err(SessionError::Expired)
        );
    }

    #[test]
    fn test_error_messages() {
        assert_eq!(SessionError::Expired.to_string(), "menu expired");
        assert_eq!(
            SessionError::Rejected(Rejection::Stale).to_string(),
            "menu out of date"
        );
    }
}
