/// Inline button payloads
pub mod callback;
/// Download jobs and uploads
pub mod delivery;
/// Command, message and callback handlers
pub mod handlers;
/// YouTube link detection
pub mod links;
/// Telegram calls with retry
pub mod resilient;
/// Open menus keyed by session id
pub mod sessions;
/// Menu state machine
pub mod state;
/// Flood protection for unauthorized users
pub mod unauthorized_cache;
/// Texts and keyboards
pub mod views;

pub use sessions::MenuSessions;
pub use unauthorized_cache::UnauthorizedCache;
