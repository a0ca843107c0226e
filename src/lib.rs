#![deny(missing_docs)]
//! Tubegrab bot library.
//!
//! Telegram front end, menu state machine and yt-dlp download layer.

/// Telegram handlers, menus and delivery.
pub mod bot;
/// Configuration management.
pub mod config;
/// yt-dlp invocation and download orchestration.
pub mod download;
/// Log setup with secret redaction.
pub mod logging;
/// Utility functions.
pub mod utils;
