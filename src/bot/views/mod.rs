//! User-facing texts and keyboards

pub mod menu;

pub use menu::{kind_keyboard, quality_keyboard, DefaultMenuView, MenuView};
