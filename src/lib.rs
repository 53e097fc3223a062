//! Clipboard history for macOS
//!
//! Watches the system pasteboard and keeps a deduplicated, pin-aware,
//! size-bounded history that survives restarts, backed by SQLite with a
//! key-value fallback file.

// objc's msg_send! expands cfgs rustc does not know about
#![allow(unexpected_cfgs)]

pub mod clipboard_history;
pub mod config;
pub mod error;
pub mod logging;
