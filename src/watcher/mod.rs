//! File watching for story files.
//!
//! ```text
//! notify ──▶ mpsc ──▶ event loop ──▶ owning_specifier
//!                                      │
//!                         generator.invalidate(...)
//!                                      │
//!                                  on_change(...)
//! ```
//!
//! Coalescing bursts is left to the invalidation notifier.

mod error;
mod roots;
mod story_watcher;

pub use error::WatchError;
pub use roots::{owning_specifier, watch_roots};
pub use story_watcher::{OnChange, StoryWatcher};
