//! Dev server core for a component story workshop.
//!
//! Indexes story files, keeps the index current while files change,
//! synthesizes the bundler entries that bootstrap the preview and starts the
//! preview and manager builds side by side.

pub mod builder;
pub mod channel;
pub mod cli;
pub mod config;
pub mod dev_server;
pub mod docgen;
pub mod entries;
pub mod logging;
pub mod plugins;
pub mod server;
pub mod stories;
pub mod telemetry;
pub mod watcher;

pub use builder::{Builder, BuilderConfig, BuilderError, BuilderOutput, CommandBuilder, StartContext, Target};
pub use channel::{InvalidationNotifier, STORY_INDEX_INVALIDATED, ServerChannel, ServerEvent};
pub use config::Settings;
pub use dev_server::{DevServer, DevServerError, DevServerHandle, DevServerOutput};
pub use entries::{EntryError, EntrySynthesizer, VirtualEntries};
pub use plugins::PluginRegistry;
pub use server::DevRouter;
pub use stories::{
    IndexError, NormalizedStoriesSpecifier, StoryIndex, StoryIndexEntry, StoryIndexGenerator,
    normalize_stories,
};
pub use telemetry::{Telemetry, TelemetryEvent};
pub use watcher::{StoryWatcher, WatchError};
