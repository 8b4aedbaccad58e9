//! Story discovery and the story index.
//!
//! - [`specifier`]: configured story locations, normalized and matchable
//! - [`csf`]: per-file metadata extraction
//! - [`generator`]: the versioned index and its incremental updates

pub mod csf;
pub mod error;
pub mod generator;
pub mod paths;
pub mod specifier;
pub mod types;

pub use error::{IndexError, IndexResult};
pub use generator::StoryIndexGenerator;
pub use paths::{slash, to_import_path};
pub use specifier::{DEFAULT_FILES, NormalizedStoriesSpecifier, StoriesEntry, normalize_stories};
pub use types::{DocgenInfo, EntryType, StoryIndex, StoryIndexEntry};
