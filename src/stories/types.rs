//! Story index data types.

use indexmap::{IndexMap, IndexSet};
use serde::{Deserialize, Serialize};

/// What an index entry renders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    Story,
    Docs,
}

/// Component documentation attached to the stories of a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocgenInfo {
    /// Local name of the meta `component`
    pub component: String,
    /// Import path of the component's source, when it resolved
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub component_path: Option<String>,
}

/// One discovered story or docs page.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryIndexEntry {
    pub id: String,
    pub title: String,
    pub name: String,
    pub import_path: String,
    #[serde(rename = "type")]
    pub entry_type: EntryType,
    pub tags: IndexSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub docgen: Option<DocgenInfo>,
}

/// Versioned snapshot of every entry, keyed by id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoryIndex {
    pub v: u64,
    pub stories: IndexMap<String, StoryIndexEntry>,
}

impl StoryIndex {
    pub fn story_count(&self) -> usize {
        self.stories.len()
    }

    /// Entries contributed by one file.
    pub fn entries_for<'a>(
        &'a self,
        import_path: &'a str,
    ) -> impl Iterator<Item = &'a StoryIndexEntry> + 'a {
        self.stories
            .values()
            .filter(move |entry| entry.import_path == import_path)
    }
}
