//! Index command: build the story index once and print it.

use std::sync::Arc;

use anyhow::Context;

use crate::config::Settings;
use crate::stories::{EntryType, StoryIndexGenerator, normalize_stories};

pub async fn run(settings: &Settings, json: bool) -> anyhow::Result<()> {
    let working_dir = settings.working_dir();
    let specifiers = normalize_stories(
        &settings.stories,
        &settings.resolved_config_dir(),
        &working_dir,
    )?;
    if specifiers.is_empty() {
        eprintln!("No story specifiers configured; add `stories = [...]` to storydev.toml");
    }

    let generator = Arc::new(StoryIndexGenerator::new(specifiers, working_dir));
    let index = tokio::task::spawn_blocking(move || generator.get_index())
        .await
        .context("index task panicked")??;

    if json {
        println!("{}", serde_json::to_string_pretty(&*index)?);
        return Ok(());
    }

    let width = index.stories.keys().map(String::len).max().unwrap_or(0);
    for (id, entry) in &index.stories {
        let kind = match entry.entry_type {
            EntryType::Story => "story",
            EntryType::Docs => "docs",
        };
        println!("{id:<width$}  {kind:<5}  {}", entry.import_path);
    }
    println!();
    println!("{} entries (v{})", index.story_count(), index.v);
    Ok(())
}
