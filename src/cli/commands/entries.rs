//! Entries command: print the synthesized virtual entries.

use crate::config::Settings;
use crate::entries::EntrySynthesizer;
use crate::stories::normalize_stories;

pub fn run(settings: &Settings, legacy: bool, prod: bool) -> anyhow::Result<()> {
    let working_dir = settings.working_dir();
    let config_dir = settings.resolved_config_dir();
    let specifiers = normalize_stories(&settings.stories, &config_dir, &working_dir)?;
    let annotations: Vec<Option<String>> = settings
        .preview_annotations
        .iter()
        .cloned()
        .map(Some)
        .collect();

    let synthesizer = EntrySynthesizer::new(&config_dir, &working_dir);
    let entries = if legacy {
        synthesizer.legacy_virtual_entries(
            &specifiers,
            &annotations,
            &settings.framework.name,
            &[],
        )?
    } else {
        synthesizer.modern_virtual_entries(
            &specifiers,
            &annotations,
            &settings.builder,
            prod,
            &[],
        )?
    };

    println!("{}", serde_json::to_string_pretty(&entries)?);
    Ok(())
}
