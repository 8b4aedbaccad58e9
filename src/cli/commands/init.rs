//! Init command.

use std::path::Path;

use anyhow::anyhow;

use crate::config::Settings;

/// Create `storydev.toml` in `config_dir`.
pub fn run(config_dir: &Path, force: bool) -> anyhow::Result<()> {
    let path = Settings::init_config_file(config_dir, force).map_err(|e| anyhow!("{e}"))?;
    println!("Created configuration file at: {}", path.display());
    println!("Edit this file to point `stories` at your story files.");
    Ok(())
}
