use std::env;
use std::fs;

use storydev::config::{SETTINGS_FILE, Settings};
use tempfile::TempDir;

// One test so the environment is never mutated concurrently
#[test]
fn test_env_overrides_file_and_defaults() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(SETTINGS_FILE),
        r#"
stories = ["../src/**/*.stories.tsx"]

[server]
port = 9009
ci = true

[file_watch]
debounce_ms = 50
"#,
    )
    .unwrap();

    unsafe {
        // Double underscore separates nesting, single underscore stays in field names
        env::set_var("SD_SERVER__PORT", "7007");
        env::set_var("SD_FEATURES__STORY_STORE_V7", "true");
        env::set_var("SD_CORE__DISABLE_TELEMETRY", "true");
    }

    let settings = Settings::load(temp_dir.path());

    unsafe {
        env::remove_var("SD_SERVER__PORT");
        env::remove_var("SD_FEATURES__STORY_STORE_V7");
        env::remove_var("SD_CORE__DISABLE_TELEMETRY");
    }

    let settings = settings.unwrap();
    assert_eq!(settings.server.port, 7007, "env beats the file");
    assert!(settings.server.ci, "file value survives");
    assert_eq!(settings.file_watch.debounce_ms, 50);
    assert!(settings.features.story_store_v7);
    assert!(settings.features.needs_index());
    assert!(settings.core.disable_telemetry);
    assert_eq!(settings.config_dir, temp_dir.path());
    assert_eq!(settings.stories.len(), 1);
}

#[test]
fn test_unknown_svelte_option_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(SETTINGS_FILE),
        r#"
[framework]
name = "@storybook/svelte-vite"

[framework.svelte]
emit_css = true
preprocess = "typescript"
"#,
    )
    .unwrap();

    let err = Settings::load(temp_dir.path()).unwrap_err();
    assert!(err.to_string().contains("preprocess"), "{err}");
}

#[test]
fn test_zero_channel_capacity_is_a_config_error() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(
        temp_dir.path().join(SETTINGS_FILE),
        "[server]\nchannel_capacity = 0\n",
    )
    .unwrap();

    let err = Settings::load(temp_dir.path()).unwrap_err();
    assert!(err.to_string().contains("channel_capacity"), "{err}");
}

#[test]
fn test_init_writes_loadable_file() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".storybook");

    let path = Settings::init_config_file(&config_dir, false).unwrap();
    assert!(path.exists());
    assert!(Settings::init_config_file(&config_dir, false).is_err());
    assert!(Settings::init_config_file(&config_dir, true).is_ok());

    let settings = Settings::load(&config_dir).unwrap();
    assert_eq!(settings.stories.len(), 1);
    assert!(settings.file_watch.enabled);
}
