//! `{{key}}` placeholder substitution.

use std::sync::LazyLock;

use regex::{Captures, Regex};

pub const MODERN_ENTRY: &str = include_str!("templates/modern-entry.js");
pub const LEGACY_CONFIG_ENTRY: &str = include_str!("templates/legacy-config-entry.js");
pub const LEGACY_STORIES_ENTRY: &str = include_str!("templates/legacy-stories-entry.js");

static PLACEHOLDER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{\s*([A-Za-z_][\w]*)\s*\}\}").unwrap());

/// Replace every `{{key}}` whose key appears in `data`.
///
/// Unknown placeholders are left exactly as written so a later pass can
/// substitute them.
pub fn interpolate(template: &str, data: &[(&str, &str)]) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures| {
            let key = &caps[1];
            match data.iter().find(|(name, _)| *name == key) {
                Some((_, value)) => value.to_string(),
                None => caps[0].to_string(),
            }
        })
        .into_owned()
}
