//! Story metadata extraction.
//!
//! Reads Component Story Format modules (default export = meta, named
//! exports = stories) and MDX docs files with a scanner that understands
//! just enough JavaScript to find top-level object properties: string
//! literals, comments and nesting are skipped, everything else is opaque.

use std::collections::HashMap;
use std::path::Path;
use std::sync::LazyLock;

use indexmap::IndexSet;
use regex::Regex;

use super::error::{IndexError, IndexResult};
use super::paths::{slash, to_import_path};
use super::specifier::NormalizedStoriesSpecifier;
use super::types::{DocgenInfo, EntryType, StoryIndexEntry};
use crate::docgen::lookup_module;

static DEFAULT_EXPORT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*export\s+default\b\s*").unwrap());

static NAMED_DECLARATION: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?m)^\s*export\s+(?:const|let|var|class|function\*?|async\s+function)\s+([A-Za-z_$][\w$]*)",
    )
    .unwrap()
});

static NAMED_LIST: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?m)^\s*export\s*\{([^}]*)\}").unwrap());

static STORY_NAME_ASSIGNMENT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?m)^\s*([A-Za-z_$][\w$]*)\.storyName\s*=\s*(?:'([^']*)'|"([^"]*)"|`([^`]*)`)"#)
        .unwrap()
});

static IMPORT: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?s)import\s+([^;'"]+?)\s+from\s+['"]([^'"]+)['"]"#).unwrap()
});

static MDX_META_TITLE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"<Meta\b[^>]*?\btitle\s*=\s*(?:"([^"]*)"|'([^']*)'|\{\s*['"]([^'"]*)['"]\s*\})"#)
        .unwrap()
});

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_$][\w$]*$").unwrap());

/// Exports that are never stories.
const RESERVED_EXPORTS: &[&str] = &["default", "__namedExportsOrder"];

/// Extract index entries for one file under its owning specifier.
pub fn extract_entries(
    path: &Path,
    specifier: &NormalizedStoriesSpecifier,
    working_dir: &Path,
) -> IndexResult<Vec<StoryIndexEntry>> {
    let source = std::fs::read_to_string(path).map_err(|source| IndexError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let import_path = to_import_path(path, working_dir);

    let is_mdx = path.extension().is_some_and(|ext| ext == "mdx");
    if is_mdx {
        return extract_docs(path, &source, specifier, import_path).map(|entry| vec![entry]);
    }

    let csf = parse_csf(&source).map_err(|reason| IndexError::Extraction {
        path: path.to_path_buf(),
        reason,
    })?;
    let title = resolve_title(csf.meta.title.as_deref(), specifier, path)?;

    let mut tags: IndexSet<String> = csf.meta.tags.iter().cloned().collect();
    tags.insert("story".to_string());

    let docgen = csf.meta.component.as_ref().map(|component| {
        let component_path = csf
            .imports
            .get(component)
            .filter(|source| source.starts_with('.'))
            .and_then(|source| {
                let basedir = path.parent()?;
                match lookup_module(source, basedir) {
                    Ok(resolved) => Some(to_import_path(&resolved, working_dir)),
                    Err(e) => {
                        crate::debug_event!("index", "docgen unresolved", "{e}");
                        None
                    }
                }
            });
        DocgenInfo {
            component: component.clone(),
            component_path,
        }
    });

    csf.stories
        .iter()
        .filter(|story| csf.meta.includes(&story.export_name))
        .map(|story| {
            let id = to_id(&title, &story_name_from_export(&story.export_name)).map_err(|reason| {
                IndexError::Extraction {
                    path: path.to_path_buf(),
                    reason,
                }
            })?;
            Ok(StoryIndexEntry {
                id,
                title: title.clone(),
                name: story
                    .name
                    .clone()
                    .unwrap_or_else(|| story_name_from_export(&story.export_name)),
                import_path: import_path.clone(),
                entry_type: EntryType::Story,
                tags: tags.clone(),
                docgen: docgen.clone(),
            })
        })
        .collect()
}

fn extract_docs(
    path: &Path,
    source: &str,
    specifier: &NormalizedStoriesSpecifier,
    import_path: String,
) -> IndexResult<StoryIndexEntry> {
    let user_title = MDX_META_TITLE.captures(source).and_then(|caps| {
        caps.get(1)
            .or_else(|| caps.get(2))
            .or_else(|| caps.get(3))
            .map(|m| m.as_str().to_string())
    });
    let title = resolve_title(user_title.as_deref(), specifier, path)?;
    let id = to_id(&title, "docs").map_err(|reason| IndexError::Extraction {
        path: path.to_path_buf(),
        reason,
    })?;

    let mut tags = IndexSet::new();
    tags.insert("docs".to_string());

    Ok(StoryIndexEntry {
        id,
        title,
        name: "Docs".to_string(),
        import_path,
        entry_type: EntryType::Docs,
        tags,
        docgen: None,
    })
}

/// Title from the file's meta or from its location under the specifier.
fn resolve_title(
    user_title: Option<&str>,
    specifier: &NormalizedStoriesSpecifier,
    path: &Path,
) -> IndexResult<String> {
    let prefix = specifier.title_prefix.as_str();
    let title = match user_title {
        Some(title) if prefix.is_empty() => title.to_string(),
        Some(title) => format!("{prefix}/{title}"),
        None => {
            let relative = specifier.relative(path).unwrap_or(path);
            let auto = auto_title(&slash(relative));
            match (prefix.is_empty(), auto.is_empty()) {
                (true, _) => auto,
                (false, true) => prefix.to_string(),
                (false, false) => format!("{prefix}/{auto}"),
            }
        }
    };

    if title.is_empty() {
        return Err(IndexError::Extraction {
            path: path.to_path_buf(),
            reason: "cannot derive a title".to_string(),
        });
    }
    Ok(title)
}

/// Derive a title from a path relative to the specifier root.
///
/// ```text
/// components/Button.stories.tsx        -> components/Button
/// components/Button/Button.stories.tsx -> components/Button
/// components/Card/index.stories.js     -> components/Card
/// ```
pub fn auto_title(relative: &str) -> String {
    let mut parts: Vec<String> = relative
        .split('/')
        .filter(|part| !part.is_empty() && *part != ".")
        .map(str::to_string)
        .collect();

    if let Some(last) = parts.pop() {
        let stem = match last.rfind('.') {
            Some(dot) if dot > 0 => &last[..dot],
            _ => last.as_str(),
        };
        let stem = stem
            .strip_suffix(".stories")
            .or_else(|| stem.strip_suffix(".story"))
            .unwrap_or(stem);
        parts.push(stem.to_string());
    }

    if parts.len() > 1 && parts.last().is_some_and(|last| last == "index") {
        parts.pop();
    }
    if parts.len() > 1 && parts[parts.len() - 1] == parts[parts.len() - 2] {
        parts.pop();
    }

    parts.join("/")
}

/// Lowercase, map punctuation to `-`, collapse and trim dashes.
pub fn sanitize(value: &str) -> String {
    const SEPARATORS: &str = " ’–—―′¿'`~!@#$%^&*()_|+-=?;:\",.<>{}[]\\/";

    let mut out = String::with_capacity(value.len());
    for c in value.to_lowercase().chars() {
        let mapped = if SEPARATORS.contains(c) { '-' } else { c };
        if mapped == '-' && (out.is_empty() || out.ends_with('-')) {
            continue;
        }
        out.push(mapped);
    }
    while out.ends_with('-') {
        out.pop();
    }
    out
}

/// Story id from a title and a story name.
///
/// Callers pass the start-cased export name, so `primaryButton` becomes
/// `primary-button`.
pub fn to_id(title: &str, export_name: &str) -> Result<String, String> {
    let kind = sanitize(title);
    let name = sanitize(export_name);
    if kind.is_empty() || name.is_empty() {
        return Err(format!(
            "invalid title '{title}' or export '{export_name}': id parts must not be empty"
        ));
    }
    Ok(format!("{kind}--{name}"))
}

/// Human-readable story name from an export name.
///
/// ```text
/// primaryButton -> Primary Button
/// XMLHttpCall   -> XML Http Call
/// story_2       -> Story 2
/// ```
pub fn story_name_from_export(export_name: &str) -> String {
    let chars: Vec<char> = export_name.chars().collect();
    let mut words: Vec<String> = Vec::new();
    let mut current = String::new();

    for (i, &c) in chars.iter().enumerate() {
        if !c.is_alphanumeric() {
            if !current.is_empty() {
                words.push(std::mem::take(&mut current));
            }
            continue;
        }

        let boundary = current.chars().last().is_some_and(|prev| {
            let next_is_lower = chars.get(i + 1).is_some_and(|n| n.is_lowercase());
            (prev.is_lowercase() && c.is_uppercase())
                || (prev.is_uppercase() && c.is_uppercase() && next_is_lower)
                || (prev.is_alphabetic() && c.is_numeric())
                || (prev.is_numeric() && c.is_alphabetic())
        });
        if boundary {
            words.push(std::mem::take(&mut current));
        }
        current.push(c);
    }
    if !current.is_empty() {
        words.push(current);
    }

    words
        .iter()
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars).collect(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

/// Parsed shape of a CSF module.
#[derive(Debug, Default)]
pub struct CsfFile {
    pub meta: CsfMeta,
    pub stories: Vec<CsfStory>,
    /// Local binding -> module request
    pub imports: HashMap<String, String>,
}

#[derive(Debug, Default)]
pub struct CsfMeta {
    pub title: Option<String>,
    pub component: Option<String>,
    pub tags: Vec<String>,
    pub include_stories: Option<Vec<String>>,
    pub exclude_stories: Vec<String>,
}

impl CsfMeta {
    fn includes(&self, export_name: &str) -> bool {
        if self.exclude_stories.iter().any(|name| name == export_name) {
            return false;
        }
        match &self.include_stories {
            Some(names) => names.iter().any(|name| name == export_name),
            None => true,
        }
    }
}

#[derive(Debug)]
pub struct CsfStory {
    pub export_name: String,
    pub name: Option<String>,
}

/// Parse a CSF module. Fails when there is no default export.
pub fn parse_csf(source: &str) -> Result<CsfFile, String> {
    let default_export = DEFAULT_EXPORT
        .find(source)
        .ok_or_else(|| "CSF: missing default export".to_string())?;

    let meta_object = meta_object(source, default_export.end());
    let meta = meta_object.map(parse_meta).unwrap_or_default();

    let mut names: IndexSet<String> = IndexSet::new();
    for caps in NAMED_DECLARATION.captures_iter(source) {
        names.insert(caps[1].to_string());
    }
    for caps in NAMED_LIST.captures_iter(source) {
        for specifier in caps[1].split(',') {
            let exported = match specifier.split_once(" as ") {
                Some((_, alias)) => alias.trim(),
                None => specifier.trim(),
            };
            if IDENTIFIER.is_match(exported) {
                names.insert(exported.to_string());
            }
        }
    }

    let mut story_names: HashMap<String, String> = HashMap::new();
    for caps in STORY_NAME_ASSIGNMENT.captures_iter(source) {
        let value = caps
            .get(2)
            .or_else(|| caps.get(3))
            .or_else(|| caps.get(4))
            .map(|m| m.as_str().to_string())
            .unwrap_or_default();
        story_names.insert(caps[1].to_string(), value);
    }

    let stories = names
        .into_iter()
        .filter(|name| !RESERVED_EXPORTS.contains(&name.as_str()))
        .map(|export_name| {
            let name = story_names
                .get(&export_name)
                .cloned()
                .or_else(|| object_story_name(source, &export_name));
            CsfStory { export_name, name }
        })
        .collect();

    Ok(CsfFile {
        meta,
        stories,
        imports: parse_imports(source),
    })
}

/// Locate the meta object literal following `export default`.
fn meta_object(source: &str, after_default: usize) -> Option<&str> {
    let rest = &source[after_default..];
    let trimmed = rest.trim_start();
    let offset = after_default + (rest.len() - trimmed.len());

    if trimmed.starts_with('{') {
        return balanced_block(source, offset);
    }

    // `export default meta;` refers to a declared binding
    let ident: String = trimmed
        .chars()
        .take_while(|c| c.is_alphanumeric() || *c == '_' || *c == '$')
        .collect();
    if ident.is_empty() {
        return None;
    }
    let declaration = Regex::new(&format!(
        r"(?m)(?:const|let|var)\s+{}\s*(?::[^=]+)?=\s*\{{",
        regex::escape(&ident)
    ))
    .ok()?;
    let found = declaration.find(source)?;
    balanced_block(source, found.end() - 1)
}

/// `export const X = { name: '...' }` form of a story name.
fn object_story_name(source: &str, export_name: &str) -> Option<String> {
    let declaration = Regex::new(&format!(
        r"(?m)export\s+const\s+{}\s*(?::[^=]+)?=\s*\{{",
        regex::escape(export_name)
    ))
    .ok()?;
    let found = declaration.find(source)?;
    let object = balanced_block(source, found.end() - 1)?;
    top_level_properties(object)
        .into_iter()
        .find(|(key, _)| key == "name")
        .and_then(|(_, value)| string_literal(&value))
}

fn parse_meta(object: &str) -> CsfMeta {
    let mut meta = CsfMeta::default();
    for (key, value) in top_level_properties(object) {
        match key.as_str() {
            "title" => meta.title = string_literal(&value),
            "component" if IDENTIFIER.is_match(&value) => meta.component = Some(value),
            "tags" => meta.tags = string_array(&value),
            "includeStories" if value.starts_with('[') => {
                meta.include_stories = Some(string_array(&value))
            }
            "excludeStories" if value.starts_with('[') => meta.exclude_stories = string_array(&value),
            _ => {}
        }
    }
    meta
}

fn parse_imports(source: &str) -> HashMap<String, String> {
    let mut imports = HashMap::new();
    for caps in IMPORT.captures_iter(source) {
        let clause = caps[1].trim();
        let request = caps[2].to_string();

        let (default_part, named_part) = match clause.find('{') {
            Some(brace) => (
                clause[..brace].trim().trim_end_matches(',').trim(),
                Some(clause[brace + 1..].trim_end_matches('}')),
            ),
            None => (clause, None),
        };

        if let Some(namespace) = default_part.strip_prefix("* as ") {
            imports.insert(namespace.trim().to_string(), request.clone());
        } else if IDENTIFIER.is_match(default_part) {
            imports.insert(default_part.to_string(), request.clone());
        }

        if let Some(named) = named_part {
            for specifier in named.split(',') {
                let local = match specifier.split_once(" as ") {
                    Some((_, alias)) => alias.trim(),
                    None => specifier.trim(),
                };
                if IDENTIFIER.is_match(local) {
                    imports.insert(local.to_string(), request.clone());
                }
            }
        }
    }
    imports
}

/// Slice of `source` from the `{` at `open` through its matching `}`.
fn balanced_block(source: &str, open: usize) -> Option<&str> {
    let bytes = source.as_bytes();
    if bytes.get(open) != Some(&b'{') {
        return None;
    }

    let mut depth = 0usize;
    let mut i = open;
    while i < bytes.len() {
        match bytes[i] {
            b'\'' | b'"' | b'`' => i = skip_string(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&source[open..=i]);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Index of the closing quote of the string starting at `start`.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 1,
            c if c == quote => return i,
            _ => {}
        }
        i += 1;
    }
    bytes.len()
}

fn skip_line_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |p| start + p)
}

fn skip_block_comment(bytes: &[u8], start: usize) -> usize {
    bytes[start + 2..]
        .windows(2)
        .position(|w| w == b"*/")
        .map_or(bytes.len(), |p| start + 2 + p + 1)
}

/// `key: value` pairs at depth one of an object literal, values trimmed.
///
/// Shorthand properties (`{ component }`) map the key to itself.
fn top_level_properties(object: &str) -> Vec<(String, String)> {
    let bytes = object.as_bytes();
    let inner_end = object.len().saturating_sub(1);
    let mut properties = Vec::new();
    let mut depth = 0usize;
    let mut segment_start = 1;
    let mut i = 1;

    let mut push_segment = |segment: &str| {
        let segment = segment.trim();
        if segment.is_empty() || segment.starts_with("...") {
            return;
        }
        match segment.split_once(':') {
            Some((key, value)) => {
                // Leading comments end up in the key text; the key is the last token
                let key = key.split_whitespace().last().unwrap_or_default();
                let key = key.trim_matches(|c| c == '\'' || c == '"');
                properties.push((key.to_string(), value.trim().to_string()));
            }
            None if IDENTIFIER.is_match(segment) => {
                properties.push((segment.to_string(), segment.to_string()))
            }
            None => {}
        }
    };

    while i < inner_end {
        match bytes[i] {
            b'\'' | b'"' | b'`' => i = skip_string(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'/') => i = skip_line_comment(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => i = skip_block_comment(bytes, i),
            b'{' | b'[' | b'(' => depth += 1,
            b'}' | b']' | b')' => depth = depth.saturating_sub(1),
            b',' if depth == 0 => {
                push_segment(&object[segment_start..i]);
                segment_start = i + 1;
            }
            _ => {}
        }
        i += 1;
    }
    if segment_start < inner_end {
        push_segment(&object[segment_start..inner_end]);
    }

    properties
}

fn string_literal(value: &str) -> Option<String> {
    let value = value.trim();
    let quote = value.chars().next()?;
    if !matches!(quote, '\'' | '"' | '`') {
        return None;
    }
    value
        .strip_prefix(quote)
        .and_then(|rest| rest.strip_suffix(quote))
        .map(str::to_string)
}

fn string_array(value: &str) -> Vec<String> {
    let inner = value
        .trim()
        .trim_start_matches('[')
        .trim_end_matches(']');
    inner.split(',').filter_map(string_literal).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    const BUTTON_STORIES: &str = r#"
import React from 'react';
import { Button } from './Button';

export default {
  title: 'Example/Button',
  component: Button,
  tags: ['autodocs', "beta"],
  argTypes: { title: { control: 'text' } },
};

const Template = (args) => <Button {...args} />;

export const Primary = Template.bind({});
Primary.storyName = 'The Primary';

export const secondaryLarge = { args: { size: 'large' } };

export const Named = {
  name: 'Custom Name',
  args: {},
};
"#;

    #[test]
    fn test_parse_csf_meta_and_stories() {
        let csf = parse_csf(BUTTON_STORIES).unwrap();

        assert_eq!(csf.meta.title.as_deref(), Some("Example/Button"));
        assert_eq!(csf.meta.component.as_deref(), Some("Button"));
        assert_eq!(csf.meta.tags, vec!["autodocs", "beta"]);

        let names: Vec<_> = csf.stories.iter().map(|s| s.export_name.as_str()).collect();
        assert_eq!(names, vec!["Primary", "secondaryLarge", "Named"]);
        assert_eq!(csf.stories[0].name.as_deref(), Some("The Primary"));
        assert_eq!(csf.stories[1].name, None);
        assert_eq!(csf.stories[2].name.as_deref(), Some("Custom Name"));
        assert_eq!(csf.imports.get("Button").map(String::as_str), Some("./Button"));
    }

    #[test]
    fn test_parse_csf_meta_binding() {
        let source = r#"
import type { Meta } from '@storybook/react';
const meta: Meta<typeof Card> = { title: "Cards/Card", excludeStories: ['mockData'] };
export default meta;
export const mockData = {};
export { Basic, Other as Fancy } from './shared';
"#;
        let csf = parse_csf(source).unwrap();
        assert_eq!(csf.meta.title.as_deref(), Some("Cards/Card"));
        assert!(!csf.meta.includes("mockData"));
        let names: Vec<_> = csf.stories.iter().map(|s| s.export_name.as_str()).collect();
        assert_eq!(names, vec!["mockData", "Basic", "Fancy"]);
    }

    #[test]
    fn test_parse_csf_requires_default_export() {
        let result = parse_csf("export const Primary = {};");
        assert!(result.is_err());
    }

    #[test]
    fn test_sanitize_and_to_id() {
        assert_eq!(sanitize("Example/Button"), "example-button");
        assert_eq!(sanitize("  Hello, World!  "), "hello-world");
        assert_eq!(to_id("Example/Button", "Primary").unwrap(), "example-button--primary");
        assert!(to_id("!!!", "Primary").is_err());
    }

    #[test]
    fn test_story_name_from_export() {
        assert_eq!(story_name_from_export("primaryButton"), "Primary Button");
        assert_eq!(story_name_from_export("XMLHttpCall"), "XML Http Call");
        assert_eq!(story_name_from_export("story_2"), "Story 2");
        assert_eq!(story_name_from_export("Default"), "Default");
    }

    #[test]
    fn test_auto_title() {
        assert_eq!(auto_title("components/Button.stories.tsx"), "components/Button");
        assert_eq!(auto_title("components/Button/Button.stories.tsx"), "components/Button");
        assert_eq!(auto_title("components/Card/index.stories.js"), "components/Card");
        assert_eq!(auto_title("Intro.mdx"), "Intro");
    }

    #[test]
    fn test_top_level_properties_skip_nested() {
        let properties = top_level_properties("{ a: 'x', b: { title: 'nested' }, c }");
        let keys: Vec<_> = properties.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);
    }
}
