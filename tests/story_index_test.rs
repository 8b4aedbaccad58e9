use std::fs;
use std::path::Path;

use storydev::stories::{
    EntryType, StoriesEntry, StoryIndexGenerator, normalize_stories,
};
use storydev::watcher::owning_specifier;
use tempfile::TempDir;

fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

fn project() -> TempDir {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path();
    fs::create_dir_all(root.join(".storybook")).unwrap();

    write(
        root,
        "src/components/Button.tsx",
        "export const Button = () => null;\n",
    );
    write(
        root,
        "src/components/Button.stories.tsx",
        r#"import { Button } from './Button';

export default {
  title: 'Atoms/Button',
  component: Button,
  tags: ['autodocs'],
};

export const Primary = {};
export const secondaryLarge = {};
secondaryLarge.storyName = 'Large secondary';
"#,
    );
    write(
        root,
        "src/components/Card/Card.stories.js",
        "export default {};\nexport const Basic = {};\n",
    );
    write(
        root,
        "src/Introduction.mdx",
        "import { Meta } from '@storybook/blocks';\n\n<Meta title=\"Intro\" />\n\n# Hello\n",
    );
    write(
        root,
        "lib/Badge.stories.js",
        "export default {};\nexport const Default = {};\n",
    );
    temp_dir
}

fn generator(root: &Path) -> StoryIndexGenerator {
    let entries = vec![
        StoriesEntry::Glob("../src/**/*.@(mdx|stories.@(js|tsx))".to_string()),
        StoriesEntry::Specifier {
            directory: "../lib".to_string(),
            files: None,
            title_prefix: Some("Library".to_string()),
        },
    ];
    let specifiers = normalize_stories(&entries, &root.join(".storybook"), root).unwrap();
    StoryIndexGenerator::new(specifiers, root.to_path_buf())
}

#[test]
fn test_full_scan() {
    let temp_dir = project();
    let generator = generator(temp_dir.path());

    let index = generator.get_index().unwrap();
    assert_eq!(index.v, 1);

    let primary = &index.stories["atoms-button--primary"];
    assert_eq!(primary.title, "Atoms/Button");
    assert_eq!(primary.name, "Primary");
    assert_eq!(primary.import_path, "./src/components/Button.stories.tsx");
    assert_eq!(primary.entry_type, EntryType::Story);
    assert!(primary.tags.contains("autodocs"));
    assert!(primary.tags.contains("story"));
    let docgen = primary.docgen.as_ref().unwrap();
    assert_eq!(docgen.component, "Button");
    assert_eq!(
        docgen.component_path.as_deref(),
        Some("./src/components/Button.tsx")
    );

    assert_eq!(
        index.stories["atoms-button--secondary-large"].name,
        "Large secondary"
    );

    // Folder repeating the file name collapses
    assert_eq!(index.stories["components-card--basic"].title, "components/Card");

    let intro = &index.stories["intro--docs"];
    assert_eq!(intro.entry_type, EntryType::Docs);
    assert!(intro.tags.contains("docs"));

    assert_eq!(index.stories["library-badge--default"].title, "Library/Badge");
    assert_eq!(index.story_count(), 5);
}

#[test]
fn test_get_index_is_cached() {
    let temp_dir = project();
    let generator = generator(temp_dir.path());

    let first = generator.get_index().unwrap();
    // A new file is not picked up without an invalidation
    write(
        temp_dir.path(),
        "src/Late.stories.js",
        "export default {};\nexport const One = {};\n",
    );
    let second = generator.get_index().unwrap();

    assert_eq!(first.v, second.v);
    assert_eq!(first.stories, second.stories);
}

#[test]
fn test_invalidate_added_changed_and_removed_files() {
    let temp_dir = project();
    let root = temp_dir.path();
    let generator = generator(root);
    generator.get_index().unwrap();
    let specifier = generator.specifiers()[0].clone();

    let late = root.join("src/Late.stories.js");
    write(root, "src/Late.stories.js", "export default {};\nexport const One = {};\n");
    generator.invalidate(&specifier, &late, false);
    let index = generator.get_index().unwrap();
    assert_eq!(index.v, 2);
    assert!(index.stories.contains_key("late--one"));

    write(root, "src/Late.stories.js", "export default {};\nexport const Two = {};\n");
    generator.invalidate(&specifier, &late, false);
    let index = generator.get_index().unwrap();
    assert_eq!(index.v, 3);
    assert!(!index.stories.contains_key("late--one"));
    assert!(index.stories.contains_key("late--two"));

    fs::remove_file(&late).unwrap();
    generator.invalidate(&specifier, &late, true);
    let index = generator.get_index().unwrap();
    assert_eq!(index.v, 4);
    assert_eq!(index.entries_for("./src/Late.stories.js").count(), 0);
}

#[test]
fn test_broken_edit_drops_old_entries() {
    let temp_dir = project();
    let root = temp_dir.path();
    let generator = generator(root);
    generator.get_index().unwrap();
    let specifier = generator.specifiers()[0].clone();

    let card = root.join("src/components/Card/Card.stories.js");
    write(root, "src/components/Card/Card.stories.js", "export const Basic = {};\n");
    generator.invalidate(&specifier, &card, false);

    let index = generator.get_index().unwrap();
    assert!(!index.stories.contains_key("components-card--basic"));
    assert_eq!(index.story_count(), 4);
}

/// Route a change the way the watcher does: only owned paths invalidate.
fn apply_change(generator: &StoryIndexGenerator, path: &Path) {
    if let Some(specifier) = owning_specifier(generator.specifiers(), path) {
        generator.invalidate(specifier, path, !path.exists());
    }
}

#[test]
fn test_changes_under_dependencies_and_hidden_dirs_match_rescan() {
    let temp_dir = project();
    let root = temp_dir.path();
    let generator = generator(root);
    let before = generator.get_index().unwrap();

    let ignored = [
        "src/node_modules/pkg/Dep.stories.js",
        "src/.cache/Old.stories.js",
        "lib/node_modules/Inner.stories.js",
    ];
    for relative in ignored {
        write(root, relative, "export default {};\nexport const Inner = {};\n");
        apply_change(&generator, &root.join(relative));
    }
    write(root, "src/Fresh.stories.js", "export default {};\nexport const Fresh = {};\n");
    apply_change(&generator, &root.join("src/Fresh.stories.js"));

    let patched = generator.get_index().unwrap();
    assert_eq!(patched.v, before.v + 1);

    let rescanned = self::generator(root).get_index().unwrap();
    assert_eq!(patched.stories.len(), rescanned.stories.len());
    for id in rescanned.stories.keys() {
        assert!(patched.stories.contains_key(id), "{id} missing after patch");
    }
    assert!(
        patched
            .stories
            .values()
            .all(|entry| !entry.import_path.contains("node_modules") && !entry.import_path.contains("/."))
    );
    assert!(patched.stories.contains_key("fresh--fresh"));
}

#[test]
fn test_missing_directory_is_reported_at_normalization() {
    let temp_dir = TempDir::new().unwrap();
    let err = normalize_stories(
        &[StoriesEntry::Glob("../missing/**/*.stories.js".to_string())],
        &temp_dir.path().join(".storybook"),
        temp_dir.path(),
    )
    .unwrap_err();

    assert!(err.to_string().contains("missing"), "{err}");
}
