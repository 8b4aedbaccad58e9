//! Story specifiers rendered as bundler-facing JavaScript.

use crate::stories::NormalizedStoriesSpecifier;
use crate::stories::specifier::glob_to_js_regex;

/// Serializes imports so lazily compiled modules are requested one at a time.
const IMPORT_PIPELINE: &str = r#"const importPipeline = () => {
  let importGate = Promise.resolve();
  return async (importFn) => {
    await importGate;
    const moduleExportsPromise = importFn();
    importGate = importGate.then(async () => {
      await moduleExportsPromise;
    });
    return moduleExportsPromise;
  };
};
const pipeline = importPipeline();"#;

const DIRECT_IMPORT: &str = "const pipeline = (x) => x();";

/// One importer: resolves a matching import path, `undefined` otherwise.
fn importer(specifier: &NormalizedStoriesSpecifier) -> String {
    let directory = specifier.directory.trim_end_matches('/');
    format!(
        r#"  async (path) => {{
    if (!/{matcher}/.exec(path)) {{
      return;
    }}
    const pathRemainder = path.substring({offset});
    return import(
      /* webpackChunkName: "[request]" */
      /* webpackInclude: /{include}/ */
      '{directory}/' + pathRemainder
    );
  }}"#,
        matcher = specifier.import_path_regex(),
        offset = directory.len() + 1,
        include = include_regex(specifier),
    )
}

/// File-name filter for the bundler's context scan below `directory`.
fn include_regex(specifier: &NormalizedStoriesSpecifier) -> String {
    let glob = specifier
        .files
        .rsplit('/')
        .next()
        .unwrap_or(&specifier.files);
    format!("(?:\\/|^){}$", glob_to_js_regex(glob))
}

/// ES module exporting `importFn(path)` over every specifier.
///
/// Importers are tried in specifier order; the first that returns module
/// exports wins.
pub fn to_import_fn(specifiers: &[NormalizedStoriesSpecifier], need_pipelined_import: bool) -> String {
    let pipeline = if need_pipelined_import {
        IMPORT_PIPELINE
    } else {
        DIRECT_IMPORT
    };
    let importers: Vec<String> = specifiers.iter().map(importer).collect();

    format!(
        r#"{pipeline}

const importers = [
{importers}
];

export async function importFn(path) {{
  for (let i = 0; i < importers.length; i++) {{
    const moduleExports = await pipeline(() => importers[i](path));
    if (moduleExports) {{
      return moduleExports;
    }}
  }}
}}
"#,
        importers = importers.join(",\n"),
    )
}

/// `require.context(...)` call for one specifier.
pub fn to_require_context_string(specifier: &NormalizedStoriesSpecifier) -> String {
    let recursive = specifier.files.contains("**") || specifier.files.contains('/');
    format!(
        "require.context('{}', {recursive}, /{}/)",
        specifier.directory,
        specifier.context_regex()
    )
}
