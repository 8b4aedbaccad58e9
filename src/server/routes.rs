//! JSON endpoints served by the dev server itself.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use serde_json::{Value, json};

use super::DevRouter;
use crate::stories::{EntryType, StoryIndex, StoryIndexGenerator};
use crate::telemetry::ProjectMetadata;

/// Mount `/index.json` and `/stories.json` over `generator`.
pub fn mount_index_routes(router: &DevRouter, generator: Arc<StoryIndexGenerator>) {
    router.route(
        "/index.json",
        get(index_json).with_state(generator.clone()),
    );
    router.route("/stories.json", get(stories_json).with_state(generator));
}

/// Mount `/project.json` serving `metadata`.
pub fn mount_project_route(router: &DevRouter, metadata: ProjectMetadata) {
    let metadata = Arc::new(metadata);
    router.route(
        "/project.json",
        get(|State(metadata): State<Arc<ProjectMetadata>>| async move {
            json_response(&*metadata)
        })
        .with_state(metadata),
    );
}

async fn index_json(State(generator): State<Arc<StoryIndexGenerator>>) -> Response {
    match current_index(generator).await {
        Ok(index) => json_response(&*index),
        Err(message) => error_response(message),
    }
}

async fn stories_json(State(generator): State<Arc<StoryIndexGenerator>>) -> Response {
    match current_index(generator).await {
        Ok(index) => json_response(&to_stories_v3(&index)),
        Err(message) => error_response(message),
    }
}

/// Cached snapshot, building on the blocking pool when there is none yet.
async fn current_index(generator: Arc<StoryIndexGenerator>) -> Result<Arc<StoryIndex>, String> {
    if let Some(index) = generator.snapshot() {
        return Ok(index);
    }
    tokio::task::spawn_blocking(move || generator.get_index())
        .await
        .map_err(|e| e.to_string())?
        .map_err(|e| e.to_string())
}

fn json_response<T: serde::Serialize + ?Sized>(value: &T) -> Response {
    match serde_json::to_vec(value) {
        Ok(body) => ([(header::CONTENT_TYPE, "application/json")], body).into_response(),
        Err(e) => error_response(e.to_string()),
    }
}

fn error_response(message: String) -> Response {
    tracing::warn!("[server] index request failed: {message}");
    (StatusCode::INTERNAL_SERVER_ERROR, message).into_response()
}

/// Story-only view in the older `stories.json` shape.
///
/// Docs entries are left out; each story repeats its title and name as
/// `kind`/`story` and carries the parameters older clients read.
pub fn to_stories_v3(index: &StoryIndex) -> Value {
    let stories: serde_json::Map<String, Value> = index
        .stories
        .iter()
        .filter(|(_, entry)| entry.entry_type == EntryType::Story)
        .map(|(id, entry)| {
            (
                id.clone(),
                json!({
                    "id": entry.id,
                    "title": entry.title,
                    "name": entry.name,
                    "importPath": entry.import_path,
                    "kind": entry.title,
                    "story": entry.name,
                    "parameters": {
                        "__id": entry.id,
                        "docsOnly": false,
                        "fileName": entry.import_path,
                    },
                }),
            )
        })
        .collect();

    json!({ "v": 3, "stories": stories })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stories::StoryIndexEntry;
    use indexmap::{IndexMap, IndexSet};

    fn entry(id: &str, entry_type: EntryType) -> StoryIndexEntry {
        StoryIndexEntry {
            id: id.to_string(),
            title: "Button".to_string(),
            name: "Primary".to_string(),
            import_path: "./src/Button.stories.tsx".to_string(),
            entry_type,
            tags: IndexSet::new(),
            docgen: None,
        }
    }

    #[test]
    fn test_stories_v3_keeps_stories_only() {
        let mut stories = IndexMap::new();
        stories.insert("button--primary".to_string(), entry("button--primary", EntryType::Story));
        stories.insert("button--docs".to_string(), entry("button--docs", EntryType::Docs));
        let index = StoryIndex { v: 4, stories };

        let v3 = to_stories_v3(&index);
        assert_eq!(v3["v"], 3);
        let stories = v3["stories"].as_object().unwrap();
        assert_eq!(stories.len(), 1);

        let story = &stories["button--primary"];
        assert_eq!(story["kind"], "Button");
        assert_eq!(story["story"], "Primary");
        assert_eq!(story["parameters"]["fileName"], "./src/Button.stories.tsx");
        assert_eq!(story["parameters"]["__id"], "button--primary");
    }
}
