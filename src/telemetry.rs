//! Fire-and-forget usage reporting.
//!
//! [`Telemetry::report`] never blocks and never fails: the HTTP reporter
//! posts from a background task and only logs delivery errors.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use serde_json::{Value, json};

use crate::config::{CoreConfig, FeaturesConfig, FrameworkConfig, Settings};
use crate::plugins::PluginRegistry;

pub const START_EVENT: &str = "start";

/// Story index figures attached to the `start` event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexSummary {
    pub story_count: usize,
    pub version: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TelemetryEvent {
    pub event_type: String,
    pub payload: Value,
    pub storydev_version: &'static str,
}

impl TelemetryEvent {
    pub fn new(event_type: impl Into<String>, payload: Value) -> Self {
        Self {
            event_type: event_type.into(),
            payload,
            storydev_version: env!("CARGO_PKG_VERSION"),
        }
    }

    /// `start`, with the index summary when an index was built.
    pub fn start(summary: Option<IndexSummary>) -> Self {
        let payload = match summary {
            Some(summary) => json!({ "storyIndex": summary }),
            None => json!({}),
        };
        Self::new(START_EVENT, payload)
    }
}

pub trait Telemetry: Send + Sync {
    fn report(&self, event: TelemetryEvent);
}

/// Writes events to the log only.
#[derive(Debug, Default)]
pub struct LogTelemetry;

impl Telemetry for LogTelemetry {
    fn report(&self, event: TelemetryEvent) {
        crate::debug_event!("telemetry", &event.event_type, "{}", event.payload);
    }
}

/// Posts events as JSON to a collector endpoint.
#[derive(Debug, Clone)]
pub struct HttpTelemetry {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpTelemetry {
    pub fn new(endpoint: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .unwrap_or_default();
        Self {
            client,
            endpoint: endpoint.into(),
        }
    }
}

impl Telemetry for HttpTelemetry {
    fn report(&self, event: TelemetryEvent) {
        let Ok(handle) = tokio::runtime::Handle::try_current() else {
            crate::debug_event!("telemetry", "dropped", "no runtime for {}", event.event_type);
            return;
        };
        let client = self.client.clone();
        let endpoint = self.endpoint.clone();
        handle.spawn(async move {
            match client.post(&endpoint).json(&event).send().await {
                Ok(response) if response.status().is_success() => {
                    crate::debug_event!("telemetry", "sent", "{}", event.event_type);
                }
                Ok(response) => {
                    crate::debug_event!("telemetry", "rejected", "{}", response.status());
                }
                Err(e) => crate::debug_event!("telemetry", "failed", "{e}"),
            }
        });
    }
}

/// Reporter for the configured endpoint, or [`LogTelemetry`] without one.
pub fn from_config(core: &CoreConfig) -> Arc<dyn Telemetry> {
    match core.telemetry_endpoint.as_deref() {
        Some(endpoint) if !endpoint.is_empty() => Arc::new(HttpTelemetry::new(endpoint)),
        _ => Arc::new(LogTelemetry),
    }
}

/// What `/project.json` describes.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectMetadata {
    pub storydev_version: &'static str,
    pub framework: FrameworkConfig,
    pub builders: BuilderPrograms,
    pub features: FeaturesConfig,
    pub plugins: PluginRegistry,
}

/// Configured bundler program per target.
#[derive(Debug, Clone, Serialize)]
pub struct BuilderPrograms {
    pub preview: Option<String>,
    pub manager: Option<String>,
}

impl ProjectMetadata {
    pub fn new(settings: &Settings, plugins: &PluginRegistry) -> Self {
        Self {
            storydev_version: env!("CARGO_PKG_VERSION"),
            framework: FrameworkConfig {
                svelte: settings.svelte_options(),
                ..settings.framework.clone()
            },
            builders: BuilderPrograms {
                preview: settings.builders.preview.as_ref().map(|c| c.program.clone()),
                manager: settings.builders.manager.as_ref().map(|c| c.program.clone()),
            },
            features: settings.features.clone(),
            plugins: plugins.clone(),
        }
    }
}
