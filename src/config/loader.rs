//! Load models and per-model API configuration from a JSON document.

use crate::config::{Model, ModelConfiguration};
use crate::error::ConfigError;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// One `apis` entry: the model it targets plus its configuration.
#[derive(Clone, Debug, Deserialize)]
pub struct ApiEntry {
    pub model: String,
    #[serde(flatten)]
    pub config: ModelConfiguration,
}

/// `{ "models": [...], "apis": [...] }`
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiDocument {
    #[serde(default)]
    pub models: Vec<Model>,
    #[serde(default)]
    pub apis: Vec<ApiEntry>,
}

impl ApiDocument {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        serde_json::from_str(s).map_err(|e| ConfigError::Load(e.to_string()))
    }

    /// Pairs each `apis` entry with its model. Entries naming an unknown model are an error.
    pub fn resolve(self) -> Result<Vec<(Model, ModelConfiguration)>, ConfigError> {
        let models: HashMap<String, Model> = self
            .models
            .into_iter()
            .map(|m| (m.name.clone(), m))
            .collect();
        self.apis
            .into_iter()
            .map(|entry| {
                let model = models
                    .get(&entry.model)
                    .cloned()
                    .ok_or_else(|| ConfigError::Load(format!("unknown model '{}'", entry.model)))?;
                Ok((model, entry.config))
            })
            .collect()
    }
}

pub async fn load_from_path(path: impl AsRef<Path>) -> Result<ApiDocument, ConfigError> {
    let path = path.as_ref();
    tracing::debug!(path = %path.display(), "loading api document");
    let raw = tokio::fs::read_to_string(path)
        .await
        .map_err(|e| ConfigError::Load(format!("{}: {}", path.display(), e)))?;
    ApiDocument::from_json_str(&raw)
}
