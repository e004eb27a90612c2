//! Model to (collection, group) names for every API a manager has built.

use crate::config::ModelId;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ApiInfo {
    pub collection_name: String,
    pub group_name: String,
}

impl ApiInfo {
    pub fn new(collection_name: impl Into<String>, group_name: impl Into<String>) -> Self {
        ApiInfo {
            collection_name: collection_name.into(),
            group_name: group_name.into(),
        }
    }
}

/// Owned by one manager. Rebuilding a model replaces its entry.
#[derive(Debug, Default)]
pub struct Registry {
    entries: RwLock<HashMap<ModelId, ApiInfo>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `info` for `model`, returning the entry it replaced.
    pub fn record(&self, model: ModelId, info: ApiInfo) -> Option<ApiInfo> {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let previous = entries.insert(model.clone(), info);
        if let Some(prev) = &previous {
            tracing::warn!(
                model = %model,
                previous_group = %prev.group_name,
                "model already had an API; registry entry overwritten"
            );
        }
        previous
    }

    pub fn get(&self, model: &ModelId) -> Option<ApiInfo> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(model)
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn last_writer_wins() {
        let registry = Registry::new();
        let id = ModelId::new("Person");
        assert_eq!(registry.record(id.clone(), ApiInfo::new("people", "g1")), None);
        let prev = registry.record(id.clone(), ApiInfo::new("persons", "g2"));
        assert_eq!(prev, Some(ApiInfo::new("people", "g1")));
        assert_eq!(registry.get(&id), Some(ApiInfo::new("persons", "g2")));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn unknown_model_is_absent() {
        assert_eq!(Registry::new().get(&ModelId::new("Nope")), None);
    }
}
