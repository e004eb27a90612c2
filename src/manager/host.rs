//! Host application: the axum router generated groups are merged into, plus
//! extension state and the url map used for reverse URL building.

use crate::config::HttpMethod;
use crate::error::ManagerError;
use crate::routes::{build_url, RoutingGroup, UrlRule};
use crate::state::ApiContext;
use axum::http::Extensions;
use axum::Router;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};
use uuid::Uuid;

#[derive(Default)]
pub(crate) struct HostInner {
    router: Router,
    extensions: Extensions,
    groups: Vec<String>,
    bound: BTreeSet<(String, HttpMethod)>,
    url_map: Vec<UrlRule>,
}

impl HostInner {
    /// Fails if any group name is taken or any `(path, method)` is already bound,
    /// including between the groups passed in.
    pub(crate) fn check(&self, groups: &[&RoutingGroup]) -> Result<(), ManagerError> {
        let mut names: BTreeSet<&str> = self.groups.iter().map(String::as_str).collect();
        let mut bound: BTreeSet<(String, HttpMethod)> = BTreeSet::new();
        for group in groups {
            if !names.insert(group.name()) {
                return Err(ManagerError::DuplicateGroup(group.name().to_string()));
            }
            for key in group.route_keys() {
                if self.bound.contains(&key) || !bound.insert(key.clone()) {
                    return Err(ManagerError::RouteConflict {
                        method: key.1.to_string(),
                        path: key.0,
                    });
                }
            }
        }
        Ok(())
    }

    pub(crate) fn commit(&mut self, group: &RoutingGroup) {
        let router = std::mem::take(&mut self.router);
        self.router = router.merge(group.router());
        self.bound.extend(group.route_keys());
        self.url_map.extend(group.url_rules());
        self.groups.push(group.name().to_string());
    }
}

/// Cheap to clone; clones share the same application.
#[derive(Clone)]
pub struct HostApp {
    id: Uuid,
    inner: Arc<RwLock<HostInner>>,
}

impl Default for HostApp {
    fn default() -> Self {
        Self::new()
    }
}

impl HostApp {
    pub fn new() -> Self {
        HostApp {
            id: Uuid::new_v4(),
            inner: Arc::new(RwLock::new(HostInner::default())),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    fn read(&self) -> RwLockReadGuard<'_, HostInner> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn write(&self) -> RwLockWriteGuard<'_, HostInner> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn extension<T: Clone + Send + Sync + 'static>(&self) -> Option<T> {
        self.read().extensions.get::<T>().cloned()
    }

    pub fn insert_extension<T: Clone + Send + Sync + 'static>(&self, value: T) -> Option<T> {
        self.write().extensions.insert(value)
    }

    /// Installs `context` and registers `groups` in one step. Fails without changes
    /// if a context is already installed or any group conflicts.
    pub(crate) fn initialize(
        &self,
        context: &ApiContext,
        groups: &[&RoutingGroup],
    ) -> Result<(), ManagerError> {
        let mut inner = self.write();
        if inner.extensions.get::<ApiContext>().is_some() {
            return Err(ManagerError::AlreadyInitialized(self.id));
        }
        inner.check(groups)?;
        inner.extensions.insert(context.clone());
        for group in groups {
            inner.commit(group);
        }
        tracing::info!(host = %self.id, groups = groups.len(), "host application initialized");
        Ok(())
    }

    /// Merges one group's routes into the router.
    pub fn register_group(&self, group: &RoutingGroup) -> Result<(), ManagerError> {
        let mut inner = self.write();
        inner.check(&[group])?;
        inner.commit(group);
        tracing::info!(host = %self.id, group = %group.name(), "registered endpoint group");
        Ok(())
    }

    pub fn url_for(
        &self,
        endpoint: &str,
        params: &BTreeMap<String, String>,
    ) -> Result<String, ManagerError> {
        build_url(&self.read().url_map, endpoint, params)
    }

    pub fn has_endpoint(&self, endpoint: &str) -> bool {
        self.read().url_map.iter().any(|r| r.endpoint == endpoint)
    }

    /// Snapshot of the router; groups registered later are not included.
    pub fn router(&self) -> Router {
        self.read().router.clone()
    }

    pub fn group_names(&self) -> Vec<String> {
        self.read().groups.clone()
    }

    /// Registered `(method, path)` pairs, paths in `{name}` form.
    pub fn routes(&self) -> Vec<(String, String)> {
        self.read()
            .url_map
            .iter()
            .flat_map(|r| r.methods.iter().map(move |m| (m.to_string(), r.path.clone())))
            .collect()
    }
}

impl std::fmt::Debug for HostApp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostApp")
            .field("id", &self.id)
            .field("groups", &self.group_names())
            .finish()
    }
}
