//! Manager: builds endpoint groups and registers them on host applications.
//!
//! Unattached, created groups are kept until a host is attached. Attaching a host
//! installs the shared [`ApiContext`] in its extensions and registers every group
//! created so far; groups created afterwards are registered on every attached host.

mod host;

pub use host::HostApp;

use crate::builder::EndpointGroupBuilder;
use crate::config::{HttpMethod, Model, ModelConfiguration, ModelId};
use crate::error::ManagerError;
use crate::processors::Processors;
use crate::registry::{ApiInfo, Registry};
use crate::routes::{api_name, build_url, RoutingGroup};
use crate::service::Session;
use crate::state::ApiContext;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use uuid::Uuid;

pub struct Manager {
    context: ApiContext,
    registry: Registry,
    created: Mutex<Vec<Arc<RoutingGroup>>>,
    apps: Mutex<Vec<HostApp>>,
}

fn locked<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Created groups are flushed together on attach, so none may share a `(path, method)`.
fn check_created(
    created: &[Arc<RoutingGroup>],
    group: &RoutingGroup,
) -> Result<(), ManagerError> {
    let taken: BTreeSet<(String, HttpMethod)> =
        created.iter().flat_map(|g| g.route_keys()).collect();
    match group.route_keys().into_iter().find(|key| taken.contains(key)) {
        Some((path, method)) => Err(ManagerError::RouteConflict {
            method: method.to_string(),
            path,
        }),
        None => Ok(()),
    }
}

impl Manager {
    pub fn new(session: Arc<dyn Session>) -> Self {
        Self::with_processors(session, Processors::new())
    }

    /// `processors` run before each group's own hooks for the same token.
    pub fn with_processors(session: Arc<dyn Session>, processors: Processors) -> Self {
        Manager {
            context: ApiContext::new(session, processors),
            registry: Registry::new(),
            created: Mutex::new(Vec::new()),
            apps: Mutex::new(Vec::new()),
        }
    }

    /// Constructs a manager already attached to `app`.
    pub fn with_app(
        app: &HostApp,
        session: Arc<dyn Session>,
        processors: Processors,
    ) -> Result<Self, ManagerError> {
        let manager = Self::with_processors(session, processors);
        manager.attach(app)?;
        Ok(manager)
    }

    pub fn context(&self) -> &ApiContext {
        &self.context
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    fn builder(&self) -> EndpointGroupBuilder<'_> {
        EndpointGroupBuilder::new(&self.context, &self.registry)
    }

    /// Registers every group created so far on `app`.
    /// Fails with `AlreadyInitialized` if `app` already carries an API context.
    pub fn attach(&self, app: &HostApp) -> Result<(), ManagerError> {
        let mut apps = locked(&self.apps);
        let created = locked(&self.created);
        let groups: Vec<&RoutingGroup> = created.iter().map(Arc::as_ref).collect();
        app.initialize(&self.context, &groups)?;
        apps.push(app.clone());
        Ok(())
    }

    pub fn is_attached(&self) -> bool {
        !locked(&self.apps).is_empty()
    }

    /// Builds a group and records it in the registry without registering it on any host.
    pub fn create_api_blueprint(
        &self,
        name: &str,
        model: impl Into<Arc<Model>>,
        config: ModelConfiguration,
    ) -> Result<RoutingGroup, ManagerError> {
        Ok(self.builder().build(name, model.into(), config)?)
    }

    /// Builds a group named `name`, then registers it on every attached host or
    /// keeps it for the next attach.
    pub fn create_endpoint_group(
        &self,
        name: &str,
        model: impl Into<Arc<Model>>,
        config: ModelConfiguration,
    ) -> Result<Arc<RoutingGroup>, ManagerError> {
        let builder = self.builder();
        let group = Arc::new(builder.assemble(name, model.into(), config)?);
        let apps = locked(&self.apps);
        let mut created = locked(&self.created);
        if created.iter().any(|g| g.name() == name) {
            return Err(ManagerError::DuplicateGroup(name.to_string()));
        }
        check_created(&created, &group)?;
        let mut hosts: Vec<_> = apps.iter().map(HostApp::write).collect();
        for host in &hosts {
            host.check(&[group.as_ref()])?;
        }
        builder.record(&group);
        for (app, host) in apps.iter().zip(hosts.iter_mut()) {
            host.commit(&group);
            tracing::info!(host = %app.id(), group = %name, "registered endpoint group");
        }
        if apps.is_empty() {
            tracing::info!(group = %name, "no host application attached; group queued");
        }
        created.push(Arc::clone(&group));
        Ok(group)
    }

    /// [`create_endpoint_group`](Self::create_endpoint_group) under a fresh unique name.
    pub fn create_api(
        &self,
        model: impl Into<Arc<Model>>,
        config: ModelConfiguration,
    ) -> Result<Arc<RoutingGroup>, ManagerError> {
        let name = Uuid::new_v4().to_string();
        self.create_endpoint_group(&name, model, config)
    }

    pub fn api_info(&self, model: &ModelId) -> Result<ApiInfo, ManagerError> {
        self.registry
            .get(model)
            .ok_or_else(|| ManagerError::UnknownModel(model.to_string()))
    }

    pub fn collection_name(&self, model: &Model) -> Result<String, ManagerError> {
        Ok(self.api_info(&model.id())?.collection_name)
    }

    pub fn group_name(&self, model: &Model) -> Result<String, ManagerError> {
        Ok(self.api_info(&model.id())?.group_name)
    }

    /// URL of `model`'s API. `params` fill route placeholders (`instid`,
    /// `relationname`, `relationinstid`); anything else goes in the query string.
    pub fn url_for(
        &self,
        model: &Model,
        params: &BTreeMap<String, String>,
    ) -> Result<String, ManagerError> {
        let info = self.api_info(&model.id())?;
        let endpoint = format!("{}.{}", info.group_name, api_name(&info.collection_name));
        let apps = locked(&self.apps);
        if let Some(app) = apps.iter().find(|app| app.has_endpoint(&endpoint)) {
            return app.url_for(&endpoint, params);
        }
        let created = locked(&self.created);
        match created.iter().find(|g| g.name() == info.group_name) {
            Some(group) => build_url(&group.url_rules(), &endpoint, params),
            None => Err(ManagerError::NotAttached),
        }
    }
}

impl std::fmt::Debug for Manager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let attached = locked(&self.apps).len();
        let created = locked(&self.created).len();
        f.debug_struct("Manager")
            .field("context", &self.context)
            .field("registry", &self.registry)
            .field("created", &created)
            .field("attached", &attached)
            .finish()
    }
}
