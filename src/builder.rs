//! Builds a routing group for one model from its configuration.

use crate::config::{
    normalize_url_prefix, validate, validate_collection_name, Model, ModelConfiguration,
};
use crate::error::ConfigError;
use crate::handlers::{ApiHandler, FunctionHandler};
use crate::processors::compose;
use crate::registry::{ApiInfo, Registry};
use crate::routes::{plan_routes, RoutePlan, RoutingGroup};
use crate::service::{ColumnDeserializer, ColumnSerializer, Deserializer, Serializer};
use crate::state::ApiContext;
use std::sync::Arc;

pub struct EndpointGroupBuilder<'a> {
    context: &'a ApiContext,
    registry: &'a Registry,
}

impl<'a> EndpointGroupBuilder<'a> {
    pub fn new(context: &'a ApiContext, registry: &'a Registry) -> Self {
        EndpointGroupBuilder { context, registry }
    }

    /// Builds the group and records it in the registry. Nothing is recorded on error.
    pub fn build(
        &self,
        name: &str,
        model: Arc<Model>,
        config: ModelConfiguration,
    ) -> Result<RoutingGroup, ConfigError> {
        let group = self.assemble(name, model, config)?;
        self.record(&group);
        Ok(group)
    }

    /// Builds the group without touching the registry.
    pub fn assemble(
        &self,
        name: &str,
        model: Arc<Model>,
        config: ModelConfiguration,
    ) -> Result<RoutingGroup, ConfigError> {
        let methods = validate(&config)?;
        let collection_name = config
            .collection_name
            .clone()
            .unwrap_or_else(|| model.table_name.clone());
        validate_collection_name(&collection_name)?;
        let primary_key = match &config.primary_key {
            Some(pk) => pk.clone(),
            None => model.primary_key_name()?.to_string(),
        };

        let routes = plan_routes(&RoutePlan {
            collection_name: &collection_name,
            primary_key: &primary_key,
            methods: &methods,
            allow_patch_many: config.allow_patch_many,
            allow_delete_many: config.allow_delete_many,
            allow_functions: config.allow_functions,
            include_columns: config.include_columns.as_deref(),
            exclude_columns: config.exclude_columns.as_deref(),
        })?;
        let chains = compose(&self.context.processors, &config.processors);

        let serializer: Arc<dyn Serializer> = match &config.serializer {
            Some(s) => Arc::clone(s),
            None => Arc::new(ColumnSerializer::from_config(&config)),
        };
        let deserializer: Arc<dyn Deserializer> = match &config.deserializer {
            Some(d) => Arc::clone(d),
            None => Arc::new(ColumnDeserializer),
        };

        let api = ApiHandler {
            session: Arc::clone(&self.context.session),
            model: Arc::clone(&model),
            primary_key,
            methods,
            allow_patch_many: config.allow_patch_many,
            allow_delete_many: config.allow_delete_many,
            results_per_page: config.results_per_page.min(config.max_results_per_page),
            max_results_per_page: config.max_results_per_page,
            serializer,
            deserializer,
            validation_exceptions: config.validation_exceptions.iter().cloned().collect(),
            chains,
        };
        let eval = config.allow_functions.then(|| {
            Arc::new(FunctionHandler::new(
                Arc::clone(&self.context.session),
                Arc::clone(&model),
            ))
        });

        tracing::info!(
            group = %name,
            model = %model.name,
            collection = %collection_name,
            routes = routes.iter().filter(|r| !r.methods.is_empty()).count(),
            "built endpoint group"
        );
        Ok(RoutingGroup {
            name: name.to_string(),
            url_prefix: normalize_url_prefix(&config.url_prefix),
            collection_name,
            model_id: model.id(),
            routes,
            api: Arc::new(api),
            eval,
        })
    }

    pub fn record(&self, group: &RoutingGroup) {
        self.registry.record(
            group.model_id().clone(),
            ApiInfo::new(group.collection_name(), group.name()),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{HttpMethod, ModelId, Relation, Row};
    use crate::processors::Processors;
    use crate::routes::RouteKind;
    use crate::service::{SearchQuery, SearchResult, Session, SessionError, Window};
    use async_trait::async_trait;

    struct NoSession;

    #[async_trait]
    impl Session for NoSession {
        async fn search(
            &self,
            _: &Model,
            _: &SearchQuery,
            _: Option<Window>,
        ) -> Result<SearchResult, SessionError> {
            Ok(SearchResult::default())
        }
        async fn get(&self, _: &Model, _: &str, _: &str) -> Result<Option<Row>, SessionError> {
            Ok(None)
        }
        async fn create(&self, _: &Model, row: Row) -> Result<Row, SessionError> {
            Ok(row)
        }
        async fn update(
            &self,
            _: &Model,
            _: &str,
            _: &str,
            _: Row,
        ) -> Result<Option<Row>, SessionError> {
            Ok(None)
        }
        async fn update_many(
            &self,
            _: &Model,
            _: &SearchQuery,
            _: Row,
        ) -> Result<u64, SessionError> {
            Ok(0)
        }
        async fn delete(&self, _: &Model, _: &str, _: &str) -> Result<bool, SessionError> {
            Ok(false)
        }
        async fn delete_many(&self, _: &Model, _: &SearchQuery) -> Result<u64, SessionError> {
            Ok(0)
        }
        async fn related(
            &self,
            _: &Model,
            _: &str,
            _: &str,
            _: &Relation,
        ) -> Result<Option<Vec<Row>>, SessionError> {
            Ok(None)
        }
        async fn remove_related(
            &self,
            _: &Model,
            _: &str,
            _: &str,
            _: &Relation,
            _: &str,
        ) -> Result<bool, SessionError> {
            Ok(false)
        }
        async fn evaluate(&self, _: &Model, _: &SearchQuery) -> Result<Row, SessionError> {
            Ok(Row::new())
        }
    }

    fn context() -> ApiContext {
        ApiContext::new(Arc::new(NoSession), Processors::new())
    }

    fn person() -> Arc<Model> {
        Arc::new(
            Model::new("Person", "person")
                .with_primary_key("id")
                .with_columns(["name", "age"]),
        )
    }

    #[test]
    fn collection_defaults_to_table_name() {
        let ctx = context();
        let registry = Registry::new();
        let group = EndpointGroupBuilder::new(&ctx, &registry)
            .build("g", person(), ModelConfiguration::default())
            .unwrap();
        assert_eq!(group.collection_name(), "person");
        assert_eq!(group.endpoint(RouteKind::Collection), "g.personapi");
        assert_eq!(
            registry.get(&ModelId::new("Person")),
            Some(ApiInfo::new("person", "g"))
        );
    }

    #[test]
    fn page_size_is_clamped_and_prefix_trimmed() {
        let ctx = context();
        let registry = Registry::new();
        let group = EndpointGroupBuilder::new(&ctx, &registry)
            .build(
                "g",
                person(),
                ModelConfiguration::default()
                    .with_pagination(150, 100)
                    .with_url_prefix("/api/"),
            )
            .unwrap();
        assert_eq!(group.api.results_per_page, 100);
        assert_eq!(group.api.max_results_per_page, 100);
        assert_eq!(group.url_prefix, "/api");
        assert_eq!(group.full_path(&group.routes[0]), "/api/person");
    }

    #[test]
    fn failed_build_leaves_registry_untouched() {
        let ctx = context();
        let registry = Registry::new();
        let config = ModelConfiguration::default()
            .with_include_columns(["name"])
            .with_exclude_columns(["age"]);
        let err = EndpointGroupBuilder::new(&ctx, &registry)
            .build("g", person(), config)
            .unwrap_err();
        assert_eq!(err, ConfigError::IncludeAndExclude);
        assert!(registry.is_empty());

        let config = ModelConfiguration::default()
            .with_methods(["get", "post"])
            .with_exclude_columns(["id"]);
        assert!(EndpointGroupBuilder::new(&ctx, &registry)
            .build("g", person(), config)
            .is_err());
        assert!(registry.is_empty());
    }

    #[test]
    fn method_tokens_are_normalized() {
        let ctx = context();
        let registry = Registry::new();
        let group = EndpointGroupBuilder::new(&ctx, &registry)
            .build(
                "g",
                person(),
                ModelConfiguration::default().with_methods(["get", "Post"]),
            )
            .unwrap();
        assert!(group.api_handler().methods().contains(HttpMethod::Post));
        assert!(group.eval_handler().is_none());
    }

    #[test]
    fn primary_key_override_is_used() {
        let ctx = context();
        let registry = Registry::new();
        let group = EndpointGroupBuilder::new(&ctx, &registry)
            .assemble(
                "g",
                person(),
                ModelConfiguration::default().with_primary_key("name"),
            )
            .unwrap();
        assert_eq!(group.api_handler().primary_key(), "name");
        assert!(registry.is_empty());
    }
}
