//! Turns a model's configured methods and flags into route descriptors.
//!
//! Paths are relative to the group's url prefix and use `{name}` placeholders.
//! Descriptors with an empty method set are still emitted (the table always has
//! five rows) and skipped when bound to a router.

use crate::config::{HttpMethod, MethodSet};
use crate::error::ConfigError;
use crate::handlers::{INSTANCE_ID, RELATION_INSTANCE_ID, RELATION_NAME};

/// Which of the fixed route shapes a descriptor is.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RouteKind {
    Create,
    Collection,
    Instance,
    RelationCollection,
    RelationInstance,
    Eval,
}

impl RouteKind {
    pub fn is_eval(&self) -> bool {
        matches!(self, RouteKind::Eval)
    }
}

/// Placeholders absent from a pattern that the handler sees as unset.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PathDefaults(Vec<&'static str>);

impl PathDefaults {
    pub fn none() -> Self {
        PathDefaults(Vec::new())
    }

    pub fn of(names: &[&'static str]) -> Self {
        PathDefaults(names.to_vec())
    }

    pub fn names(&self) -> &[&'static str] {
        &self.0
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.iter().any(|n| *n == name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteDescriptor {
    pub kind: RouteKind,
    pub path: String,
    pub methods: MethodSet,
    pub defaults: PathDefaults,
}

impl RouteDescriptor {
    fn new(kind: RouteKind, path: String, methods: MethodSet, defaults: PathDefaults) -> Self {
        RouteDescriptor {
            kind,
            path,
            methods,
            defaults,
        }
    }

    /// Placeholder names in pattern order.
    pub fn placeholders(&self) -> Vec<&str> {
        self.path
            .split('/')
            .filter_map(|seg| seg.strip_prefix('{').and_then(|s| s.strip_suffix('}')))
            .collect()
    }
}

/// Inputs to [`plan_routes`], already validated.
#[derive(Clone, Debug)]
pub struct RoutePlan<'a> {
    pub collection_name: &'a str,
    pub primary_key: &'a str,
    pub methods: &'a MethodSet,
    pub allow_patch_many: bool,
    pub allow_delete_many: bool,
    pub allow_functions: bool,
    pub include_columns: Option<&'a [String]>,
    pub exclude_columns: Option<&'a [String]>,
}

pub const EVAL_COLLECTION: &str = "eval";

fn check_primary_key(plan: &RoutePlan<'_>) -> Result<(), ConfigError> {
    let pk = plan.primary_key;
    let excluded = plan
        .exclude_columns
        .map(|cols| cols.iter().any(|c| c == pk))
        .unwrap_or(false);
    let not_included = plan
        .include_columns
        .map(|cols| !cols.is_empty() && !cols.iter().any(|c| c == pk))
        .unwrap_or(false);
    if excluded || not_included {
        return Err(ConfigError::PrimaryKeyNotIncluded {
            primary_key: pk.to_string(),
        });
    }
    Ok(())
}

/// Five descriptors in fixed order, plus the eval route when enabled.
pub fn plan_routes(plan: &RoutePlan<'_>) -> Result<Vec<RouteDescriptor>, ConfigError> {
    let methods = plan.methods;
    let create = methods.restricted_to(&[HttpMethod::Post]);
    let instance = methods.restricted_to(&[
        HttpMethod::Get,
        HttpMethod::Patch,
        HttpMethod::Delete,
        HttpMethod::Put,
    ]);
    let mut collection = methods.restricted_to(&[HttpMethod::Get]);
    if plan.allow_patch_many {
        for m in methods.restricted_to(&[HttpMethod::Patch, HttpMethod::Put]).iter() {
            collection.insert(m);
        }
    }
    if plan.allow_delete_many && methods.contains(HttpMethod::Delete) {
        collection.insert(HttpMethod::Delete);
    }

    if !create.is_empty() {
        check_primary_key(plan)?;
    }
    if plan.allow_functions && plan.collection_name == EVAL_COLLECTION {
        return Err(ConfigError::ReservedCollectionName);
    }

    let base = format!("/{}", plan.collection_name);
    let instance_path = format!("{}/{{{}}}", base, INSTANCE_ID);
    let relation_path = format!("{}/{{{}}}", instance_path, RELATION_NAME);
    let relation_instance_path = format!("{}/{{{}}}", relation_path, RELATION_INSTANCE_ID);

    let mut routes = vec![
        RouteDescriptor::new(RouteKind::Create, base.clone(), create, PathDefaults::none()),
        RouteDescriptor::new(
            RouteKind::Collection,
            base,
            collection.clone(),
            PathDefaults::of(&[INSTANCE_ID, RELATION_NAME, RELATION_INSTANCE_ID]),
        ),
        RouteDescriptor::new(
            RouteKind::Instance,
            instance_path,
            instance.clone(),
            PathDefaults::of(&[RELATION_NAME, RELATION_INSTANCE_ID]),
        ),
        RouteDescriptor::new(
            RouteKind::RelationCollection,
            relation_path,
            collection,
            PathDefaults::of(&[RELATION_INSTANCE_ID]),
        ),
        RouteDescriptor::new(
            RouteKind::RelationInstance,
            relation_instance_path,
            instance,
            PathDefaults::none(),
        ),
    ];
    if plan.allow_functions {
        routes.push(RouteDescriptor::new(
            RouteKind::Eval,
            format!("/{}/{}", EVAL_COLLECTION, plan.collection_name),
            [HttpMethod::Get].into_iter().collect(),
            PathDefaults::none(),
        ));
    }
    Ok(routes)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn methods(tokens: &[&str]) -> MethodSet {
        MethodSet::parse(tokens.iter().copied()).unwrap()
    }

    fn plan<'a>(methods: &'a MethodSet) -> RoutePlan<'a> {
        RoutePlan {
            collection_name: "people",
            primary_key: "id",
            methods,
            allow_patch_many: false,
            allow_delete_many: false,
            allow_functions: false,
            include_columns: None,
            exclude_columns: None,
        }
    }

    fn methods_of(routes: &[RouteDescriptor], kind: RouteKind) -> Vec<HttpMethod> {
        routes
            .iter()
            .find(|r| r.kind == kind)
            .map(|r| r.methods.iter().collect())
            .unwrap_or_default()
    }

    #[test]
    fn emits_five_shapes_in_order() {
        let m = methods(&["GET", "POST"]);
        let routes = plan_routes(&plan(&m)).unwrap();
        let paths: Vec<_> = routes.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(
            paths,
            vec![
                "/people",
                "/people",
                "/people/{instid}",
                "/people/{instid}/{relationname}",
                "/people/{instid}/{relationname}/{relationinstid}",
            ]
        );
        assert_eq!(methods_of(&routes, RouteKind::Create), vec![HttpMethod::Post]);
        assert_eq!(methods_of(&routes, RouteKind::Collection), vec![HttpMethod::Get]);
        assert_eq!(routes[4].placeholders(), vec!["instid", "relationname", "relationinstid"]);
        assert!(routes[1].defaults.contains("instid"));
    }

    #[test]
    fn no_path_method_pair_is_emitted_twice() {
        let m = methods(&["GET", "POST", "PATCH", "PUT", "DELETE"]);
        let mut p = plan(&m);
        p.allow_patch_many = true;
        p.allow_delete_many = true;
        p.allow_functions = true;
        let routes = plan_routes(&p).unwrap();
        let mut seen = BTreeSet::new();
        let mut total = 0;
        for route in &routes {
            for method in route.methods.iter() {
                total += 1;
                assert!(seen.insert((route.path.clone(), method)), "{} {}", method, route.path);
            }
        }
        assert_eq!(seen.len(), total);
    }

    #[test]
    fn patch_many_only_adds_requested_methods() {
        let m = methods(&["GET", "PATCH"]);
        let mut p = plan(&m);
        p.allow_patch_many = true;
        let routes = plan_routes(&p).unwrap();
        assert_eq!(
            methods_of(&routes, RouteKind::Collection),
            vec![HttpMethod::Get, HttpMethod::Patch]
        );

        let m = methods(&["POST"]);
        let mut p = plan(&m);
        p.allow_patch_many = true;
        p.allow_delete_many = true;
        let routes = plan_routes(&p).unwrap();
        assert!(methods_of(&routes, RouteKind::Collection).is_empty());
    }

    #[test]
    fn delete_many_adds_delete_to_collection() {
        let m = methods(&["GET", "DELETE"]);
        let mut p = plan(&m);
        assert_eq!(
            methods_of(&plan_routes(&p).unwrap(), RouteKind::Collection),
            vec![HttpMethod::Get]
        );
        p.allow_delete_many = true;
        assert_eq!(
            methods_of(&plan_routes(&p).unwrap(), RouteKind::Collection),
            vec![HttpMethod::Get, HttpMethod::Delete]
        );
    }

    #[test]
    fn post_requires_serializable_primary_key() {
        let m = methods(&["POST"]);
        let excluded = vec!["id".to_string()];
        let mut p = plan(&m);
        p.exclude_columns = Some(&excluded);
        assert_eq!(
            plan_routes(&p),
            Err(ConfigError::PrimaryKeyNotIncluded {
                primary_key: "id".into()
            })
        );

        let included = vec!["name".to_string()];
        let mut p = plan(&m);
        p.include_columns = Some(&included);
        assert!(plan_routes(&p).is_err());

        let get_only = methods(&["GET"]);
        let mut p = plan(&get_only);
        p.include_columns = Some(&included);
        assert!(plan_routes(&p).is_ok());
    }

    #[test]
    fn eval_route_and_reserved_name() {
        let m = methods(&["GET"]);
        let mut p = plan(&m);
        p.allow_functions = true;
        let routes = plan_routes(&p).unwrap();
        let eval = routes.last().unwrap();
        assert_eq!(eval.kind, RouteKind::Eval);
        assert_eq!(eval.path, "/eval/people");
        assert_eq!(eval.methods.iter().collect::<Vec<_>>(), vec![HttpMethod::Get]);

        p.collection_name = "eval";
        assert_eq!(plan_routes(&p), Err(ConfigError::ReservedCollectionName));
        p.allow_functions = false;
        assert!(plan_routes(&p).is_ok());
    }
}
