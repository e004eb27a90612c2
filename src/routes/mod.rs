//! Route planning, routing groups and reverse URL rules.

pub mod group;
pub mod planner;
pub mod url;

pub use group::{api_name, axum_path, RoutingGroup};
pub use planner::{plan_routes, PathDefaults, RouteDescriptor, RouteKind, RoutePlan};
pub use url::{build_url, UrlRule};
