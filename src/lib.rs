//! Restless SDK: generates REST endpoints for database models on an axum router.

pub mod builder;
pub mod config;
pub mod error;
pub mod handlers;
pub mod manager;
pub mod processors;
pub mod registry;
pub mod response;
pub mod routes;
pub mod service;
pub mod sql;
pub mod state;

pub use builder::EndpointGroupBuilder;
pub use config::{
    load_from_path, ApiDocument, ColumnInfo, HttpMethod, MethodSet, Model, ModelConfiguration,
    ModelId, Relation, RelationDirection, Row,
};
pub use error::{AppError, ConfigError, ManagerError};
pub use handlers::{ApiHandler, ApiRequest, FunctionHandler, RouteParams};
pub use manager::{HostApp, Manager};
pub use processors::{compose, ProcessingError, Processors, ProcessorChains};
pub use registry::{ApiInfo, Registry};
pub use response::{ApiResponse, Paginated};
pub use routes::{RouteDescriptor, RouteKind, RoutingGroup};
pub use service::{PgSession, SearchQuery, Session, SessionError};
pub use state::ApiContext;
