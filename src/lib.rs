//! graph-rest: descriptor-driven REST layer mapping HTTP verbs onto a property graph.

pub mod auth;
pub mod error;
pub mod extractors;
pub mod handlers;
pub mod inflect;
pub mod model;
pub mod response;
pub mod routes;
pub mod service;
pub mod settings;
pub mod state;
pub mod store;
pub mod telemetry;
pub mod xml;

pub use auth::{token_authenticator, AuthContext, AuthGate};
pub use error::{AppError, ConfigError};
pub use extractors::{Format, PathParams};
pub use model::{
    Attribute, AttributeKind, EntityType, FieldKind, FieldRule, RelationDef, ResourceDescriptor, ValidationSchema,
};
pub use response::{render, reply};
pub use routes::{common_routes, resource_routes, Api, ResourceRoutes};
pub use service::{GraphService, PageQuery};
pub use settings::Settings;
pub use state::{AppState, ResourceState};
pub use store::{ensure_database_exists, GraphStore, GraphTx, MemoryGraph, PgGraph};
pub use telemetry::init_tracing;
