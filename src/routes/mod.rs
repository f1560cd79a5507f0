//! Router assembly: common routes plus one route table per registered resource.

mod common;
mod rejections;
mod resource;

pub use common::common_routes;
pub use resource::{resource_routes, ResourceRoutes};

use crate::error::ConfigError;
use crate::model::ResourceDescriptor;
use crate::state::AppState;
use axum::{middleware, Router};
use rejections::{envelope_rejections, unknown_route};
use std::collections::HashSet;

/// Collects resources and builds the application router.
pub struct Api {
    state: AppState,
    resources: Vec<ResourceRoutes>,
    paths: HashSet<String>,
}

impl Api {
    pub fn new(state: AppState) -> Self {
        Api {
            state,
            resources: Vec::new(),
            paths: HashSet::new(),
        }
    }

    pub fn state(&self) -> &AppState {
        &self.state
    }

    /// Register a resource with only the built-in routes.
    pub fn resource(self, descriptor: ResourceDescriptor) -> Result<Self, ConfigError> {
        let routes = ResourceRoutes::new(self.state.clone(), descriptor);
        self.routes(routes)
    }

    /// Register a resource built with custom routes.
    pub fn routes(mut self, routes: ResourceRoutes) -> Result<Self, ConfigError> {
        if !self.paths.insert(routes.path().to_string()) {
            return Err(ConfigError::DuplicatePath(routes.path().to_string()));
        }
        tracing::info!(path = %routes.path(), "registered resource");
        self.resources.push(routes);
        Ok(self)
    }

    pub fn into_router(self) -> Router {
        self.resources
            .into_iter()
            .fold(common_routes(self.state), |router, r| router.merge(r.into_router()))
            .fallback(unknown_route)
            .layer(middleware::from_fn(envelope_rejections))
    }
}
