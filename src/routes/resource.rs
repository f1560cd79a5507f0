//! Routes for one resource: the built-in verb table plus custom routes, gated or exempt.

use crate::auth::{require_auth, GateState};
use crate::handlers::resource::{
    attach, create, delete_all, delete_primary, detach, get_one_related, get_primary, get_related, index,
    patch_primary, replace_primary, replace_relation,
};
use crate::model::ResourceDescriptor;
use crate::routes::rejections::envelope_rejections;
use crate::state::{AppState, ResourceState};
use axum::{extract::DefaultBodyLimit, middleware, routing::get, routing::MethodRouter, Router};
use std::sync::Arc;
use tower_http::limit::RequestBodyLimitLayer;

/// Path parameter names are shared by built-in and custom routes: `:primary_id`,
/// `:relation`, `:secondary_id`.
pub struct ResourceRoutes {
    state: ResourceState,
    gated: Router<ResourceState>,
    exempt: Router<ResourceState>,
}

impl ResourceRoutes {
    pub fn new(app: AppState, descriptor: ResourceDescriptor) -> Self {
        let base = format!("/{}", descriptor.path());
        let gated = Router::new()
            .route(&base, get(index).post(create).delete(delete_all))
            .route(&format!("{}/", base), get(index).post(create).delete(delete_all))
            .route(
                &format!("{}/:primary_id", base),
                get(get_primary)
                    .put(replace_primary)
                    .patch(patch_primary)
                    .delete(delete_primary),
            )
            .route(&format!("{}/:primary_id/:relation", base), get(get_related))
            .route(
                &format!("{}/:primary_id/:relation/:secondary_id", base),
                get(get_one_related)
                    .post(attach)
                    .put(replace_relation)
                    .delete(detach),
            );
        ResourceRoutes {
            state: ResourceState {
                app,
                descriptor: Arc::new(descriptor),
            },
            gated,
            exempt: Router::new(),
        }
    }

    pub fn path(&self) -> &str {
        self.state.descriptor.path()
    }

    /// Add a custom route behind the auth gate. `path` is relative to the resource base,
    /// e.g. `/:primary_id/owner`.
    pub fn route(mut self, path: &str, method_router: MethodRouter<ResourceState>) -> Self {
        let full = self.full_path(path);
        self.gated = self.gated.route(&full, method_router);
        self
    }

    /// Add a custom route that skips the auth gate.
    pub fn exempt_route(mut self, path: &str, method_router: MethodRouter<ResourceState>) -> Self {
        let full = self.full_path(path);
        self.exempt = self.exempt.route(&full, method_router);
        self
    }

    fn full_path(&self, path: &str) -> String {
        format!("/{}/{}", self.path(), path.trim_start_matches('/'))
    }

    pub fn into_router(self) -> Router {
        let gate = GateState {
            gate: self.state.app.auth.clone(),
            resource: Arc::from(self.state.descriptor.path()),
        };
        let max_body = self.state.app.settings.max_body_bytes;
        self.gated
            .route_layer(middleware::from_fn_with_state(gate, require_auth))
            .merge(self.exempt)
            .layer(DefaultBodyLimit::disable())
            .layer(RequestBodyLimitLayer::new(max_body))
            .layer(middleware::from_fn(envelope_rejections))
            .with_state(self.state)
    }
}

/// Router for one descriptor with only the built-in routes.
pub fn resource_routes(app: AppState, descriptor: ResourceDescriptor) -> Router {
    ResourceRoutes::new(app, descriptor).into_router()
}
