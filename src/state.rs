//! Shared application state: storage handle, settings and the auth gate.

use crate::auth::AuthGate;
use crate::model::ResourceDescriptor;
use crate::service::GraphService;
use crate::settings::Settings;
use crate::store::{GraphStore, MemoryGraph, PgGraph, StoreError};
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GraphStore>,
    pub settings: Arc<Settings>,
    pub auth: AuthGate,
}

impl AppState {
    pub fn new(store: Arc<dyn GraphStore>, settings: Settings) -> Self {
        AppState {
            store,
            settings: Arc::new(settings),
            auth: AuthGate::default(),
        }
    }

    pub fn with_auth(mut self, auth: AuthGate) -> Self {
        self.auth = auth;
        self
    }

    /// Open the store named by `DB_URL`: the in-process graph or PostgreSQL.
    pub async fn connect(settings: Settings) -> Result<Self, StoreError> {
        let store: Arc<dyn GraphStore> = if settings.uses_memory_store() {
            tracing::info!("using in-memory graph store");
            Arc::new(MemoryGraph::new())
        } else {
            tracing::info!(schema = %settings.graph_schema, "using PostgreSQL graph store");
            Arc::new(PgGraph::connect(&settings.db_url, &settings.graph_schema).await?)
        };
        Ok(Self::new(store, settings))
    }

    pub fn graph(&self) -> GraphService {
        GraphService::new(self.store.clone(), &self.settings)
    }
}

/// State of one resource's routes.
#[derive(Clone)]
pub struct ResourceState {
    pub app: AppState,
    pub descriptor: Arc<ResourceDescriptor>,
}
