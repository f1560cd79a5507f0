//! Users and pets over the graph store. `DB_URL=memory://` (default) runs without a database;
//! set `DB_URL=postgres://...` to persist. With `SECRET_KEY` set, every resource route requires
//! an `X-Auth-Token` header carrying it, except `GET /pets/:pet_id/owner`.

use axum::{
    extract::State,
    http::StatusCode,
    response::Response,
    routing::get,
};
use graph_rest::{
    init_tracing, render, reply, service::to_transport_map, token_authenticator, Api, AppError, AppState, Attribute,
    AttributeKind, AuthGate, EntityType, FieldKind, FieldRule, Format, PathParams, RelationDef, ResourceDescriptor,
    ResourceRoutes, ResourceState, Settings, ValidationSchema,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::net::TcpListener;

fn pet_info() -> Arc<EntityType> {
    EntityType::builder("PetInfo")
        .attribute(Attribute::new("adopted_since", AttributeKind::Integer))
        .build()
}

fn pet() -> Arc<EntityType> {
    EntityType::builder("Pet")
        .attribute(Attribute::new("pet_id", AttributeKind::UniqueId))
        .attribute(Attribute::new("name", AttributeKind::String))
        .relation(RelationDef::incoming("owner", "HAS_PET", "User"))
        .build()
}

fn user(pet_info: Arc<EntityType>) -> Arc<EntityType> {
    let rules = ValidationSchema::new()
        .with("first_name", FieldRule::new(FieldKind::String))
        .with("last_name", FieldRule::new(FieldKind::String))
        .with("secret_field", FieldRule::new(FieldKind::String))
        .with("phone_number", FieldRule::new(FieldKind::String).required());
    EntityType::builder("User")
        .attribute(Attribute::new("uid", AttributeKind::UniqueId))
        .attribute(Attribute::new("first_name", AttributeKind::String))
        .attribute(Attribute::new("last_name", AttributeKind::String))
        .attribute(Attribute::new("phone_number", AttributeKind::String).required().unique())
        .attribute(Attribute::new("secret_field", AttributeKind::String).default_value(json!("secret")))
        .relation(RelationDef::outgoing("pets", "HAS_PET", "Pet").with_edge(pet_info))
        .rules(rules)
        .filtered("secret_field")
        .build()
}

/// GET /pets/:primary_id/owner
async fn owner(
    State(state): State<ResourceState>,
    format: Format,
    PathParams(primary_id): PathParams<String>,
) -> Response {
    let pet = state.descriptor.primary().clone();
    let result: Result<Option<Value>, AppError> = async {
        let (Some(relation), Some(binding)) = (pet.relation("owner"), state.descriptor.secondary("owner")) else {
            return Err(AppError::RelationNotFound);
        };
        let mut tx = state.app.store.begin().await?;
        let id = Value::String(primary_id.trim().to_string());
        let Some(node) = tx.find_one(&pet, state.descriptor.selection_field(), &id).await? else {
            return Err(AppError::ItemNotFound("Pet".into()));
        };
        let related = tx.all_related(&node, relation).await?;
        tx.rollback().await?;
        Ok(related
            .first()
            .map(|r| Value::Object(to_transport_map(&binding.entity, &r.node.properties))))
    }
    .await;
    match result {
        Ok(Some(owner)) => render(format, StatusCode::OK, &json!({ "owner": owner })),
        Ok(None) => render(
            format,
            StatusCode::NOT_FOUND,
            &json!({ "errors": ["Selected pet has not been adopted yet!"] }),
        ),
        Err(e) => reply(format, Err(e)),
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let settings = Settings::from_env()?;
    let _guard = init_tracing(&settings)?;

    let addr = settings.listen_addr();
    let secret = settings.secret_key.clone();
    let mut state = AppState::connect(settings).await?;
    if let Some(secret) = secret {
        state = state.with_auth(AuthGate::new().with_authenticate(token_authenticator(secret)));
    }

    let pet = pet();
    let user = user(pet_info());
    let users = ResourceDescriptor::builder("users", user.clone(), "uid")
        .secondary("pets", pet.clone(), "pet_id")
        .build()?;
    let pets = ResourceDescriptor::builder("pets", pet, "pet_id")
        .secondary("owner", user, "uid")
        .build()?;

    let app = Api::new(state.clone())
        .resource(users)?
        .routes(ResourceRoutes::new(state, pets).exempt_route("/:primary_id/owner", get(owner)))?
        .into_router();

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("listening on {}", listener.local_addr()?);
    axum::serve(listener, app).await?;
    Ok(())
}
