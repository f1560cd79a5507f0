#![allow(dead_code)]

use axum::{
    body::{to_bytes, Body},
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use graph_rest::{
    Api, AppState, Attribute, AttributeKind, AuthGate, EntityType, FieldKind, FieldRule, MemoryGraph, RelationDef,
    ResourceDescriptor, Settings, ValidationSchema,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

pub struct TestApp {
    pub router: Router,
    pub store: Arc<MemoryGraph>,
}

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

fn user() -> Arc<EntityType> {
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
        .relation(RelationDef::outgoing("pets", "HAS_PET", "Pet").with_edge(pet_info()))
        .rules(rules)
        .filtered("secret_field")
        .build()
}

pub fn app_with(settings: Settings, gate: AuthGate) -> TestApp {
    let store = Arc::new(MemoryGraph::new());
    let state = AppState::new(store.clone(), settings).with_auth(gate);
    let (user, pet) = (user(), pet());
    let users = ResourceDescriptor::builder("users", user.clone(), "uid")
        .secondary("pets", pet.clone(), "pet_id")
        .secondary("friends", user.clone(), "uid")
        .build()
        .unwrap();
    let pets = ResourceDescriptor::builder("pets", pet, "pet_id")
        .secondary("owner", user, "uid")
        .build()
        .unwrap();
    let router = Api::new(state)
        .resource(users)
        .unwrap()
        .resource(pets)
        .unwrap()
        .into_router();
    TestApp { router, store }
}

pub fn app() -> TestApp {
    app_with(Settings::default(), AuthGate::new())
}

pub struct Reply {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub text: String,
}

impl Reply {
    pub fn json(&self) -> Value {
        serde_json::from_str(&self.text).unwrap_or(Value::Null)
    }
}

pub async fn send_request(router: &Router, request: Request<Body>) -> Reply {
    let res = router.clone().oneshot(request).await.unwrap();
    let status = res.status();
    let headers = res.headers().clone();
    let bytes = to_bytes(res.into_body(), usize::MAX).await.unwrap();
    Reply {
        status,
        headers,
        text: String::from_utf8_lossy(&bytes).into_owned(),
    }
}

pub async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(b) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(b.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let reply = send_request(router, request).await;
    let body = reply.json();
    (reply.status, body)
}

/// POST a user and return its generated uid.
pub async fn create_user(router: &Router, first_name: &str, phone: &str) -> String {
    let (status, body) = send(
        router,
        Method::POST,
        "/users",
        Some(json!({"first_name": first_name, "phone_number": phone})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["uid"].as_str().unwrap().to_string()
}

pub async fn create_pet(router: &Router, name: &str) -> String {
    let (status, body) = send(router, Method::POST, "/pets", Some(json!({"name": name}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    body["pet_id"].as_str().unwrap().to_string()
}
