mod common;

use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
};
use common::*;
use graph_rest::{token_authenticator, AuthGate, GraphStore, GraphTx, Settings};
use serde_json::json;
use std::time::Duration;

#[tokio::test]
async fn create_get_patch_round_trip() {
    let app = app();
    let uid = create_user(&app.router, "x", "555-0100").await;

    let (status, body) = send(&app.router, Method::GET, &format!("/users/{}", uid), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["uid"], json!(uid));
    assert_eq!(body["user"]["first_name"], json!("x"));
    assert!(body["user"].get("secret_field").is_none());

    let (status, body) = send(
        &app.router,
        Method::PATCH,
        &format!("/users/{}", uid),
        Some(json!({"first_name": "y"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": "OK"}));

    let (_, body) = send(&app.router, Method::GET, &format!("/users/{}", uid), None).await;
    assert_eq!(body["user"]["first_name"], json!("y"));
    assert_eq!(body["user"]["phone_number"], json!("555-0100"));
}

#[tokio::test]
async fn delete_twice_is_not_found() {
    let app = app();
    let uid = create_user(&app.router, "x", "1").await;
    let uri = format!("/users/{}", uid);

    let (status, body) = send(&app.router, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": "OK"}));

    let (status, body) = send(&app.router, Method::DELETE, &uri, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"errors": ["User does not exist."]}));
}

#[tokio::test]
async fn duplicate_create_conflicts() {
    let app = app();
    create_user(&app.router, "x", "1").await;
    let payload = json!({"first_name": "x", "phone_number": "1"});
    for _ in 0..2 {
        let (status, body) = send(&app.router, Method::POST, "/users", Some(payload.clone())).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"errors": ["User exists."]}));
    }
    assert_eq!(app.store.committed_count("User").await, 1);

    let (status, body) = send(
        &app.router,
        Method::POST,
        "/users",
        Some(json!({"first_name": "other", "phone_number": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert!(body["errors"][0].as_str().unwrap().contains("phone_number"));
}

#[tokio::test]
async fn create_validation_errors() {
    let app = app();
    let (status, body) = send(&app.router, Method::POST, "/users", Some(json!({"first_name": 3}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let errors = body["errors"].as_array().unwrap();
    assert_eq!(errors[0], json!("One or more of the required fields is missing or incorrect."));
    assert_eq!(errors.len(), 3);

    let (status, _) = send(&app.router, Method::POST, "/users", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);

    let (status, body) = send(&app.router, Method::POST, "/pets", Some(json!({"colour": "brown"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({"errors": ["A property is invalid, missing or misspelled!"]}));
}

#[tokio::test]
async fn index_pages_and_orders() {
    let app = app();
    for name in ["c", "a", "e", "b", "d"] {
        create_pet(&app.router, name).await;
    }

    let (status, body) = send(&app.router, Method::GET, "/pets?skip=1&limit=2&order_by=name", None).await;
    assert_eq!(status, StatusCode::OK);
    let names: Vec<&str> = body["pets"].as_array().unwrap().iter().map(|p| p["name"].as_str().unwrap()).collect();
    assert_eq!(names, vec!["b", "c"]);

    let (_, body) = send(&app.router, Method::GET, "/pets?order_by=-name", None).await;
    assert_eq!(body["pets"].as_array().unwrap().len(), 5);
    assert_eq!(body["pets"][0]["name"], json!("e"));

    let (_, body) = send(&app.router, Method::GET, "/pets?skip=3&limit=100", None).await;
    assert_eq!(body["pets"].as_array().unwrap().len(), 2);

    let (status, _) = send(&app.router, Method::GET, "/pets?skip=6", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, _) = send(&app.router, Method::GET, "/pets?limit=0", None).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    let (status, body) = send(&app.router, Method::GET, "/pets?order_by=colour", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"errors": ["Invalid order property: colour"]}));
}

#[tokio::test]
async fn index_of_empty_type_is_not_found() {
    let app = app();
    let (status, body) = send(&app.router, Method::GET, "/pets", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"errors": ["No pet exists."]}));
}

#[tokio::test]
async fn attach_list_and_detach_relation() {
    let app = app();
    let uid = create_user(&app.router, "x", "1").await;
    let pet_id = create_pet(&app.router, "rex").await;
    let edge = format!("/users/{}/pets/{}", uid, pet_id);

    let (status, body) = send(&app.router, Method::POST, &edge, Some(json!({"adopted_since": 2019}))).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    for _ in 0..2 {
        let (status, body) = send(&app.router, Method::POST, &edge, None).await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body, json!({"errors": ["Relation exists."]}));
    }

    let (status, body) = send(&app.router, Method::GET, &format!("/users/{}/pets", uid), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(
        body,
        json!({"pets": [{"pet_id": pet_id, "name": "rex", "relationship": {"adopted_since": 2019}}]})
    );

    let (_, body) = send(&app.router, Method::GET, &edge, None).await;
    assert_eq!(body["pet"]["name"], json!("rex"));

    let (_, body) = send(&app.router, Method::GET, &format!("/pets/{}/owner", pet_id), None).await;
    assert_eq!(body["owners"][0]["uid"], json!(uid));

    let (status, _) = send(&app.router, Method::DELETE, &edge, None).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app.router, Method::DELETE, &edge, None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({"errors": ["Relation does not exist."]}));
    let (status, _) = send(&app.router, Method::GET, &edge, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn put_relation_leaves_single_edge() {
    let app = app();
    let uid = create_user(&app.router, "x", "1").await;
    let first = create_pet(&app.router, "rex").await;
    let second = create_pet(&app.router, "tom").await;

    send(&app.router, Method::POST, &format!("/users/{}/pets/{}", uid, first), None).await;
    let (status, _) = send(
        &app.router,
        Method::PUT,
        &format!("/users/{}/pets/{}", uid, second),
        Some(json!({"adopted_since": 2021})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, body) = send(&app.router, Method::GET, &format!("/users/{}/pets", uid), None).await;
    let pets = body["pets"].as_array().unwrap();
    assert_eq!(pets.len(), 1);
    assert_eq!(pets[0]["pet_id"], json!(second));
}

#[tokio::test]
async fn put_primary_recreates_node() {
    let app = app();
    let uid = create_user(&app.router, "x", "1").await;
    let (status, body) = send(
        &app.router,
        Method::PUT,
        &format!("/users/{}", uid),
        Some(json!({"first_name": "z", "phone_number": "1"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let new_uid = body["uid"].as_str().unwrap().to_string();
    assert_eq!(app.store.committed_count("User").await, 1);

    let (_, body) = send(&app.router, Method::GET, &format!("/users/{}", new_uid), None).await;
    assert_eq!(body["user"]["first_name"], json!("z"));

    let (status, _) = send(&app.router, Method::PUT, "/users/missing", Some(json!({"phone_number": "2"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn unknown_relation_never_reaches_storage() {
    let app = app();
    for (method, uri) in [
        (Method::GET, "/users/abc/cars"),
        (Method::GET, "/users/abc/cars/1"),
        (Method::POST, "/users/abc/cars/1"),
        (Method::PUT, "/users/abc/cars/1"),
        (Method::DELETE, "/users/abc/cars/1"),
    ] {
        let (status, body) = send(&app.router, method, uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"errors": ["Selected relation does not exist."]}));
    }
    assert_eq!(app.store.calls(), 0);
}

#[tokio::test]
async fn delete_all_is_feature_flagged() {
    let app = app();
    create_user(&app.router, "x", "1").await;
    let (status, body) = send(&app.router, Method::DELETE, "/users", None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body, json!({"errors": ["This feature is disabled."]}));
    assert_eq!(app.store.committed_count("User").await, 1);

    let settings = Settings {
        enable_delete_all: true,
        ..Settings::default()
    };
    let app = app_with(settings, AuthGate::new());
    for i in 0..3 {
        create_user(&app.router, "x", &i.to_string()).await;
    }
    let (status, body) = send(&app.router, Method::DELETE, "/users/", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"result": "OK"}));
    assert_eq!(app.store.committed_count("User").await, 0);
}

#[tokio::test]
async fn yaml_and_xml_output() {
    let app = app();
    let uid = create_user(&app.router, "x", "1").await;

    let request = Request::builder()
        .uri(format!("/users/{}", uid))
        .header(header::ACCEPT, "application/yaml")
        .body(Body::empty())
        .unwrap();
    let reply = send_request(&app.router, request).await;
    assert_eq!(reply.status, StatusCode::OK);
    assert_eq!(reply.headers[header::CONTENT_TYPE], "application/yaml");
    let parsed: serde_json::Value = serde_yaml::from_str(&reply.text).unwrap();
    assert_eq!(parsed["user"]["uid"], json!(uid));

    let request = Request::builder()
        .uri("/users/nobody")
        .header(header::ACCEPT, "application/xml")
        .body(Body::empty())
        .unwrap();
    let reply = send_request(&app.router, request).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);
    assert!(reply.text.starts_with(r#"<?xml version="1.0" encoding="UTF-8" ?><root>"#));
    assert!(reply.text.contains(r#"<errors type="list"><item type="str">User does not exist.</item></errors>"#));
}

#[tokio::test]
async fn auth_gate_guards_resources_only() {
    let app = app_with(Settings::default(), AuthGate::new().with_authenticate(token_authenticator("s3cret")));

    let (status, body) = send(&app.router, Method::GET, "/users", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(body["errors"].is_array());
    assert_eq!(app.store.calls(), 0);

    let request = Request::builder()
        .uri("/users")
        .header("X-Auth-Token", "s3cret")
        .body(Body::empty())
        .unwrap();
    let reply = send_request(&app.router, request).await;
    assert_eq!(reply.status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app.router, Method::GET, "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, json!({"status": "ok"}));
}

#[tokio::test]
async fn storage_timeout_answers_504() {
    let settings = Settings {
        storage_timeout: Duration::from_millis(50),
        ..Settings::default()
    };
    let app = app_with(settings, AuthGate::new());
    let held = app.store.begin().await.unwrap();

    let (status, body) = send(&app.router, Method::GET, "/users", None).await;
    assert_eq!(status, StatusCode::GATEWAY_TIMEOUT);
    assert!(body["errors"].is_array());

    held.rollback().await.unwrap();
    let (status, _) = send(&app.router, Method::GET, "/users", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_json_body_is_rejected() {
    let app = app();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let reply = send_request(&app.router, request).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn patch_edge_cases() {
    let app = app();
    let uid = create_user(&app.router, "x", "1").await;
    let uri = format!("/users/{}", uid);

    let (status, body) = send(&app.router, Method::PATCH, "/users/missing", Some(json!({"first_name": "y"}))).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"errors": ["User does not exist."]}));

    let (status, body) = send(&app.router, Method::PATCH, &uri, Some(json!({"colour": "red"}))).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body, json!({"errors": ["A property is invalid, missing or misspelled!"]}));

    let (status, body) = send(&app.router, Method::PATCH, &uri, Some(json!({"first_name": 3}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"].as_array().unwrap().len() > 1);

    let (_, body) = send(&app.router, Method::GET, &uri, None).await;
    assert_eq!(body["user"]["first_name"], json!("x"));
}

#[tokio::test]
async fn relation_writes_to_missing_secondary_are_not_found() {
    let app = app();
    let uid = create_user(&app.router, "x", "1").await;
    let edge = format!("/users/{}/pets/nope", uid);
    for method in [Method::POST, Method::PUT] {
        let (status, body) = send(&app.router, method, &edge, Some(json!({"adopted_since": 2020}))).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"errors": ["Pet does not exist."]}));
    }
}

#[tokio::test]
async fn bound_but_undeclared_relation() {
    let app = app();
    let uid = create_user(&app.router, "x", "1").await;
    let other = create_user(&app.router, "y", "2").await;

    for uri in [format!("/users/{}/friends", uid), format!("/users/{}/friends/{}", uid, other)] {
        let (status, body) = send(&app.router, Method::GET, &uri, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"errors": ["Selected relation does not exist."]}));
    }
    let edge = format!("/users/{}/friends/{}", uid, other);
    for method in [Method::POST, Method::PUT, Method::DELETE] {
        let (status, body) = send(&app.router, method, &edge, None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body, json!({"errors": ["friends does not exist."]}));
    }
}

#[tokio::test]
async fn skip_equal_to_total_is_empty_window() {
    let app = app();
    for name in ["a", "b"] {
        create_pet(&app.router, name).await;
    }
    let (status, body) = send(&app.router, Method::GET, "/pets?skip=2", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body, json!({"errors": ["No pet exists."]}));
}

#[tokio::test]
async fn put_relation_validates_edge_payload() {
    let app = app();
    let uid = create_user(&app.router, "x", "1").await;
    let pet_id = create_pet(&app.router, "rex").await;
    let edge = format!("/users/{}/pets/{}", uid, pet_id);

    let (status, body) = send(&app.router, Method::PUT, &edge, Some(json!({"adopted_since": "soon"}))).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(body["errors"].is_array());
    let (_, body) = send(&app.router, Method::GET, &format!("/users/{}/pets", uid), None).await;
    assert_eq!(body, json!({"pets": []}));
}

#[tokio::test]
async fn edgeless_relation_ignores_body() {
    let app = app();
    let uid = create_user(&app.router, "x", "1").await;
    let pet_id = create_pet(&app.router, "rex").await;

    let raw = |method: Method, uri: String| {
        Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::from("hello"))
            .unwrap()
    };
    let reply = send_request(&app.router, raw(Method::POST, format!("/pets/{}/owner/{}", pet_id, uid))).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text);
    let reply = send_request(&app.router, raw(Method::PUT, format!("/pets/{}/owner/{}", pet_id, uid))).await;
    assert_eq!(reply.status, StatusCode::OK, "{}", reply.text);

    // a relation with edge data still parses its body
    let reply = send_request(&app.router, raw(Method::PUT, format!("/users/{}/pets/{}", uid, pet_id))).await;
    assert_eq!(reply.status, StatusCode::UNPROCESSABLE_ENTITY);
}

#[tokio::test]
async fn router_rejections_use_error_envelope() {
    let settings = Settings {
        max_body_bytes: 1024,
        ..Settings::default()
    };
    let app = app_with(settings, AuthGate::new());
    let uid = create_user(&app.router, "x", "1").await;
    let pet_id = create_pet(&app.router, "rex").await;

    let cases = [
        (Method::PATCH, format!("/users/{}/pets/{}", uid, pet_id), StatusCode::METHOD_NOT_ALLOWED),
        (Method::POST, format!("/users/{}", uid), StatusCode::METHOD_NOT_ALLOWED),
        (Method::GET, "/users/%FF".to_string(), StatusCode::BAD_REQUEST),
        (Method::GET, "/nowhere/at/all/here".to_string(), StatusCode::NOT_FOUND),
    ];
    for (method, uri, expected) in cases {
        let (status, body) = send(&app.router, method, &uri, None).await;
        assert_eq!(status, expected, "{}", uri);
        assert!(body["errors"].is_array(), "{} -> {}", uri, body);
    }

    let big = "x".repeat(4096);
    let unsized_body = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .body(Body::from(big.clone()))
        .unwrap();
    let sized_body = Request::builder()
        .method(Method::POST)
        .uri("/users")
        .header(header::CONTENT_LENGTH, big.len())
        .header(header::ACCEPT, "application/yaml")
        .body(Body::from(big))
        .unwrap();
    let reply = send_request(&app.router, unsized_body).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert!(reply.json()["errors"].is_array(), "{}", reply.text);
    let reply = send_request(&app.router, sized_body).await;
    assert_eq!(reply.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(reply.headers[header::CONTENT_TYPE], "application/yaml");
    assert!(reply.text.contains("errors"));
}

#[tokio::test]
async fn concurrent_duplicate_creates_store_one_node() {
    let app = app();
    let payload = json!({"first_name": "x", "phone_number": "1"});
    let a = send(&app.router, Method::POST, "/users", Some(payload.clone()));
    let b = send(&app.router, Method::POST, "/users", Some(payload));
    let ((sa, _), (sb, _)) = tokio::join!(a, b);
    let mut statuses = vec![sa, sb];
    statuses.sort();
    assert_eq!(statuses, vec![StatusCode::OK, StatusCode::CONFLICT]);
    assert_eq!(app.store.committed_count("User").await, 1);
}
