//! Verb handlers for a registered resource. Each one resolves the path first, so an unknown
//! relation name is rejected before storage is touched.

use crate::error::AppError;
use crate::extractors::{Format, PathParams};
use crate::model::{resolve, AddressingContext};
use crate::response::reply;
use crate::service::PageQuery;
use crate::state::ResourceState;
use axum::{
    body::Bytes,
    extract::{Query, State},
    response::Response,
};
use serde_json::Value;
use std::collections::HashMap;

/// Empty body means no payload; anything else must be JSON.
fn parse_body(body: &Bytes) -> Result<Option<Value>, AppError> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(body)
        .map(Some)
        .map_err(|e| AppError::ValidationFailed(vec![format!("_schema: Invalid JSON body: {}", e)]))
}

/// Edge payload for relation writes. Only relations with their own data type read the body.
fn edge_body(ctx: &AddressingContext, body: &Bytes) -> Result<Option<Value>, AppError> {
    let carries_data = ctx
        .secondary
        .as_ref()
        .and_then(|sec| ctx.primary.entity.relation(&sec.name))
        .map_or(false, |relation| relation.edge.is_some());
    if carries_data {
        parse_body(body)
    } else {
        Ok(None)
    }
}

pub async fn index(
    State(state): State<ResourceState>,
    format: Format,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, None, None, None)?;
        let query = PageQuery::parse(&params, state.app.settings.query_limit)?;
        tracing::debug!(resource = %state.descriptor.path(), ?query, "index");
        state.app.graph().index(&ctx, &query).await
    }
    .await;
    reply(format, result)
}

pub async fn create(State(state): State<ResourceState>, format: Format, body: Bytes) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, None, None, None)?;
        let body = parse_body(&body)?;
        tracing::debug!(resource = %state.descriptor.path(), "create");
        state.app.graph().post(&ctx, body.as_ref()).await
    }
    .await;
    reply(format, result)
}

/// Bulk delete of every primary instance; refused unless enabled in settings.
pub async fn delete_all(State(state): State<ResourceState>, format: Format) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, None, None, None)?;
        tracing::debug!(resource = %state.descriptor.path(), "delete all");
        state.app.graph().delete(&ctx).await
    }
    .await;
    reply(format, result)
}

pub async fn get_primary(
    State(state): State<ResourceState>,
    format: Format,
    PathParams(primary_id): PathParams<String>,
) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, Some(&primary_id), None, None)?;
        state.app.graph().get(&ctx).await
    }
    .await;
    reply(format, result)
}

pub async fn replace_primary(
    State(state): State<ResourceState>,
    format: Format,
    PathParams(primary_id): PathParams<String>,
    body: Bytes,
) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, Some(&primary_id), None, None)?;
        let body = parse_body(&body)?;
        state.app.graph().put(&ctx, body.as_ref()).await
    }
    .await;
    reply(format, result)
}

pub async fn patch_primary(
    State(state): State<ResourceState>,
    format: Format,
    PathParams(primary_id): PathParams<String>,
    body: Bytes,
) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, Some(&primary_id), None, None)?;
        let body = parse_body(&body)?;
        state.app.graph().patch(&ctx, body.as_ref()).await
    }
    .await;
    reply(format, result)
}

pub async fn delete_primary(
    State(state): State<ResourceState>,
    format: Format,
    PathParams(primary_id): PathParams<String>,
) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, Some(&primary_id), None, None)?;
        state.app.graph().delete(&ctx).await
    }
    .await;
    reply(format, result)
}

pub async fn get_related(
    State(state): State<ResourceState>,
    format: Format,
    PathParams((primary_id, relation)): PathParams<(String, String)>,
) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, Some(&primary_id), Some(&relation), None)?;
        state.app.graph().get(&ctx).await
    }
    .await;
    reply(format, result)
}

pub async fn get_one_related(
    State(state): State<ResourceState>,
    format: Format,
    PathParams((primary_id, relation, secondary_id)): PathParams<(String, String, String)>,
) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, Some(&primary_id), Some(&relation), Some(&secondary_id))?;
        state.app.graph().get(&ctx).await
    }
    .await;
    reply(format, result)
}

/// Connect primary and secondary; the body is the edge data when the relation has a data type.
pub async fn attach(
    State(state): State<ResourceState>,
    format: Format,
    PathParams((primary_id, relation, secondary_id)): PathParams<(String, String, String)>,
    body: Bytes,
) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, Some(&primary_id), Some(&relation), Some(&secondary_id))?;
        let body = edge_body(&ctx, &body)?;
        state.app.graph().post(&ctx, body.as_ref()).await
    }
    .await;
    reply(format, result)
}

pub async fn replace_relation(
    State(state): State<ResourceState>,
    format: Format,
    PathParams((primary_id, relation, secondary_id)): PathParams<(String, String, String)>,
    body: Bytes,
) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, Some(&primary_id), Some(&relation), Some(&secondary_id))?;
        let body = edge_body(&ctx, &body)?;
        state.app.graph().put(&ctx, body.as_ref()).await
    }
    .await;
    reply(format, result)
}

pub async fn detach(
    State(state): State<ResourceState>,
    format: Format,
    PathParams((primary_id, relation, secondary_id)): PathParams<(String, String, String)>,
) -> Response {
    let result = async {
        let ctx = resolve(&state.descriptor, Some(&primary_id), Some(&relation), Some(&secondary_id))?;
        state.app.graph().delete(&ctx).await
    }
    .await;
    reply(format, result)
}
