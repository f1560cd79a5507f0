//! Verb operations against the graph. Each call runs in one storage transaction that commits
//! on success and rolls back on any error or timeout.

use crate::error::AppError;
use crate::inflect::{pluralize, singularize};
use crate::model::{AddressingContext, AttributeKind, EntityType, RelationDef, SecondaryAddress};
use crate::service::transport::{related_to_transport_map, to_transport_map};
use crate::service::validation::RequestValidator;
use crate::settings::Settings;
use crate::store::{GraphStore, GraphTx, Node, Properties, SortOrder};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

const MAX_LIMIT: u64 = 100;

/// Validated `skip` / `limit` / `order_by` of an index request.
#[derive(Clone, Debug, PartialEq)]
pub struct PageQuery {
    pub skip: u64,
    pub limit: u64,
    pub order_by: String,
}

impl PageQuery {
    /// Parse query parameters; missing ones take their defaults (`0`, `default_limit`, `?`).
    pub fn parse(params: &HashMap<String, String>, default_limit: u64) -> Result<Self, AppError> {
        let mut errors = Vec::new();
        let skip = match params.get("skip").map(|s| s.trim()) {
            None | Some("") => 0,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) if n >= 0 => n as u64,
                Ok(_) => {
                    errors.push("skip: Must be greater than or equal to 0.".to_string());
                    0
                }
                Err(_) => {
                    errors.push("skip: Not a valid integer.".to_string());
                    0
                }
            },
        };
        let limit = match params.get("limit").map(|s| s.trim()) {
            None | Some("") => default_limit,
            Some(raw) => match raw.parse::<i64>() {
                Ok(n) if (1..=MAX_LIMIT as i64).contains(&n) => n as u64,
                Ok(_) => {
                    errors.push(format!("limit: Must be greater than or equal to 1 and less than or equal to {}.", MAX_LIMIT));
                    default_limit
                }
                Err(_) => {
                    errors.push("limit: Not a valid integer.".to_string());
                    default_limit
                }
            },
        };
        let order_by = params
            .get("order_by")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "?".to_string());
        if errors.is_empty() {
            Ok(PageQuery { skip, limit, order_by })
        } else {
            Err(AppError::ValidationFailed(errors))
        }
    }
}

/// Transactional CRUD and relation operations for one resolved request.
#[derive(Clone)]
pub struct GraphService {
    store: Arc<dyn GraphStore>,
    timeout: Duration,
    enable_delete_all: bool,
}

impl GraphService {
    pub fn new(store: Arc<dyn GraphStore>, settings: &Settings) -> Self {
        GraphService {
            store,
            timeout: settings.storage_timeout,
            enable_delete_all: settings.enable_delete_all,
        }
    }

    /// List the primary type, paged and ordered.
    pub async fn index(&self, ctx: &AddressingContext, query: &PageQuery) -> Result<Value, AppError> {
        let entity = &ctx.primary.entity;
        let order = SortOrder::parse(&query.order_by);
        if let Some(field) = order.field() {
            if !entity.has_attribute(field) {
                return Err(AppError::InvalidOrderField(field.to_string()));
            }
        }
        self.timed(async {
            let mut tx = self.store.begin().await?;
            let out = index_in(&mut *tx, ctx, query, &order).await;
            finish(tx, out).await
        })
        .await
    }

    pub async fn get(&self, ctx: &AddressingContext) -> Result<Value, AppError> {
        self.timed(async {
            let mut tx = self.store.begin().await?;
            let out = get_in(&mut *tx, ctx).await;
            finish(tx, out).await
        })
        .await
    }

    /// Create a primary, or attach a relation when a secondary id is addressed.
    pub async fn post(&self, ctx: &AddressingContext, body: Option<&Value>) -> Result<Value, AppError> {
        self.timed(async {
            let mut tx = self.store.begin().await?;
            let out = match &ctx.secondary {
                None => create_in(&mut *tx, ctx, body).await,
                Some(sec) => attach_in(&mut *tx, ctx, sec, body).await,
            };
            finish(tx, out).await
        })
        .await
    }

    /// Replace a primary (delete and recreate), or make one edge the only edge of a relation.
    pub async fn put(&self, ctx: &AddressingContext, body: Option<&Value>) -> Result<Value, AppError> {
        self.timed(async {
            let mut tx = self.store.begin().await?;
            let out = match &ctx.secondary {
                None => replace_in(&mut *tx, ctx, body).await,
                Some(sec) => replace_relation_in(&mut *tx, ctx, sec, body).await,
            };
            finish(tx, out).await
        })
        .await
    }

    /// Merge validated fields onto a primary. Relations cannot be patched.
    pub async fn patch(&self, ctx: &AddressingContext, body: Option<&Value>) -> Result<Value, AppError> {
        if ctx.secondary.is_some() {
            return Err(AppError::BadRequest("relations cannot be patched".into()));
        }
        self.timed(async {
            let mut tx = self.store.begin().await?;
            let out = patch_in(&mut *tx, ctx, body).await;
            finish(tx, out).await
        })
        .await
    }

    /// Delete a primary or one relation edge; with no primary id, delete every instance.
    pub async fn delete(&self, ctx: &AddressingContext) -> Result<Value, AppError> {
        if ctx.primary.id.is_none() {
            return self.delete_all(&ctx.primary.entity).await;
        }
        self.timed(async {
            let mut tx = self.store.begin().await?;
            let out = match &ctx.secondary {
                None => delete_in(&mut *tx, ctx).await,
                Some(sec) => detach_in(&mut *tx, ctx, sec).await,
            };
            finish(tx, out).await
        })
        .await
    }

    pub async fn delete_all(&self, entity: &EntityType) -> Result<Value, AppError> {
        if !self.enable_delete_all {
            return Err(AppError::FeatureDisabled);
        }
        self.timed(async {
            let mut tx = self.store.begin().await?;
            let out = match tx.detach_delete_all(entity).await {
                Ok(true) => {
                    tracing::info!(entity = %entity.name(), "deleted all instances");
                    Ok(ok())
                }
                Ok(false) => Err(AppError::DeleteFailed),
                Err(e) => Err(e.into()),
            };
            finish(tx, out).await
        })
        .await
    }

    async fn timed<T>(&self, op: impl Future<Output = Result<T, AppError>>) -> Result<T, AppError> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(out) => out,
            Err(_) => {
                tracing::warn!(timeout_ms = self.timeout.as_millis() as u64, "storage timed out; transaction dropped");
                Err(AppError::StorageTimeout)
            }
        }
    }
}

/// Commit on success, roll back on failure. A failed rollback is logged, the original error wins.
async fn finish<T>(tx: Box<dyn GraphTx>, out: Result<T, AppError>) -> Result<T, AppError> {
    match out {
        Ok(v) => {
            tx.commit().await?;
            Ok(v)
        }
        Err(e) => {
            if let Err(rollback) = tx.rollback().await {
                tracing::warn!(error = %rollback, "rollback failed");
            }
            Err(e)
        }
    }
}

fn ok() -> Value {
    json!({"result": "OK"})
}

fn selection_result(field: &str, node: &Node) -> Value {
    let mut out = Properties::new();
    out.insert(field.to_string(), node.get(field).cloned().unwrap_or(Value::Null));
    Value::Object(out)
}

async fn index_in(
    tx: &mut dyn GraphTx,
    ctx: &AddressingContext,
    query: &PageQuery,
    order: &SortOrder,
) -> Result<Value, AppError> {
    let entity = &ctx.primary.entity;
    let total = tx.count(entity).await?;
    if total == 0 {
        return Err(AppError::NoItemsExist(ctx.primary.model_name.clone()));
    }
    if query.skip > total {
        return Err(AppError::ValidationFailed(vec![format!(
            "skip: Must be less than or equal to {}.",
            total
        )]));
    }
    let nodes = tx.find_all(entity, order, query.skip, query.limit).await?;
    if nodes.is_empty() {
        return Err(AppError::NoItemsExist(ctx.primary.model_name.clone()));
    }
    let items: Vec<Value> = nodes
        .iter()
        .map(|n| Value::Object(to_transport_map(entity, &n.properties)))
        .collect();
    let mut out = Properties::new();
    out.insert(pluralize(&ctx.primary.model_name), Value::Array(items));
    Ok(Value::Object(out))
}

async fn fetch_primary(tx: &mut dyn GraphTx, ctx: &AddressingContext) -> Result<Node, AppError> {
    let entity = &ctx.primary.entity;
    let missing = || AppError::ItemNotFound(entity.name().to_string());
    let id = ctx.primary.id_value().ok_or_else(missing)?;
    tx.find_one(entity, &ctx.primary.selection_field, &id)
        .await?
        .ok_or_else(missing)
}

async fn fetch_secondary(tx: &mut dyn GraphTx, sec: &SecondaryAddress) -> Result<Node, AppError> {
    let missing = || AppError::ItemNotFound(sec.entity.name().to_string());
    let id = sec.id_value().ok_or_else(missing)?;
    tx.find_one(&sec.entity, &sec.selection_field, &id)
        .await?
        .ok_or_else(missing)
}

/// The relation on the primary type for a mutating verb; absent relations read as a missing item.
fn mutable_relation<'e>(entity: &'e EntityType, sec: &SecondaryAddress) -> Result<&'e RelationDef, AppError> {
    entity
        .relation(&sec.name)
        .ok_or_else(|| AppError::ItemNotFound(sec.name.clone()))
}

async fn get_in(tx: &mut dyn GraphTx, ctx: &AddressingContext) -> Result<Value, AppError> {
    let entity = &ctx.primary.entity;
    let node = fetch_primary(tx, ctx).await?;
    let mut out = Properties::new();
    let Some(sec) = &ctx.secondary else {
        out.insert(
            ctx.primary.model_name.clone(),
            Value::Object(to_transport_map(entity, &node.properties)),
        );
        return Ok(Value::Object(out));
    };

    let relation = entity.relation(&sec.name).ok_or(AppError::RelationNotFound)?;
    let edge_type = relation.edge.as_deref();
    let related = tx.all_related(&node, relation).await?;
    match sec.id_value() {
        None => {
            let items: Vec<Value> = related
                .iter()
                .map(|r| Value::Object(related_to_transport_map(&sec.entity, edge_type, r)))
                .collect();
            out.insert(pluralize(&sec.name), Value::Array(items));
        }
        Some(id) => {
            let hit = related
                .iter()
                .find(|r| r.node.get(&sec.selection_field) == Some(&id))
                .ok_or_else(|| AppError::ItemNotFound(sec.entity.name().to_string()))?;
            out.insert(
                singularize(&sec.name),
                Value::Object(related_to_transport_map(&sec.entity, edge_type, hit)),
            );
        }
    }
    Ok(Value::Object(out))
}

async fn create_in(tx: &mut dyn GraphTx, ctx: &AddressingContext, body: Option<&Value>) -> Result<Value, AppError> {
    let entity = &ctx.primary.entity;
    let validated = RequestValidator::validate(body, entity.validation_rules())?;
    if validated.is_empty() {
        return Err(AppError::InvalidProperties);
    }
    tx.lock_type(entity).await?;
    if tx.find_matching(entity, &validated).await?.is_some() {
        return Err(AppError::ItemExists(entity.name().to_string()));
    }
    let properties = instantiate(entity, validated)?;
    let created = tx.create(entity, properties).await?;
    let node = tx.get(created.id).await?.ok_or(AppError::CreateFailed)?;
    tracing::debug!(entity = %entity.name(), id = %node.id, "created");
    Ok(selection_result(&ctx.primary.selection_field, &node))
}

/// Validate an edge payload when the relation has its own data type.
fn edge_data(relation: &RelationDef, body: Option<&Value>) -> Result<Option<Properties>, AppError> {
    match &relation.edge {
        None => Ok(None),
        Some(edge) => {
            let validated = RequestValidator::validate(body, edge.validation_rules())?;
            instantiate(edge, validated).map(Some)
        }
    }
}

async fn attach_in(
    tx: &mut dyn GraphTx,
    ctx: &AddressingContext,
    sec: &SecondaryAddress,
    body: Option<&Value>,
) -> Result<Value, AppError> {
    let relation = mutable_relation(&ctx.primary.entity, sec)?;
    let node = fetch_primary(tx, ctx).await?;
    let other = fetch_secondary(tx, sec).await?;
    if tx.relation_exists(&node, relation, &other).await? {
        return Err(AppError::RelationExists);
    }
    let data = edge_data(relation, body)?;
    if !tx.connect(&node, relation, &other, data).await? {
        return Err(AppError::CreateFailed);
    }
    Ok(ok())
}

async fn replace_in(tx: &mut dyn GraphTx, ctx: &AddressingContext, body: Option<&Value>) -> Result<Value, AppError> {
    let entity = &ctx.primary.entity;
    tx.lock_type(entity).await?;
    let old = fetch_primary(tx, ctx).await?;
    let validated = RequestValidator::validate(body, entity.validation_rules())?;
    if validated.is_empty() {
        return Err(AppError::InvalidProperties);
    }
    tracing::debug!(entity = %entity.name(), id = %old.id, "replacing node; its relations are dropped");
    if !tx.delete(&old).await? {
        return Err(AppError::DeleteFailed);
    }
    let properties = instantiate(entity, validated)?;
    let created = tx.create(entity, properties).await?;
    let node = tx.get(created.id).await?.ok_or(AppError::UpdateFailed)?;
    Ok(selection_result(&ctx.primary.selection_field, &node))
}

async fn replace_relation_in(
    tx: &mut dyn GraphTx,
    ctx: &AddressingContext,
    sec: &SecondaryAddress,
    body: Option<&Value>,
) -> Result<Value, AppError> {
    let relation = mutable_relation(&ctx.primary.entity, sec)?;
    let node = fetch_primary(tx, ctx).await?;
    let other = fetch_secondary(tx, sec).await?;
    let data = edge_data(relation, body)?;
    let dropped = tx.disconnect_all(&node, relation).await?;
    tracing::debug!(relation = %relation.name, dropped, "replacing relation");
    if !tx.connect(&node, relation, &other, data).await? {
        return Err(AppError::UpdateFailed);
    }
    Ok(ok())
}

async fn patch_in(tx: &mut dyn GraphTx, ctx: &AddressingContext, body: Option<&Value>) -> Result<Value, AppError> {
    let entity = &ctx.primary.entity;
    let node = fetch_primary(tx, ctx).await?;
    let validated = RequestValidator::validate_partial(body, entity.validation_rules())?;
    if validated.is_empty() {
        return Err(AppError::InvalidProperties);
    }
    tx.lock_type(entity).await?;
    let updated = tx.update(entity, &node, validated).await?;
    tx.get(updated.id).await?.ok_or(AppError::UpdateFailed)?;
    Ok(ok())
}

async fn delete_in(tx: &mut dyn GraphTx, ctx: &AddressingContext) -> Result<Value, AppError> {
    let node = fetch_primary(tx, ctx).await?;
    if !tx.delete(&node).await? {
        return Err(AppError::DeleteFailed);
    }
    Ok(ok())
}

async fn detach_in(tx: &mut dyn GraphTx, ctx: &AddressingContext, sec: &SecondaryAddress) -> Result<Value, AppError> {
    let relation = mutable_relation(&ctx.primary.entity, sec)?;
    let node = fetch_primary(tx, ctx).await?;
    let other = fetch_secondary(tx, sec).await?;
    if !tx.relation_exists(&node, relation, &other).await? {
        return Err(AppError::RelationDoesNotExist);
    }
    tx.disconnect(&node, relation, &other).await?;
    if tx.relation_exists(&node, relation, &other).await? {
        return Err(AppError::DeleteFailed);
    }
    Ok(ok())
}

/// Complete a validated payload from the type: declared defaults, generated unique ids,
/// then the required-attribute check.
pub(crate) fn instantiate(entity: &EntityType, mut properties: Properties) -> Result<Properties, AppError> {
    for attr in entity.attributes() {
        let present = properties.get(&attr.name).map(|v| !v.is_null()).unwrap_or(false);
        if present {
            continue;
        }
        if let Some(default) = &attr.default {
            properties.insert(attr.name.clone(), default.clone());
        } else if attr.kind == AttributeKind::UniqueId {
            properties.insert(
                attr.name.clone(),
                Value::String(uuid::Uuid::new_v4().simple().to_string()),
            );
        } else if attr.required {
            return Err(AppError::RequiredPropertyMissing(attr.name.clone()));
        }
    }
    Ok(properties)
}
