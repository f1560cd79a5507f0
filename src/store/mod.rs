//! Graph storage collaborator. Every request runs its reads and writes inside one [`GraphTx`].

mod memory;
mod postgres;

pub use memory::MemoryGraph;
pub use postgres::{ensure_database_exists, ensure_graph_tables, PgGraph};

use crate::model::{EntityType, RelationDef};
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::cmp::Ordering;
use thiserror::Error;
use uuid::Uuid;

pub type NodeId = Uuid;
pub type Properties = Map<String, Value>;

#[derive(Clone, Debug, PartialEq)]
pub struct Node {
    pub id: NodeId,
    pub label: String,
    pub properties: Properties,
}

impl Node {
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.properties.get(field)
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Edge {
    pub id: Uuid,
    pub label: String,
    pub from: NodeId,
    pub to: NodeId,
    pub properties: Properties,
}

/// A node reached over a relation, with the edge that reached it.
#[derive(Clone, Debug)]
pub struct Related {
    pub node: Node,
    pub edge: Edge,
}

/// Ordering for paged listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SortOrder {
    Unordered,
    Asc(String),
    Desc(String),
}

impl SortOrder {
    /// `?` is unordered, a leading `-` sorts descending.
    pub fn parse(order_by: &str) -> Self {
        let order_by = order_by.trim();
        if order_by.is_empty() || order_by == "?" {
            SortOrder::Unordered
        } else if let Some(field) = order_by.strip_prefix('-') {
            SortOrder::Desc(field.to_string())
        } else {
            SortOrder::Asc(order_by.to_string())
        }
    }

    pub fn field(&self) -> Option<&str> {
        match self {
            SortOrder::Unordered => None,
            SortOrder::Asc(f) | SortOrder::Desc(f) => Some(f),
        }
    }
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("unique constraint on {label}.{field}")]
    UniqueViolation { label: String, field: String },
    #[error("node {0} no longer exists")]
    MissingNode(NodeId),
    #[error("edge {label} already joins these nodes")]
    DuplicateEdge { label: String },
    #[error("database: {0}")]
    Db(#[from] sqlx::Error),
    #[error("{0}")]
    Backend(String),
}

#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Open a transaction. Dropping it without [`GraphTx::commit`] discards its writes.
    async fn begin(&self) -> Result<Box<dyn GraphTx>, StoreError>;

    /// Cheap reachability check behind `/ready`.
    async fn ping(&self) -> Result<(), StoreError>;
}

#[async_trait]
pub trait GraphTx: Send {
    /// Serialize writers of the type until this transaction ends. Taken before the
    /// existence and uniqueness checks that precede a write.
    async fn lock_type(&mut self, entity: &EntityType) -> Result<(), StoreError>;

    async fn find_one(&mut self, entity: &EntityType, field: &str, value: &Value) -> Result<Option<Node>, StoreError>;

    async fn find_many(&mut self, entity: &EntityType, field: &str, value: &Value) -> Result<Vec<Node>, StoreError>;

    /// First node whose properties contain every given pair.
    async fn find_matching(&mut self, entity: &EntityType, properties: &Properties) -> Result<Option<Node>, StoreError>;

    /// The window `[skip, skip + limit)` of all nodes of the type.
    async fn find_all(
        &mut self,
        entity: &EntityType,
        order: &SortOrder,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Node>, StoreError>;

    async fn count(&mut self, entity: &EntityType) -> Result<u64, StoreError>;

    /// Re-read a node, picking up generated fields.
    async fn get(&mut self, id: NodeId) -> Result<Option<Node>, StoreError>;

    async fn create(&mut self, entity: &EntityType, properties: Properties) -> Result<Node, StoreError>;

    /// Merge properties onto an existing node.
    async fn update(&mut self, entity: &EntityType, node: &Node, properties: Properties) -> Result<Node, StoreError>;

    /// Delete a node together with its edges.
    async fn delete(&mut self, node: &Node) -> Result<bool, StoreError>;

    async fn connect(
        &mut self,
        from: &Node,
        relation: &RelationDef,
        to: &Node,
        data: Option<Properties>,
    ) -> Result<bool, StoreError>;

    async fn disconnect(&mut self, from: &Node, relation: &RelationDef, to: &Node) -> Result<bool, StoreError>;

    /// Remove every edge of the relation from the node; returns how many went.
    async fn disconnect_all(&mut self, from: &Node, relation: &RelationDef) -> Result<u64, StoreError>;

    async fn all_related(&mut self, node: &Node, relation: &RelationDef) -> Result<Vec<Related>, StoreError>;

    async fn relation_exists(&mut self, node: &Node, relation: &RelationDef, candidate: &Node) -> Result<bool, StoreError>;

    /// Delete every node of the type and all their edges.
    async fn detach_delete_all(&mut self, entity: &EntityType) -> Result<bool, StoreError>;

    async fn commit(self: Box<Self>) -> Result<(), StoreError>;

    async fn rollback(self: Box<Self>) -> Result<(), StoreError>;
}

/// Ordering between property values: numbers numerically, strings lexically, absent last.
pub(crate) fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None | Some(Value::Null), None | Some(Value::Null)) => Ordering::Equal,
        (None | Some(Value::Null), _) => Ordering::Greater,
        (_, None | Some(Value::Null)) => Ordering::Less,
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        (Some(x), Some(y)) => x.to_string().cmp(&y.to_string()),
    }
}
