//! In-process reference store for tests and demos. A transaction holds the graph lock for its
//! whole life, so requests are serialized. The first write copies the graph; commit publishes
//! the copy and a dropped transaction leaves the graph untouched.

use crate::model::{Direction, EntityType, RelationDef};
use crate::store::{
    compare_values, Edge, GraphStore, GraphTx, Node, NodeId, Properties, Related, SortOrder, StoreError,
};
use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

#[derive(Clone, Debug, Default)]
struct Graph {
    nodes: Vec<Node>,
    edges: Vec<Edge>,
}

#[derive(Clone, Default)]
pub struct MemoryGraph {
    graph: Arc<Mutex<Graph>>,
    calls: Arc<AtomicUsize>,
}

impl MemoryGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of storage calls (transactions opened plus operations) so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Nodes currently committed under the label.
    pub async fn committed_count(&self, label: &str) -> usize {
        self.graph.lock().await.nodes.iter().filter(|n| n.label == label).count()
    }
}

#[async_trait]
impl GraphStore for MemoryGraph {
    async fn begin(&self) -> Result<Box<dyn GraphTx>, StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let guard = self.graph.clone().lock_owned().await;
        Ok(Box::new(MemoryTx {
            guard,
            work: None,
            calls: self.calls.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

struct MemoryTx {
    guard: OwnedMutexGuard<Graph>,
    work: Option<Graph>,
    calls: Arc<AtomicUsize>,
}

impl MemoryTx {
    fn tick(&self) {
        self.calls.fetch_add(1, Ordering::SeqCst);
    }

    /// The private copy if this transaction has written, else the committed graph.
    fn view(&self) -> &Graph {
        self.work.as_ref().unwrap_or(&*self.guard)
    }

    fn edit(&mut self) -> &mut Graph {
        let committed = &self.guard;
        self.work.get_or_insert_with(|| Graph::clone(committed))
    }

    fn node(&self, id: NodeId) -> Option<&Node> {
        self.view().nodes.iter().find(|n| n.id == id)
    }

    fn check_unique(&self, entity: &EntityType, properties: &Properties, except: Option<NodeId>) -> Result<(), StoreError> {
        for attr in entity.unique_attributes() {
            let Some(value) = properties.get(&attr.name).filter(|v| !v.is_null()) else {
                continue;
            };
            let clash = self.view().nodes.iter().any(|n| {
                n.label == entity.name() && Some(n.id) != except && n.properties.get(&attr.name) == Some(value)
            });
            if clash {
                return Err(StoreError::UniqueViolation {
                    label: entity.name().to_string(),
                    field: attr.name.clone(),
                });
            }
        }
        Ok(())
    }

    /// Edges of the relation anchored at `node`, paired with the node at the other end.
    fn related(&self, node: &Node, relation: &RelationDef) -> Vec<Related> {
        self.view()
            .edges
            .iter()
            .filter(|e| e.label == relation.label)
            .filter_map(|e| {
                let other = match relation.direction {
                    Direction::Outgoing if e.from == node.id => e.to,
                    Direction::Incoming if e.to == node.id => e.from,
                    _ => return None,
                };
                let other = self.node(other)?;
                (other.label == relation.target).then(|| Related {
                    node: other.clone(),
                    edge: e.clone(),
                })
            })
            .collect()
    }
}

fn endpoints(relation: &RelationDef, node: &Node, other: &Node) -> (NodeId, NodeId) {
    match relation.direction {
        Direction::Outgoing => (node.id, other.id),
        Direction::Incoming => (other.id, node.id),
    }
}

#[async_trait]
impl GraphTx for MemoryTx {
    async fn lock_type(&mut self, _entity: &EntityType) -> Result<(), StoreError> {
        // the graph lock is already held
        Ok(())
    }

    async fn find_one(&mut self, entity: &EntityType, field: &str, value: &Value) -> Result<Option<Node>, StoreError> {
        self.tick();
        Ok(self
            .view()
            .nodes
            .iter()
            .find(|n| n.label == entity.name() && n.properties.get(field) == Some(value))
            .cloned())
    }

    async fn find_many(&mut self, entity: &EntityType, field: &str, value: &Value) -> Result<Vec<Node>, StoreError> {
        self.tick();
        Ok(self
            .view()
            .nodes
            .iter()
            .filter(|n| n.label == entity.name() && n.properties.get(field) == Some(value))
            .cloned()
            .collect())
    }

    async fn find_matching(&mut self, entity: &EntityType, properties: &Properties) -> Result<Option<Node>, StoreError> {
        self.tick();
        Ok(self
            .view()
            .nodes
            .iter()
            .find(|n| n.label == entity.name() && properties.iter().all(|(k, v)| n.properties.get(k) == Some(v)))
            .cloned())
    }

    async fn find_all(
        &mut self,
        entity: &EntityType,
        order: &SortOrder,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Node>, StoreError> {
        self.tick();
        let mut nodes: Vec<&Node> = self.view().nodes.iter().filter(|n| n.label == entity.name()).collect();
        match order {
            SortOrder::Unordered => {}
            SortOrder::Asc(field) => nodes.sort_by(|a, b| compare_values(a.get(field), b.get(field))),
            SortOrder::Desc(field) => nodes.sort_by(|a, b| compare_values(b.get(field), a.get(field))),
        }
        Ok(nodes
            .into_iter()
            .skip(skip as usize)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count(&mut self, entity: &EntityType) -> Result<u64, StoreError> {
        self.tick();
        Ok(self.view().nodes.iter().filter(|n| n.label == entity.name()).count() as u64)
    }

    async fn get(&mut self, id: NodeId) -> Result<Option<Node>, StoreError> {
        self.tick();
        Ok(self.node(id).cloned())
    }

    async fn create(&mut self, entity: &EntityType, properties: Properties) -> Result<Node, StoreError> {
        self.tick();
        self.check_unique(entity, &properties, None)?;
        let node = Node {
            id: Uuid::new_v4(),
            label: entity.name().to_string(),
            properties,
        };
        self.edit().nodes.push(node.clone());
        Ok(node)
    }

    async fn update(&mut self, entity: &EntityType, node: &Node, properties: Properties) -> Result<Node, StoreError> {
        self.tick();
        self.check_unique(entity, &properties, Some(node.id))?;
        let existing = self
            .edit()
            .nodes
            .iter_mut()
            .find(|n| n.id == node.id)
            .ok_or(StoreError::MissingNode(node.id))?;
        for (k, v) in properties {
            existing.properties.insert(k, v);
        }
        Ok(existing.clone())
    }

    async fn delete(&mut self, node: &Node) -> Result<bool, StoreError> {
        self.tick();
        if !self.view().nodes.iter().any(|n| n.id == node.id) {
            return Ok(false);
        }
        let graph = self.edit();
        graph.nodes.retain(|n| n.id != node.id);
        graph.edges.retain(|e| e.from != node.id && e.to != node.id);
        Ok(true)
    }

    async fn connect(
        &mut self,
        from: &Node,
        relation: &RelationDef,
        to: &Node,
        data: Option<Properties>,
    ) -> Result<bool, StoreError> {
        self.tick();
        if self.node(from.id).is_none() {
            return Err(StoreError::MissingNode(from.id));
        }
        if self.node(to.id).is_none() {
            return Err(StoreError::MissingNode(to.id));
        }
        let (a, b) = endpoints(relation, from, to);
        self.edit().edges.push(Edge {
            id: Uuid::new_v4(),
            label: relation.label.clone(),
            from: a,
            to: b,
            properties: data.unwrap_or_default(),
        });
        Ok(true)
    }

    async fn disconnect(&mut self, from: &Node, relation: &RelationDef, to: &Node) -> Result<bool, StoreError> {
        self.tick();
        let (a, b) = endpoints(relation, from, to);
        let matches = |e: &Edge| e.label == relation.label && e.from == a && e.to == b;
        if !self.view().edges.iter().any(matches) {
            return Ok(false);
        }
        self.edit().edges.retain(|e| !matches(e));
        Ok(true)
    }

    async fn disconnect_all(&mut self, from: &Node, relation: &RelationDef) -> Result<u64, StoreError> {
        self.tick();
        let doomed: Vec<Uuid> = self.related(from, relation).into_iter().map(|r| r.edge.id).collect();
        if !doomed.is_empty() {
            self.edit().edges.retain(|e| !doomed.contains(&e.id));
        }
        Ok(doomed.len() as u64)
    }

    async fn all_related(&mut self, node: &Node, relation: &RelationDef) -> Result<Vec<Related>, StoreError> {
        self.tick();
        Ok(self.related(node, relation))
    }

    async fn relation_exists(&mut self, node: &Node, relation: &RelationDef, candidate: &Node) -> Result<bool, StoreError> {
        self.tick();
        Ok(self.related(node, relation).iter().any(|r| r.node.id == candidate.id))
    }

    async fn detach_delete_all(&mut self, entity: &EntityType) -> Result<bool, StoreError> {
        self.tick();
        let doomed: Vec<NodeId> = self
            .view()
            .nodes
            .iter()
            .filter(|n| n.label == entity.name())
            .map(|n| n.id)
            .collect();
        let graph = self.edit();
        graph.nodes.retain(|n| n.label != entity.name());
        graph
            .edges
            .retain(|e| !doomed.contains(&e.from) && !doomed.contains(&e.to));
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        let MemoryTx { mut guard, work, .. } = *self;
        if let Some(work) = work {
            *guard = work;
        }
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        Ok(())
    }
}
