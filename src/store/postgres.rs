//! PostgreSQL-backed graph: `nodes` and `edges` tables with JSONB properties, living in the
//! schema named by `GRAPH_SCHEMA` (default `graph`).

use crate::model::{Direction, EntityType, RelationDef};
use crate::store::{Edge, GraphStore, GraphTx, Node, NodeId, Properties, Related, SortOrder, StoreError};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::{ConnectOptions, PgPool, Postgres, Transaction};
use std::str::FromStr;
use uuid::Uuid;

#[derive(Clone)]
pub struct PgGraph {
    pool: PgPool,
    schema: String,
}

impl PgGraph {
    pub fn new(pool: PgPool, schema: impl Into<String>) -> Self {
        PgGraph {
            pool,
            schema: schema.into(),
        }
    }

    /// Create the database if missing, connect, and ensure the graph tables exist.
    pub async fn connect(database_url: &str, schema: &str) -> Result<Self, StoreError> {
        ensure_database_exists(database_url).await?;
        let pool = PgPoolOptions::new().max_connections(5).connect(database_url).await?;
        ensure_graph_tables(&pool, schema).await?;
        Ok(Self::new(pool, schema))
    }
}

/// Create the graph schema and its `nodes` / `edges` tables if they do not exist.
/// Edges cascade with either endpoint, so deleting a node detaches it.
pub async fn ensure_graph_tables(pool: &PgPool, schema: &str) -> Result<(), StoreError> {
    let schema = quote_ident(schema);
    sqlx::query(&format!("CREATE SCHEMA IF NOT EXISTS {}", schema))
        .execute(pool)
        .await?;
    let nodes_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {}.nodes (
            id UUID PRIMARY KEY,
            label TEXT NOT NULL,
            properties JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            seq BIGSERIAL,
            created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
        )
        "#,
        schema
    );
    sqlx::query(&nodes_ddl).execute(pool).await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS nodes_label_idx ON {}.nodes (label)",
        schema
    ))
    .execute(pool)
    .await?;
    let edges_ddl = format!(
        r#"
        CREATE TABLE IF NOT EXISTS {s}.edges (
            id UUID PRIMARY KEY,
            label TEXT NOT NULL,
            from_id UUID NOT NULL REFERENCES {s}.nodes(id) ON DELETE CASCADE,
            to_id UUID NOT NULL REFERENCES {s}.nodes(id) ON DELETE CASCADE,
            properties JSONB NOT NULL DEFAULT '{{}}'::jsonb,
            seq BIGSERIAL
        )
        "#,
        s = schema
    );
    sqlx::query(&edges_ddl).execute(pool).await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS edges_from_idx ON {}.edges (label, from_id)",
        schema
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE INDEX IF NOT EXISTS edges_to_idx ON {}.edges (label, to_id)",
        schema
    ))
    .execute(pool)
    .await?;
    sqlx::query(&format!(
        "CREATE UNIQUE INDEX IF NOT EXISTS edges_unique_idx ON {}.edges (label, from_id, to_id)",
        schema
    ))
    .execute(pool)
    .await?;
    Ok(())
}

/// Ensure the database in `database_url` exists; create it if not. Connects to the
/// default `postgres` database to run CREATE DATABASE. Call before creating the main pool.
pub async fn ensure_database_exists(database_url: &str) -> Result<(), StoreError> {
    let (admin_url, db_name) = parse_db_name_from_url(database_url)?;
    if db_name.is_empty() || db_name == "postgres" {
        return Ok(());
    }
    let opts = sqlx::postgres::PgConnectOptions::from_str(&admin_url)
        .map_err(|e| StoreError::Backend(format!("invalid DB_URL: {}", e)))?;
    let mut conn: sqlx::PgConnection = opts.connect().await?;
    let exists: (bool,) = sqlx::query_as("SELECT EXISTS(SELECT 1 FROM pg_database WHERE datname = $1)")
        .bind(&db_name)
        .fetch_one(&mut conn)
        .await?;
    if !exists.0 {
        tracing::info!(database = %db_name, "creating database");
        sqlx::query(&format!("CREATE DATABASE {}", quote_ident(&db_name)))
            .execute(&mut conn)
            .await?;
    }
    Ok(())
}

fn parse_db_name_from_url(url: &str) -> Result<(String, String), StoreError> {
    let path_start = url
        .rfind('/')
        .ok_or_else(|| StoreError::Backend("DB_URL: no path".into()))?
        + 1;
    let path_and_query = url.get(path_start..).unwrap_or("");
    let db_name = path_and_query.split('?').next().unwrap_or("").trim();
    let base = url.get(..path_start).unwrap_or(url);
    let admin_url = format!("{}postgres", base);
    Ok((admin_url, db_name.to_string()))
}

fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

#[async_trait]
impl GraphStore for PgGraph {
    async fn begin(&self) -> Result<Box<dyn GraphTx>, StoreError> {
        let tx = self.pool.begin().await?;
        Ok(Box::new(PgTx {
            tx,
            schema: quote_ident(&self.schema),
            lock_scope: self.schema.clone(),
        }))
    }

    async fn ping(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").fetch_optional(&self.pool).await?;
        Ok(())
    }
}

struct PgTx {
    tx: Transaction<'static, Postgres>,
    schema: String,
    /// Unquoted schema name; prefixes advisory lock keys.
    lock_scope: String,
}

type NodeRow = (Uuid, String, Value);
type RelatedRow = (Uuid, String, Value, Uuid, String, Uuid, Uuid, Value);

fn into_properties(v: Value) -> Properties {
    match v {
        Value::Object(m) => m,
        _ => Properties::new(),
    }
}

fn node_from_row((id, label, properties): NodeRow) -> Node {
    Node {
        id,
        label,
        properties: into_properties(properties),
    }
}

fn related_from_row(row: RelatedRow) -> Related {
    let (id, label, properties, edge_id, edge_label, from, to, edge_properties) = row;
    Related {
        node: node_from_row((id, label, properties)),
        edge: Edge {
            id: edge_id,
            label: edge_label,
            from,
            to,
            properties: into_properties(edge_properties),
        },
    }
}

/// Node lookup where each listed property equals its bound value: `$1` is the label, then one
/// `(key, value)` placeholder pair per property.
fn matching_sql(schema: &str, keys: usize) -> String {
    let mut sql = format!("SELECT id, label, properties FROM {}.nodes WHERE label = $1", schema);
    for i in 0..keys {
        sql.push_str(&format!(" AND properties -> ${} = ${}", 2 + 2 * i, 3 + 2 * i));
    }
    sql.push_str(" ORDER BY seq LIMIT 1");
    sql
}

/// (column anchored at the declaring node, column at the other end)
fn edge_columns(relation: &RelationDef) -> (&'static str, &'static str) {
    match relation.direction {
        Direction::Outgoing => ("from_id", "to_id"),
        Direction::Incoming => ("to_id", "from_id"),
    }
}

impl PgTx {
    async fn check_unique(
        &mut self,
        entity: &EntityType,
        properties: &Properties,
        except: Option<NodeId>,
    ) -> Result<(), StoreError> {
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {}.nodes WHERE label = $1 AND properties -> $2 = $3 AND ($4::uuid IS NULL OR id <> $4))",
            self.schema
        );
        for attr in entity.unique_attributes() {
            let Some(value) = properties.get(&attr.name).filter(|v| !v.is_null()) else {
                continue;
            };
            tracing::debug!(sql = %sql, field = %attr.name, "query");
            let (clash,): (bool,) = sqlx::query_as(&sql)
                .bind(entity.name())
                .bind(&attr.name)
                .bind(value)
                .bind(except)
                .fetch_one(&mut *self.tx)
                .await?;
            if clash {
                return Err(StoreError::UniqueViolation {
                    label: entity.name().to_string(),
                    field: attr.name.clone(),
                });
            }
        }
        Ok(())
    }
}

#[async_trait]
impl GraphTx for PgTx {
    async fn lock_type(&mut self, entity: &EntityType) -> Result<(), StoreError> {
        let key = format!("{}.{}", self.lock_scope, entity.name());
        tracing::debug!(key = %key, "advisory lock");
        sqlx::query("SELECT pg_advisory_xact_lock(hashtext($1))")
            .bind(key)
            .execute(&mut *self.tx)
            .await?;
        Ok(())
    }

    async fn find_one(&mut self, entity: &EntityType, field: &str, value: &Value) -> Result<Option<Node>, StoreError> {
        let sql = format!(
            "SELECT id, label, properties FROM {}.nodes WHERE label = $1 AND properties -> $2 = $3 ORDER BY seq LIMIT 1",
            self.schema
        );
        tracing::debug!(sql = %sql, field = %field, "query");
        let row: Option<NodeRow> = sqlx::query_as(&sql)
            .bind(entity.name())
            .bind(field)
            .bind(value)
            .fetch_optional(&mut *self.tx)
            .await?;
        Ok(row.map(node_from_row))
    }

    async fn find_many(&mut self, entity: &EntityType, field: &str, value: &Value) -> Result<Vec<Node>, StoreError> {
        let sql = format!(
            "SELECT id, label, properties FROM {}.nodes WHERE label = $1 AND properties -> $2 = $3 ORDER BY seq",
            self.schema
        );
        tracing::debug!(sql = %sql, field = %field, "query");
        let rows: Vec<NodeRow> = sqlx::query_as(&sql)
            .bind(entity.name())
            .bind(field)
            .bind(value)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(node_from_row).collect())
    }

    async fn find_matching(&mut self, entity: &EntityType, properties: &Properties) -> Result<Option<Node>, StoreError> {
        let sql = matching_sql(&self.schema, properties.len());
        tracing::debug!(sql = %sql, "query");
        let mut query = sqlx::query_as::<_, NodeRow>(&sql).bind(entity.name());
        for (key, value) in properties {
            query = query.bind(key).bind(value);
        }
        let row = query.fetch_optional(&mut *self.tx).await?;
        Ok(row.map(node_from_row))
    }

    async fn find_all(
        &mut self,
        entity: &EntityType,
        order: &SortOrder,
        skip: u64,
        limit: u64,
    ) -> Result<Vec<Node>, StoreError> {
        let order_clause = match order {
            SortOrder::Unordered => "seq".to_string(),
            SortOrder::Asc(_) => "properties -> $4 ASC NULLS LAST, seq".to_string(),
            SortOrder::Desc(_) => "properties -> $4 DESC NULLS FIRST, seq".to_string(),
        };
        let sql = format!(
            "SELECT id, label, properties FROM {}.nodes WHERE label = $1 ORDER BY {} OFFSET $2 LIMIT $3",
            self.schema, order_clause
        );
        tracing::debug!(sql = %sql, skip, limit, "query");
        let mut query = sqlx::query_as::<_, NodeRow>(&sql)
            .bind(entity.name())
            .bind(skip as i64)
            .bind(limit as i64);
        if let Some(field) = order.field() {
            query = query.bind(field);
        }
        let rows = query.fetch_all(&mut *self.tx).await?;
        Ok(rows.into_iter().map(node_from_row).collect())
    }

    async fn count(&mut self, entity: &EntityType) -> Result<u64, StoreError> {
        let sql = format!("SELECT COUNT(*) FROM {}.nodes WHERE label = $1", self.schema);
        tracing::debug!(sql = %sql, "query");
        let (n,): (i64,) = sqlx::query_as(&sql)
            .bind(entity.name())
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(n.max(0) as u64)
    }

    async fn get(&mut self, id: NodeId) -> Result<Option<Node>, StoreError> {
        let sql = format!("SELECT id, label, properties FROM {}.nodes WHERE id = $1", self.schema);
        tracing::debug!(sql = %sql, "query");
        let row: Option<NodeRow> = sqlx::query_as(&sql).bind(id).fetch_optional(&mut *self.tx).await?;
        Ok(row.map(node_from_row))
    }

    async fn create(&mut self, entity: &EntityType, properties: Properties) -> Result<Node, StoreError> {
        self.check_unique(entity, &properties, None).await?;
        let sql = format!(
            "INSERT INTO {}.nodes (id, label, properties) VALUES ($1, $2, $3) RETURNING id, label, properties",
            self.schema
        );
        tracing::debug!(sql = %sql, "query");
        let row: NodeRow = sqlx::query_as(&sql)
            .bind(Uuid::new_v4())
            .bind(entity.name())
            .bind(Value::Object(properties))
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(node_from_row(row))
    }

    async fn update(&mut self, entity: &EntityType, node: &Node, properties: Properties) -> Result<Node, StoreError> {
        self.check_unique(entity, &properties, Some(node.id)).await?;
        let sql = format!(
            "UPDATE {}.nodes SET properties = properties || $2 WHERE id = $1 RETURNING id, label, properties",
            self.schema
        );
        tracing::debug!(sql = %sql, "query");
        let row: Option<NodeRow> = sqlx::query_as(&sql)
            .bind(node.id)
            .bind(Value::Object(properties))
            .fetch_optional(&mut *self.tx)
            .await?;
        row.map(node_from_row).ok_or(StoreError::MissingNode(node.id))
    }

    async fn delete(&mut self, node: &Node) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {}.nodes WHERE id = $1", self.schema);
        tracing::debug!(sql = %sql, "query");
        let done = sqlx::query(&sql).bind(node.id).execute(&mut *self.tx).await?;
        Ok(done.rows_affected() > 0)
    }

    async fn connect(
        &mut self,
        from: &Node,
        relation: &RelationDef,
        to: &Node,
        data: Option<Properties>,
    ) -> Result<bool, StoreError> {
        let (a, b) = match relation.direction {
            Direction::Outgoing => (from.id, to.id),
            Direction::Incoming => (to.id, from.id),
        };
        let sql = format!(
            "INSERT INTO {}.edges (id, label, from_id, to_id, properties) VALUES ($1, $2, $3, $4, $5)",
            self.schema
        );
        tracing::debug!(sql = %sql, relation = %relation.name, "query");
        let done = sqlx::query(&sql)
            .bind(Uuid::new_v4())
            .bind(&relation.label)
            .bind(a)
            .bind(b)
            .bind(Value::Object(data.unwrap_or_default()))
            .execute(&mut *self.tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => StoreError::DuplicateEdge {
                    label: relation.label.clone(),
                },
                other => StoreError::Db(other),
            })?;
        Ok(done.rows_affected() == 1)
    }

    async fn disconnect(&mut self, from: &Node, relation: &RelationDef, to: &Node) -> Result<bool, StoreError> {
        let (anchor, other) = edge_columns(relation);
        let sql = format!(
            "DELETE FROM {}.edges WHERE label = $1 AND {} = $2 AND {} = $3",
            self.schema, anchor, other
        );
        tracing::debug!(sql = %sql, "query");
        let done = sqlx::query(&sql)
            .bind(&relation.label)
            .bind(from.id)
            .bind(to.id)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected() > 0)
    }

    async fn disconnect_all(&mut self, from: &Node, relation: &RelationDef) -> Result<u64, StoreError> {
        let (anchor, other) = edge_columns(relation);
        let sql = format!(
            "DELETE FROM {s}.edges e USING {s}.nodes n WHERE e.label = $1 AND e.{a} = $2 AND n.id = e.{o} AND n.label = $3",
            s = self.schema,
            a = anchor,
            o = other
        );
        tracing::debug!(sql = %sql, "query");
        let done = sqlx::query(&sql)
            .bind(&relation.label)
            .bind(from.id)
            .bind(&relation.target)
            .execute(&mut *self.tx)
            .await?;
        Ok(done.rows_affected())
    }

    async fn all_related(&mut self, node: &Node, relation: &RelationDef) -> Result<Vec<Related>, StoreError> {
        let (anchor, other) = edge_columns(relation);
        let sql = format!(
            "SELECT n.id, n.label, n.properties, e.id, e.label, e.from_id, e.to_id, e.properties \
             FROM {s}.edges e JOIN {s}.nodes n ON n.id = e.{o} \
             WHERE e.label = $1 AND e.{a} = $2 AND n.label = $3 ORDER BY e.seq",
            s = self.schema,
            a = anchor,
            o = other
        );
        tracing::debug!(sql = %sql, relation = %relation.name, "query");
        let rows: Vec<RelatedRow> = sqlx::query_as(&sql)
            .bind(&relation.label)
            .bind(node.id)
            .bind(&relation.target)
            .fetch_all(&mut *self.tx)
            .await?;
        Ok(rows.into_iter().map(related_from_row).collect())
    }

    async fn relation_exists(&mut self, node: &Node, relation: &RelationDef, candidate: &Node) -> Result<bool, StoreError> {
        let (anchor, other) = edge_columns(relation);
        let sql = format!(
            "SELECT EXISTS(SELECT 1 FROM {}.edges WHERE label = $1 AND {} = $2 AND {} = $3)",
            self.schema, anchor, other
        );
        tracing::debug!(sql = %sql, "query");
        let (exists,): (bool,) = sqlx::query_as(&sql)
            .bind(&relation.label)
            .bind(node.id)
            .bind(candidate.id)
            .fetch_one(&mut *self.tx)
            .await?;
        Ok(exists)
    }

    async fn detach_delete_all(&mut self, entity: &EntityType) -> Result<bool, StoreError> {
        let sql = format!("DELETE FROM {}.nodes WHERE label = $1", self.schema);
        tracing::debug!(sql = %sql, "query");
        sqlx::query(&sql).bind(entity.name()).execute(&mut *self.tx).await?;
        Ok(true)
    }

    async fn commit(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<(), StoreError> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admin_url_targets_postgres_database() {
        let (admin, name) = parse_db_name_from_url("postgres://u:p@localhost:5432/graphs?sslmode=disable").unwrap();
        assert_eq!(admin, "postgres://u:p@localhost:5432/postgres");
        assert_eq!(name, "graphs");
    }

    #[test]
    fn matching_compares_each_property_for_equality() {
        assert_eq!(
            matching_sql("\"graph\"", 2),
            "SELECT id, label, properties FROM \"graph\".nodes WHERE label = $1 \
             AND properties -> $2 = $3 AND properties -> $4 = $5 ORDER BY seq LIMIT 1"
        );
        assert!(!matching_sql("g", 1).contains("@>"));
    }

    #[test]
    fn identifiers_are_quoted() {
        assert_eq!(quote_ident("graph"), "\"graph\"");
        assert_eq!(quote_ident("a\"b"), "\"a\"\"b\"");
    }
}
