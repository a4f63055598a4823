//! Graph store trait and the SQLite-backed reference implementation.

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde_json::{json, Value};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use super::query::GraphQuery;
use super::types::{AnchorNode, GraphRow, GraphStats, ENTITY_LABEL, MEMORY_LABEL, MENTIONED_IN};
use crate::error::{Error, Result};
use crate::memory::{format_datetime, Entity, MemoryId};

/// The derived graph index over memory records.
#[async_trait]
pub trait GraphStore: Send + Sync {
    /// Whether the store has the settings it needs to connect.
    fn is_configured(&self) -> bool;

    /// Cheap round trip to the backend.
    async fn verify_connection(&self) -> Result<bool>;

    /// Execute a query, discarding any rows.
    async fn run(&self, query: &GraphQuery) -> Result<()>;

    /// Execute a query and return its rows.
    async fn query(&self, query: &GraphQuery) -> Result<Vec<GraphRow>>;

    /// Remove every node and relationship.
    async fn clear_all(&self) -> Result<()>;

    /// Create the indexes and constraints the queries rely on. Idempotent.
    async fn create_indexes(&self) -> Result<()>;

    async fn stats(&self) -> Result<GraphStats>;
}

/// Decode graph rows into a typed value.
pub fn decode_rows<T: DeserializeOwned>(rows: Vec<GraphRow>) -> Result<Vec<T>> {
    rows.into_iter()
        .map(|row| serde_json::from_value(Value::Object(row)).map_err(Error::from))
        .collect()
}

/// Read one anchor node back from any graph store.
pub async fn find_anchor(
    graph: &dyn GraphStore,
    memory_id: MemoryId,
) -> Result<Option<AnchorNode>> {
    let rows = graph.query(&GraphQuery::FindAnchor { memory_id }).await?;
    Ok(decode_rows(rows)?.into_iter().next())
}

/// SQLite-backed property graph.
///
/// Nodes and relationships live in two tables with JSON properties. Anchor
/// nodes use the memory id as node id; entity nodes use `entity:<key>`.
pub struct SqliteGraphStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteGraphStore {
    /// Open or create a graph store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::graph_store("open", e.to_string()))?;
        initialize_graph_schema(&conn).map_err(|e| Error::graph_store("open", e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn =
            Connection::open_in_memory().map_err(|e| Error::graph_store("open", e.to_string()))?;
        initialize_graph_schema(&conn).map_err(|e| Error::graph_store("open", e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::graph_store(operation, format!("connection lock: {}", e)))?;
        f(&conn).map_err(|e| e.into_graph(operation))
    }

    fn execute(&self, query: &GraphQuery) -> Result<Vec<GraphRow>> {
        self.with_conn(query.name(), |conn| match query {
            GraphQuery::MergeAnchor { anchor } => {
                conn.execute(
                    "INSERT INTO graph_nodes (id, label, properties, created_at)
                     VALUES (?1, ?2, ?3, ?4)
                     ON CONFLICT(id) DO UPDATE SET properties = excluded.properties",
                    params![
                        anchor.memory_id.to_string(),
                        MEMORY_LABEL,
                        serde_json::to_string(anchor)?,
                        format_datetime(&Utc::now()),
                    ],
                )
                .map_err(sql)?;
                Ok(Vec::new())
            }
            GraphQuery::EnsureAnchor { anchor } => {
                conn.execute(
                    "INSERT OR IGNORE INTO graph_nodes (id, label, properties, created_at)
                     VALUES (?1, ?2, ?3, ?4)",
                    params![
                        anchor.memory_id.to_string(),
                        MEMORY_LABEL,
                        serde_json::to_string(anchor)?,
                        format_datetime(&Utc::now()),
                    ],
                )
                .map_err(sql)?;
                Ok(Vec::new())
            }
            GraphQuery::MergeEntityMention { memory_id, entity } => {
                merge_entity_mention(conn, memory_id, entity)?;
                Ok(Vec::new())
            }
            GraphQuery::RemoveMentions { memory_id } => {
                conn.execute(
                    "DELETE FROM graph_relationships WHERE rel_type = ?1 AND to_id = ?2",
                    params![MENTIONED_IN, memory_id.to_string()],
                )
                .map_err(sql)?;
                Ok(Vec::new())
            }
            GraphQuery::DeleteAnchor { memory_id } => {
                let tx = conn.unchecked_transaction().map_err(sql)?;
                tx.execute(
                    "DELETE FROM graph_relationships WHERE from_id = ?1 OR to_id = ?1",
                    params![memory_id.to_string()],
                )
                .map_err(sql)?;
                tx.execute(
                    "DELETE FROM graph_nodes WHERE id = ?1 AND label = ?2",
                    params![memory_id.to_string(), MEMORY_LABEL],
                )
                .map_err(sql)?;
                tx.commit().map_err(sql)?;
                Ok(Vec::new())
            }
            GraphQuery::FindAnchor { memory_id } => {
                let properties: Option<String> = conn
                    .query_row(
                        "SELECT properties FROM graph_nodes WHERE id = ?1 AND label = ?2",
                        params![memory_id.to_string(), MEMORY_LABEL],
                        |row| row.get(0),
                    )
                    .optional()
                    .map_err(sql)?;

                properties
                    .map(|p| parse_properties(&p))
                    .into_iter()
                    .collect()
            }
            GraphQuery::FindMentions { memory_id } => {
                let mut stmt = conn
                    .prepare(
                        "SELECT n.properties, r.properties
                         FROM graph_relationships r
                         JOIN graph_nodes n ON n.id = r.from_id
                         WHERE r.rel_type = ?1 AND r.to_id = ?2
                         ORDER BY n.id",
                    )
                    .map_err(sql)?;
                let pairs = stmt
                    .query_map(params![MENTIONED_IN, memory_id.to_string()], |row| {
                        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                    })
                    .map_err(sql)?
                    .collect::<rusqlite::Result<Vec<_>>>()
                    .map_err(sql)?;

                pairs
                    .into_iter()
                    .map(|(node, rel)| {
                        let mut row = parse_properties(&node)?;
                        row.extend(parse_properties(&rel)?);
                        Ok(row)
                    })
                    .collect()
            }
            GraphQuery::CountAnchors => {
                let count: i64 = conn
                    .query_row(
                        "SELECT COUNT(*) FROM graph_nodes WHERE label = ?1",
                        params![MEMORY_LABEL],
                        |row| row.get(0),
                    )
                    .map_err(sql)?;
                let mut row = GraphRow::new();
                row.insert("count".to_string(), json!(count));
                Ok(vec![row])
            }
        })
    }
}

#[async_trait]
impl GraphStore for SqliteGraphStore {
    fn is_configured(&self) -> bool {
        true
    }

    async fn verify_connection(&self) -> Result<bool> {
        self.with_conn("verify_connection", |conn| {
            let one: i64 = conn.query_row("SELECT 1", [], |row| row.get(0)).map_err(sql)?;
            Ok(one == 1)
        })
    }

    async fn run(&self, query: &GraphQuery) -> Result<()> {
        self.execute(query).map(|_| ())
    }

    async fn query(&self, query: &GraphQuery) -> Result<Vec<GraphRow>> {
        self.execute(query)
    }

    async fn clear_all(&self) -> Result<()> {
        self.with_conn("clear_all", |conn| {
            conn.execute_batch(
                "BEGIN;
                 DELETE FROM graph_relationships;
                 DELETE FROM graph_nodes;
                 COMMIT;",
            )
            .map_err(sql)
        })
    }

    async fn create_indexes(&self) -> Result<()> {
        self.with_conn("create_indexes", |conn| create_graph_indexes(conn).map_err(sql))
    }

    async fn stats(&self) -> Result<GraphStats> {
        self.with_conn("stats", |conn| {
            let nodes_by_type = count_grouped(
                conn,
                "SELECT label, COUNT(*) FROM graph_nodes GROUP BY label",
            )?;
            let relationships_by_type = count_grouped(
                conn,
                "SELECT rel_type, COUNT(*) FROM graph_relationships GROUP BY rel_type",
            )?;
            Ok(GraphStats {
                nodes_by_type,
                relationships_by_type,
            })
        })
    }
}

fn merge_entity_mention(conn: &Connection, memory_id: &MemoryId, entity: &Entity) -> Result<()> {
    let anchor_exists: bool = conn
        .query_row(
            "SELECT EXISTS(SELECT 1 FROM graph_nodes WHERE id = ?1 AND label = ?2)",
            params![memory_id.to_string(), MEMORY_LABEL],
            |row| row.get(0),
        )
        .map_err(sql)?;
    if !anchor_exists {
        return Err(Error::graph_store(
            "merge_entity_mention",
            format!("anchor node {} does not exist", memory_id),
        ));
    }

    let entity_id = format!("entity:{}", entity.key());
    let node_properties = json!({
        "key": entity.key(),
        "entity_type": entity.entity_type,
        "value": entity.value,
        "normalized": entity.normalized,
    });
    let rel_properties = json!({
        "confidence": entity.confidence,
        "source": entity.source,
        "context": entity.context,
    });
    let now = format_datetime(&Utc::now());

    let tx = conn.unchecked_transaction().map_err(sql)?;
    tx.execute(
        "INSERT OR IGNORE INTO graph_nodes (id, label, properties, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![entity_id, ENTITY_LABEL, node_properties.to_string(), now],
    )
    .map_err(sql)?;
    tx.execute(
        "INSERT INTO graph_relationships (rel_type, from_id, to_id, properties, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(rel_type, from_id, to_id) DO UPDATE SET properties = excluded.properties",
        params![
            MENTIONED_IN,
            entity_id,
            memory_id.to_string(),
            rel_properties.to_string(),
            now
        ],
    )
    .map_err(sql)?;
    tx.commit().map_err(sql)?;
    Ok(())
}

fn count_grouped(conn: &Connection, sql_text: &str) -> Result<HashMap<String, u64>> {
    let mut stmt = conn.prepare(sql_text).map_err(sql)?;
    let rows = stmt
        .query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)? as u64))
        })
        .map_err(sql)?
        .collect::<rusqlite::Result<HashMap<_, _>>>()
        .map_err(sql)?;
    Ok(rows)
}

fn parse_properties(text: &str) -> Result<GraphRow> {
    match serde_json::from_str(text)? {
        Value::Object(map) => Ok(map),
        other => Err(Error::Internal(format!(
            "graph properties are not an object: {}",
            other
        ))),
    }
}

fn sql(e: rusqlite::Error) -> Error {
    Error::Internal(format!("SQLite: {}", e))
}

fn initialize_graph_schema(conn: &Connection) -> rusqlite::Result<()> {
    conn.pragma_update(None, "foreign_keys", "ON")?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS graph_nodes (
            id TEXT PRIMARY KEY,
            label TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL
        )",
        [],
    )?;

    conn.execute(
        "CREATE TABLE IF NOT EXISTS graph_relationships (
            rel_type TEXT NOT NULL,
            from_id TEXT NOT NULL,
            to_id TEXT NOT NULL,
            properties TEXT NOT NULL DEFAULT '{}',
            created_at TEXT NOT NULL,
            PRIMARY KEY (rel_type, from_id, to_id),
            FOREIGN KEY (from_id) REFERENCES graph_nodes(id) ON DELETE CASCADE,
            FOREIGN KEY (to_id) REFERENCES graph_nodes(id) ON DELETE CASCADE
        )",
        [],
    )?;

    create_graph_indexes(conn)
}

fn create_graph_indexes(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_graph_nodes_label ON graph_nodes(label)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_graph_relationships_to \
         ON graph_relationships(to_id, rel_type)",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_graph_relationships_from ON graph_relationships(from_id)",
        [],
    )?;
    Ok(())
}
