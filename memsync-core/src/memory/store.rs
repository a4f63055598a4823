//! Vector store trait and the SQLite-backed reference implementation.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, SubsecRound, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde_json::Value;
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};
use crate::memory::schema::{initialize_schema, is_initialized};
use crate::memory::types::*;

/// The source of truth for memory records.
///
/// A record exists if and only if this store has it; the graph store only
/// holds a projection.
#[async_trait]
pub trait VectorStore: Send + Sync {
    /// Insert a new record. The store assigns id and timestamps.
    async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord>;

    /// Apply a partial update to a live record.
    async fn update(&self, id: &MemoryId, patch: MemoryPatch) -> Result<MemoryRecord>;

    /// Soft delete (flag) or hard delete (remove the row).
    async fn delete(&self, id: &MemoryId, hard: bool) -> Result<()>;

    /// Fetch a record, optionally including soft-deleted ones.
    async fn get_by_id(&self, id: &MemoryId, include_deleted: bool)
        -> Result<Option<MemoryRecord>>;

    /// Most recent records first, optionally scoped to a user.
    async fn get_recent(
        &self,
        user_id: Option<&str>,
        query: &RecentQuery,
    ) -> Result<Vec<MemoryRecord>>;

    /// Record counts, optionally scoped to a user.
    async fn stats(&self, user_id: Option<&str>) -> Result<VectorStats>;
}

/// SQLite-backed vector store.
///
/// Embeddings are stored as little-endian `f32` blobs and similarity search
/// is a brute-force cosine scan, which is adequate for a single user's
/// memories.
pub struct SqliteVectorStore {
    conn: Arc<Mutex<Connection>>,
}

const RECORD_COLUMNS: &str = "id, user_id, content, embedding, conversation_id, summary, metadata,
     importance, access_count, created_at, updated_at, is_deleted";

impl SqliteVectorStore {
    /// Open or create a vector store at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(|e| Error::vector_store("open", e.to_string()))?;

        if !is_initialized(&conn) {
            initialize_schema(&conn).map_err(|e| Error::vector_store("open", e.to_string()))?;
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Create an in-memory store (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::vector_store("open", e.to_string()))?;
        initialize_schema(&conn).map_err(|e| Error::vector_store("open", e.to_string()))?;

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    fn with_conn<F, T>(&self, operation: &str, f: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> rusqlite::Result<T>,
    {
        let conn = self
            .conn
            .lock()
            .map_err(|e| Error::vector_store(operation, format!("connection lock: {}", e)))?;
        f(&conn).map_err(|e| Error::vector_store(operation, e.to_string()))
    }

    fn get_sync(&self, id: &MemoryId, include_deleted: bool) -> Result<Option<MemoryRecord>> {
        self.with_conn("get_by_id", |conn| {
            let sql = format!(
                "SELECT {} FROM memories WHERE id = ?1 AND (?2 OR is_deleted = 0)",
                RECORD_COLUMNS
            );
            conn.query_row(&sql, params![id.to_string(), include_deleted], row_to_record)
                .optional()
        })
    }

    /// Persist an already patched record. Fails with `NotFound` when the
    /// record was deleted after it was read.
    fn write_update(&self, record: &MemoryRecord) -> Result<()> {
        let metadata = serde_json::to_string(&record.metadata)?;
        let rows = self.with_conn("update", |conn| {
            conn.execute(
                "UPDATE memories SET
                    content = ?2, embedding = ?3, conversation_id = ?4, summary = ?5,
                    metadata = ?6, importance = ?7, updated_at = ?8
                 WHERE id = ?1 AND is_deleted = 0",
                params![
                    record.id.to_string(),
                    record.content,
                    embedding_to_blob(&record.embedding),
                    record.conversation_id,
                    record.summary,
                    metadata,
                    record.importance as i64,
                    format_datetime(&record.updated_at),
                ],
            )
        })?;

        if rows == 0 {
            return Err(Error::NotFound(record.id.to_string()));
        }
        Ok(())
    }

    /// Bump the access counter of a record.
    pub fn record_access(&self, id: &MemoryId) -> Result<()> {
        self.with_conn("record_access", |conn| {
            conn.execute(
                "UPDATE memories SET access_count = access_count + 1 WHERE id = ?1",
                params![id.to_string()],
            )?;
            Ok(())
        })
    }

    /// Rank a user's live records by cosine similarity to `embedding`.
    ///
    /// Records without an embedding, or with a different dimension, are
    /// skipped.
    pub fn search_similar(
        &self,
        user_id: &str,
        embedding: &[f32],
        limit: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>> {
        let candidates = self.with_conn("search_similar", |conn| {
            let sql = format!(
                "SELECT {} FROM memories
                 WHERE user_id = ?1 AND is_deleted = 0 AND embedding IS NOT NULL",
                RECORD_COLUMNS
            );
            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params![user_id], row_to_record)?
                .filter_map(|r| r.ok())
                .collect::<Vec<_>>();
            Ok(records)
        })?;

        let mut scored: Vec<(MemoryRecord, f32)> = candidates
            .into_iter()
            .filter(|r| r.embedding.len() == embedding.len())
            .filter_map(|r| cosine_similarity(&r.embedding, embedding).map(|s| (r, s)))
            .collect();

        scored.sort_by(|a, b| b.1.total_cmp(&a.1));
        scored.truncate(limit);
        Ok(scored)
    }
}

#[async_trait]
impl VectorStore for SqliteVectorStore {
    async fn insert(&self, memory: NewMemory) -> Result<MemoryRecord> {
        // Stored timestamps carry microseconds; keep the returned record identical.
        let now = Utc::now().trunc_subsecs(6);
        let record = MemoryRecord {
            id: MemoryId::new(),
            importance: memory.effective_importance(),
            user_id: memory.user_id,
            content: memory.content,
            embedding: memory.embedding,
            conversation_id: memory.conversation_id,
            summary: memory.summary,
            metadata: memory.metadata,
            access_count: 0,
            created_at: now,
            updated_at: now,
            is_deleted: false,
        };

        let metadata = serde_json::to_string(&record.metadata)?;

        self.with_conn("insert", |conn| {
            conn.execute(
                "INSERT INTO memories (
                    id, user_id, content, embedding, conversation_id, summary, metadata,
                    importance, access_count, created_at, updated_at, is_deleted
                ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, 0)",
                params![
                    record.id.to_string(),
                    record.user_id,
                    record.content,
                    embedding_to_blob(&record.embedding),
                    record.conversation_id,
                    record.summary,
                    metadata,
                    record.importance as i64,
                    record.access_count as i64,
                    format_datetime(&record.created_at),
                    format_datetime(&record.updated_at),
                ],
            )?;
            Ok(())
        })?;

        Ok(record)
    }

    async fn update(&self, id: &MemoryId, patch: MemoryPatch) -> Result<MemoryRecord> {
        let mut record = self
            .get_sync(id, false)?
            .ok_or_else(|| Error::NotFound(id.to_string()))?;

        patch.apply(&mut record);
        record.updated_at = record.updated_at.trunc_subsecs(6);
        self.write_update(&record)?;
        Ok(record)
    }

    async fn delete(&self, id: &MemoryId, hard: bool) -> Result<()> {
        let rows = self.with_conn("delete", |conn| {
            if hard {
                conn.execute("DELETE FROM memories WHERE id = ?1", params![id.to_string()])
            } else {
                conn.execute(
                    "UPDATE memories SET is_deleted = 1, updated_at = ?2 WHERE id = ?1",
                    params![id.to_string(), format_datetime(&Utc::now())],
                )
            }
        })?;

        if rows == 0 {
            return Err(Error::NotFound(id.to_string()));
        }
        Ok(())
    }

    async fn get_by_id(
        &self,
        id: &MemoryId,
        include_deleted: bool,
    ) -> Result<Option<MemoryRecord>> {
        self.get_sync(id, include_deleted)
    }

    async fn get_recent(
        &self,
        user_id: Option<&str>,
        query: &RecentQuery,
    ) -> Result<Vec<MemoryRecord>> {
        self.with_conn("get_recent", |conn| {
            let mut sql = format!("SELECT {} FROM memories WHERE 1=1", RECORD_COLUMNS);
            let mut params_vec: Vec<Box<dyn rusqlite::ToSql>> = Vec::new();

            if let Some(user_id) = user_id {
                sql.push_str(" AND user_id = ?");
                params_vec.push(Box::new(user_id.to_string()));
            }

            if let Some(ref conversation_id) = query.conversation_id {
                sql.push_str(" AND conversation_id = ?");
                params_vec.push(Box::new(conversation_id.clone()));
            }

            if query.exclude_deleted {
                sql.push_str(" AND is_deleted = 0");
            }

            sql.push_str(" ORDER BY created_at DESC, rowid DESC LIMIT ?");
            params_vec.push(Box::new(query.limit as i64));

            let params_refs: Vec<&dyn rusqlite::ToSql> =
                params_vec.iter().map(|b| b.as_ref()).collect();

            let mut stmt = conn.prepare(&sql)?;
            let records = stmt
                .query_map(params_refs.as_slice(), row_to_record)?
                .collect::<rusqlite::Result<Vec<_>>>()?;

            Ok(records)
        })
    }

    async fn stats(&self, user_id: Option<&str>) -> Result<VectorStats> {
        self.with_conn("stats", |conn| {
            conn.query_row(
                "SELECT
                    COALESCE(SUM(CASE WHEN is_deleted = 0 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_deleted = 1 THEN 1 ELSE 0 END), 0),
                    COALESCE(SUM(CASE WHEN is_deleted = 0 AND embedding IS NULL THEN 1 ELSE 0 END), 0),
                    COUNT(DISTINCT CASE WHEN is_deleted = 0 THEN user_id END)
                 FROM memories
                 WHERE (?1 IS NULL OR user_id = ?1)",
                params![user_id],
                |row| {
                    Ok(VectorStats {
                        total: row.get::<_, i64>(0)? as u64,
                        deleted: row.get::<_, i64>(1)? as u64,
                        without_embedding: row.get::<_, i64>(2)? as u64,
                        distinct_users: row.get::<_, i64>(3)? as u64,
                    })
                },
            )
        })
    }
}

fn row_to_record(row: &rusqlite::Row) -> rusqlite::Result<MemoryRecord> {
    let id_str: String = row.get(0)?;
    let id = MemoryId::parse(&id_str).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;

    let embedding = row
        .get::<_, Option<Vec<u8>>>(3)?
        .map(|bytes| blob_to_embedding(&bytes))
        .unwrap_or_default();

    let metadata: HashMap<String, Value> = row
        .get::<_, Option<String>>(6)?
        .and_then(|s| serde_json::from_str(&s).ok())
        .unwrap_or_default();

    Ok(MemoryRecord {
        id,
        user_id: row.get(1)?,
        content: row.get(2)?,
        embedding,
        conversation_id: row.get(4)?,
        summary: row.get(5)?,
        metadata,
        importance: clamp_importance(row.get::<_, i64>(7)?.clamp(0, u8::MAX as i64) as u8),
        access_count: row.get::<_, i64>(8)? as u64,
        created_at: parse_datetime(row.get::<_, String>(9)?),
        updated_at: parse_datetime(row.get::<_, String>(10)?),
        is_deleted: row.get::<_, i64>(11)? != 0,
    })
}

/// Empty embeddings are stored as NULL so "pending" stays distinguishable.
fn embedding_to_blob(embedding: &[f32]) -> Option<Vec<u8>> {
    if embedding.is_empty() {
        return None;
    }
    Some(embedding.iter().flat_map(|f| f.to_le_bytes()).collect())
}

fn blob_to_embedding(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
        .collect()
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> Option<f32> {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return None;
    }
    Some(dot / (norm_a * norm_b))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_datetime(s: String) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(&s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|_| Utc::now())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn new_memory(user: &str, content: &str) -> NewMemory {
        NewMemory::new(user, content)
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let mut input = new_memory("alice", "Prefers tea over coffee");
        input.embedding = vec![0.1, 0.2, 0.3];
        input.metadata.insert("source".to_string(), Value::from("chat"));

        let record = store.insert(input).await.unwrap();
        let fetched = store.get_by_id(&record.id, false).await.unwrap().unwrap();

        assert_eq!(fetched, record);
        assert_eq!(fetched.importance, DEFAULT_IMPORTANCE);
    }

    #[tokio::test]
    async fn test_soft_and_hard_delete() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let soft = store.insert(new_memory("alice", "soft")).await.unwrap();
        let hard = store.insert(new_memory("alice", "hard")).await.unwrap();

        store.delete(&soft.id, false).await.unwrap();
        store.delete(&hard.id, true).await.unwrap();

        assert!(store.get_by_id(&soft.id, false).await.unwrap().is_none());
        let tombstone = store.get_by_id(&soft.id, true).await.unwrap().unwrap();
        assert!(tombstone.is_deleted);
        assert!(store.get_by_id(&hard.id, true).await.unwrap().is_none());

        let err = store.delete(&hard.id, true).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_applies_patch() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let mut input = new_memory("alice", "draft");
        input.summary = Some("old summary".to_string());
        let record = store.insert(input).await.unwrap();

        let updated = store
            .update(
                &record.id,
                MemoryPatch::new().content("final").summary(Patch::Clear),
            )
            .await
            .unwrap();

        assert_eq!(updated.content, "final");
        assert_eq!(updated.summary, None);
        let fetched = store.get_by_id(&record.id, false).await.unwrap().unwrap();
        assert_eq!(fetched.content, "final");
        assert_eq!(fetched.summary, None);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let err = store
            .update(&MemoryId::new(), MemoryPatch::new().content("x"))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn test_update_never_revives_deleted_record() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let record = store.insert(NewMemory::new("u1", "before")).await.unwrap();

        let mut stale = store.get_by_id(&record.id, false).await.unwrap().unwrap();
        store.delete(&record.id, false).await.unwrap();
        MemoryPatch::new().content("after").apply(&mut stale);

        let err = store.write_update(&stale).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));

        let kept = store.get_by_id(&record.id, true).await.unwrap().unwrap();
        assert!(kept.is_deleted);
        assert_eq!(kept.content, "before");
    }

    #[tokio::test]
    async fn test_get_recent_scoping() {
        let store = SqliteVectorStore::in_memory().unwrap();
        for i in 0..3 {
            store
                .insert(new_memory("alice", &format!("a{}", i)))
                .await
                .unwrap();
        }
        let bob = store.insert(new_memory("bob", "b0")).await.unwrap();
        store.delete(&bob.id, false).await.unwrap();

        let alice = store
            .get_recent(Some("alice"), &RecentQuery::new(2))
            .await
            .unwrap();
        assert_eq!(alice.len(), 2);
        assert_eq!(alice[0].content, "a2");

        let live = store.get_recent(None, &RecentQuery::new(10)).await.unwrap();
        assert_eq!(live.len(), 3);

        let all = store
            .get_recent(None, &RecentQuery::new(10).include_deleted())
            .await
            .unwrap();
        assert_eq!(all.len(), 4);
    }

    #[tokio::test]
    async fn test_stats() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let mut with_embedding = new_memory("alice", "e");
        with_embedding.embedding = vec![1.0];
        store.insert(with_embedding).await.unwrap();
        store.insert(new_memory("alice", "no embedding")).await.unwrap();
        let gone = store.insert(new_memory("bob", "gone")).await.unwrap();
        store.delete(&gone.id, false).await.unwrap();

        let stats = store.stats(None).await.unwrap();
        assert_eq!(
            stats,
            VectorStats {
                total: 2,
                deleted: 1,
                without_embedding: 1,
                distinct_users: 1,
            }
        );

        assert_eq!(store.stats(Some("bob")).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn test_search_similar() {
        let store = SqliteVectorStore::in_memory().unwrap();
        for (content, embedding) in [
            ("north", vec![0.0, 1.0]),
            ("east", vec![1.0, 0.0]),
            ("north-east", vec![0.7, 0.7]),
        ] {
            let mut m = new_memory("alice", content);
            m.embedding = embedding;
            store.insert(m).await.unwrap();
        }
        store.insert(new_memory("alice", "pending")).await.unwrap();

        let results = store.search_similar("alice", &[0.0, 1.0], 2).unwrap();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].0.content, "north");
        assert_eq!(results[1].0.content, "north-east");
    }

    #[tokio::test]
    async fn test_file_backed_store_reopens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("memories.db");

        let id = {
            let store = SqliteVectorStore::open(&path).unwrap();
            store.insert(new_memory("alice", "durable")).await.unwrap().id
        };

        let store = SqliteVectorStore::open(&path).unwrap();
        let record = store.get_by_id(&id, false).await.unwrap().unwrap();
        assert_eq!(record.content, "durable");
    }

    #[tokio::test]
    async fn test_record_access() {
        let store = SqliteVectorStore::in_memory().unwrap();
        let record = store.insert(new_memory("alice", "counted")).await.unwrap();

        store.record_access(&record.id).unwrap();
        store.record_access(&record.id).unwrap();

        let fetched = store.get_by_id(&record.id, false).await.unwrap().unwrap();
        assert_eq!(fetched.access_count, 2);
    }
}
