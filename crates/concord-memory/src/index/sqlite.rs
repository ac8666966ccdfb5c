//! Persistent index on SQLite with the sqlite-vec extension.
//!
//! All collections share one `points` table. Vectors are stored as raw
//! `f32` blobs and ranked with `vec_distance_cosine`; payloads are JSON text
//! and filters compile to `json_extract` predicates, so filtering happens
//! inside the ranking query.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Once;

use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OpenFlags, OptionalExtension, params, params_from_iter};
use serde_json::{Map, Value};
use tracing::{debug, info};
use zerocopy::IntoBytes;

use concord_embed::is_zero_vector;
use concord_types::Id;

use super::{Point, ScoredPoint, VectorIndex};
use crate::error::{MemoryError, Result};
use crate::filter::Filter;
use crate::validation::validate_embedding;

/// Current schema version for migrations.
const SCHEMA_VERSION: i32 = 1;

static VEC_INIT: Once = Once::new();

/// Register sqlite-vec with every connection opened afterwards.
///
/// Safe to call repeatedly; registration happens once per process.
pub fn init_vector_extension() {
    VEC_INIT.call_once(|| {
        use rusqlite::ffi::sqlite3_auto_extension;
        use sqlite_vec::sqlite3_vec_init;

        unsafe {
            #[allow(clippy::missing_transmute_annotations)]
            sqlite3_auto_extension(Some(std::mem::transmute(sqlite3_vec_init as *const ())));
        }
    });
}

/// [`VectorIndex`] backed by a single SQLite database.
pub struct SqliteIndex {
    conn: Mutex<Connection>,
}

impl std::fmt::Debug for SqliteIndex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqliteIndex").finish_non_exhaustive()
    }
}

impl SqliteIndex {
    /// Open or create an index at the given path.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|_| {
                MemoryError::Database(rusqlite::Error::InvalidPath(path.to_path_buf()))
            })?;
        }

        init_vector_extension();
        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_FULL_MUTEX,
        )?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "synchronous", "NORMAL")?;

        let index = Self::from_connection(conn)?;
        info!("Vector index opened at {:?}", path);
        Ok(index)
    }

    /// Create an in-memory index (useful for testing).
    pub fn open_in_memory() -> Result<Self> {
        init_vector_extension();
        let conn = Connection::open_in_memory()?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let version: String = conn.query_row("SELECT vec_version()", [], |row| row.get(0))?;
        debug!("sqlite-vec {} loaded", version);
        create_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

fn create_schema(conn: &Connection) -> Result<()> {
    let current_version: i32 = conn
        .pragma_query_value(None, "user_version", |row| row.get(0))
        .unwrap_or(0);
    if current_version >= SCHEMA_VERSION {
        debug!("Schema up to date (version {})", current_version);
        return Ok(());
    }

    conn.execute_batch(
        r#"
        CREATE TABLE IF NOT EXISTS collections (
            name TEXT PRIMARY KEY,
            dimensions INTEGER NOT NULL,
            created_at TEXT NOT NULL DEFAULT (datetime('now'))
        );

        -- seq gives scroll its insertion order and survives upserts
        CREATE TABLE IF NOT EXISTS points (
            seq INTEGER PRIMARY KEY AUTOINCREMENT,
            collection TEXT NOT NULL REFERENCES collections(name),
            id TEXT NOT NULL,
            vector BLOB NOT NULL,
            payload TEXT NOT NULL,
            UNIQUE (collection, id)
        );
        "#,
    )?;
    conn.pragma_update(None, "user_version", SCHEMA_VERSION)?;
    info!("Created index schema version {}", SCHEMA_VERSION);
    Ok(())
}

fn collection_dimensions(conn: &Connection, collection: &str) -> Result<usize> {
    let dims: Option<i64> = conn
        .query_row(
            "SELECT dimensions FROM collections WHERE name = ?1",
            params![collection],
            |row| row.get(0),
        )
        .optional()?;
    dims.map(|d| d as usize)
        .ok_or_else(|| MemoryError::NotFound(format!("collection {collection}")))
}

fn decode_vector(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|c| f32::from_ne_bytes([c[0], c[1], c[2], c[3]]))
        .collect()
}

fn decode_payload(text: &str) -> Result<Map<String, Value>> {
    Ok(serde_json::from_str(text)?)
}

fn parse_id(text: &str) -> Result<Id> {
    Id::parse_str(text).map_err(|e| MemoryError::InvalidData(format!("bad point id {text}: {e}")))
}

fn id_list(ids: &[Id], params: &mut Vec<SqlValue>) -> String {
    params.extend(ids.iter().map(|id| SqlValue::Text(id.to_string())));
    vec!["?"; ids.len()].join(", ")
}

fn sql_limit(limit: usize) -> SqlValue {
    // SQLite reads a negative LIMIT as unbounded.
    SqlValue::Integer(i64::try_from(limit).unwrap_or(-1))
}

impl VectorIndex for SqliteIndex {
    fn ensure_collection(&self, collection: &str, dimensions: usize) -> Result<()> {
        let conn = self.conn.lock();
        match collection_dimensions(&conn, collection) {
            Ok(existing) if existing != dimensions => Err(MemoryError::InvalidData(format!(
                "collection {collection} has {existing} dimensions, requested {dimensions}"
            ))),
            Ok(_) => Ok(()),
            Err(MemoryError::NotFound(_)) => {
                conn.execute(
                    "INSERT INTO collections (name, dimensions) VALUES (?1, ?2)",
                    params![collection, dimensions as i64],
                )?;
                info!("Created collection {} with {} dimensions", collection, dimensions);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn upsert(&self, collection: &str, point: Point) -> Result<()> {
        let conn = self.conn.lock();
        validate_embedding(&point.vector, collection_dimensions(&conn, collection)?)?;
        conn.execute(
            r#"
            INSERT INTO points (collection, id, vector, payload)
            VALUES (?1, ?2, ?3, ?4)
            ON CONFLICT (collection, id)
            DO UPDATE SET vector = excluded.vector, payload = excluded.payload
            "#,
            params![
                collection,
                point.id.to_string(),
                point.vector.as_bytes(),
                serde_json::to_string(&point.payload)?,
            ],
        )?;
        debug!("Upserted point {} into {}", point.id, collection);
        Ok(())
    }

    fn query(
        &self,
        collection: &str,
        vector: &[f32],
        filter: &Filter,
        limit: usize,
    ) -> Result<Vec<ScoredPoint>> {
        let conn = self.conn.lock();
        validate_embedding(vector, collection_dimensions(&conn, collection)?)?;

        let mut params = Vec::new();
        let sql = if is_zero_vector(vector) {
            params.push(SqlValue::Text(collection.to_string()));
            let predicate = filter.to_sql(&mut params)?;
            format!(
                "SELECT id, payload, 0.0 FROM points \
                 WHERE collection = ? AND {predicate} ORDER BY seq LIMIT ?"
            )
        } else {
            params.push(SqlValue::Blob(vector.as_bytes().to_vec()));
            params.push(SqlValue::Text(collection.to_string()));
            let predicate = filter.to_sql(&mut params)?;
            format!(
                "SELECT id, payload, 1.0 - vec_distance_cosine(vector, ?) AS score FROM points \
                 WHERE collection = ? AND {predicate} \
                 ORDER BY score IS NULL, score DESC, seq LIMIT ?"
            )
        };
        params.push(sql_limit(limit));

        let mut stmt = conn.prepare(&sql)?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut hits = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let payload: String = row.get(1)?;
            let score: Option<f64> = row.get(2)?;
            hits.push(ScoredPoint {
                id: parse_id(&id)?,
                score: score.unwrap_or(0.0) as f32,
                payload: decode_payload(&payload)?,
            });
        }
        Ok(hits)
    }

    fn scroll(&self, collection: &str, filter: &Filter, limit: usize) -> Result<Vec<Point>> {
        let conn = self.conn.lock();
        collection_dimensions(&conn, collection)?;

        let mut params = vec![SqlValue::Text(collection.to_string())];
        let predicate = filter.to_sql(&mut params)?;
        params.push(sql_limit(limit));

        let mut stmt = conn.prepare(&format!(
            "SELECT id, vector, payload FROM points \
             WHERE collection = ? AND {predicate} ORDER BY seq LIMIT ?"
        ))?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut points = Vec::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let vector: Vec<u8> = row.get(1)?;
            let payload: String = row.get(2)?;
            points.push(Point::new(
                parse_id(&id)?,
                decode_vector(&vector),
                decode_payload(&payload)?,
            ));
        }
        Ok(points)
    }

    fn retrieve(&self, collection: &str, ids: &[Id]) -> Result<Vec<Point>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let conn = self.conn.lock();
        collection_dimensions(&conn, collection)?;

        let mut params = vec![SqlValue::Text(collection.to_string())];
        let marks = id_list(ids, &mut params);
        let mut stmt = conn.prepare(&format!(
            "SELECT id, vector, payload FROM points WHERE collection = ? AND id IN ({marks})"
        ))?;
        let mut rows = stmt.query(params_from_iter(params.iter()))?;
        let mut found = HashMap::new();
        while let Some(row) = rows.next()? {
            let id: String = row.get(0)?;
            let vector: Vec<u8> = row.get(1)?;
            let payload: String = row.get(2)?;
            let id = parse_id(&id)?;
            found.insert(id, Point::new(id, decode_vector(&vector), decode_payload(&payload)?));
        }
        Ok(ids.iter().filter_map(|id| found.remove(id)).collect())
    }

    fn set_payload(&self, collection: &str, id: Id, patch: Map<String, Value>) -> Result<bool> {
        let conn = self.conn.lock();
        let current: Option<String> = conn
            .query_row(
                "SELECT payload FROM points WHERE collection = ?1 AND id = ?2",
                params![collection, id.to_string()],
                |row| row.get(0),
            )
            .optional()?;
        let Some(current) = current else {
            return Ok(false);
        };

        let mut payload = decode_payload(&current)?;
        payload.extend(patch);
        conn.execute(
            "UPDATE points SET payload = ?1 WHERE collection = ?2 AND id = ?3",
            params![serde_json::to_string(&payload)?, collection, id.to_string()],
        )?;
        Ok(true)
    }

    fn delete(&self, collection: &str, ids: &[Id]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }
        let conn = self.conn.lock();
        let mut params = vec![SqlValue::Text(collection.to_string())];
        let marks = id_list(ids, &mut params);
        let removed = conn.execute(
            &format!("DELETE FROM points WHERE collection = ? AND id IN ({marks})"),
            params_from_iter(params.iter()),
        )?;
        debug!("Deleted {} points from {}", removed, collection);
        Ok(removed)
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<usize> {
        let conn = self.conn.lock();
        let mut params = vec![SqlValue::Text(collection.to_string())];
        let predicate = filter.to_sql(&mut params)?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM points WHERE collection = ? AND {predicate}"),
            params_from_iter(params.iter()),
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}
