use std::collections::BTreeMap;
use std::time::{SystemTime, UNIX_EPOCH};

use anyhow::{anyhow, Context, Result};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};

use crate::counting::CountSnapshot;

/// Persisted result of one processed upload.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountDocument {
    pub total_count: u64,
    pub counts_by_class: BTreeMap<String, u64>,
}

impl From<&CountSnapshot> for CountDocument {
    fn from(snapshot: &CountSnapshot) -> Self {
        Self {
            total_count: snapshot.total_count(),
            counts_by_class: snapshot.counts_by_class().clone(),
        }
    }
}

/// Keyed document store for count results. Writing an existing id replaces it.
pub trait ResultStore: Send {
    fn put(&mut self, id: &str, doc: &CountDocument) -> Result<()>;

    fn get(&mut self, id: &str) -> Result<Option<CountDocument>>;

    /// All stored ids, oldest first.
    fn ids(&mut self) -> Result<Vec<String>>;
}

pub struct SqliteResultStore {
    conn: Connection,
}

impl SqliteResultStore {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(db_path)
            .with_context(|| format!("failed to open result store {}", db_path))?;
        let mut store = Self { conn };
        store.ensure_schema()?;
        Ok(store)
    }

    fn ensure_schema(&mut self) -> Result<()> {
        self.conn.execute_batch(
            r#"
            PRAGMA journal_mode=WAL;

            CREATE TABLE IF NOT EXISTS results (
              id TEXT PRIMARY KEY,
              created_at INTEGER NOT NULL,
              payload_json TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_results_created ON results(created_at);
            "#,
        )?;
        Ok(())
    }
}

impl ResultStore for SqliteResultStore {
    fn put(&mut self, id: &str, doc: &CountDocument) -> Result<()> {
        let created_at = i64::try_from(now_s()?)
            .map_err(|_| anyhow!("timestamp exceeds i64 range"))?;
        let payload = serde_json::to_string(doc)?;
        self.conn.execute(
            "INSERT OR REPLACE INTO results(id, created_at, payload_json) VALUES (?1, ?2, ?3)",
            params![id, created_at, payload],
        )?;
        Ok(())
    }

    fn get(&mut self, id: &str) -> Result<Option<CountDocument>> {
        let payload: Option<String> = self
            .conn
            .query_row(
                "SELECT payload_json FROM results WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .optional()?;
        payload
            .map(|json| {
                serde_json::from_str(&json)
                    .with_context(|| format!("corrupt result document for {}", id))
            })
            .transpose()
    }

    fn ids(&mut self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id FROM results ORDER BY created_at ASC, rowid ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut out = Vec::new();
        for row in rows {
            out.push(row?);
        }
        Ok(out)
    }
}

/// Volatile store, for tests and dry runs.
#[derive(Debug, Default)]
pub struct InMemoryResultStore {
    docs: BTreeMap<String, (u64, CountDocument)>,
    next_seq: u64,
}

impl InMemoryResultStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ResultStore for InMemoryResultStore {
    fn put(&mut self, id: &str, doc: &CountDocument) -> Result<()> {
        self.next_seq += 1;
        self.docs
            .insert(id.to_string(), (self.next_seq, doc.clone()));
        Ok(())
    }

    fn get(&mut self, id: &str) -> Result<Option<CountDocument>> {
        Ok(self.docs.get(id).map(|(_, doc)| doc.clone()))
    }

    fn ids(&mut self) -> Result<Vec<String>> {
        let mut entries: Vec<(&u64, &String)> =
            self.docs.iter().map(|(id, (seq, _))| (seq, id)).collect();
        entries.sort();
        Ok(entries.into_iter().map(|(_, id)| id.clone()).collect())
    }
}

fn now_s() -> Result<u64> {
    Ok(SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|_| anyhow!("system clock before unix epoch"))?
        .as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(n: u64) -> CountDocument {
        CountDocument {
            total_count: n,
            counts_by_class: BTreeMap::from([("grain".to_string(), n)]),
        }
    }

    fn exercise(store: &mut dyn ResultStore) -> Result<()> {
        assert_eq!(store.get("a")?, None);
        store.put("a", &doc(1))?;
        store.put("b", &doc(2))?;
        assert_eq!(store.get("a")?, Some(doc(1)));
        store.put("a", &doc(3))?;
        assert_eq!(store.get("a")?, Some(doc(3)));
        let mut ids = store.ids()?;
        ids.sort();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);
        Ok(())
    }

    #[test]
    fn sqlite_store_round_trips_documents() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("results.db");
        let path = path.to_string_lossy().into_owned();
        exercise(&mut SqliteResultStore::open(&path)?)?;

        let mut reopened = SqliteResultStore::open(&path)?;
        assert_eq!(reopened.get("b")?, Some(doc(2)));
        Ok(())
    }

    #[test]
    fn memory_store_behaves_like_sqlite() -> Result<()> {
        exercise(&mut InMemoryResultStore::new())
    }
}
