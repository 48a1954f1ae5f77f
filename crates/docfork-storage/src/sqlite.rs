//! SQLite storage engine

use docfork_core::codec::{decode_body, encode_body};
use docfork_core::{
    Digest, DocumentId, Result, RevisionRef, RevisionStore, RevisionTree, StorageError,
    StoreTransaction, TreeTransaction,
};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use tracing::debug;

/// SQLite storage engine
///
/// Embedded persistence for single-node setups. A transaction loads the
/// document's revision tree, runs the pipeline against it, and writes the
/// appended revisions plus the new head in one SQLite transaction. The
/// connection lock serializes writers for the whole sequence.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

fn db_err(e: rusqlite::Error) -> StorageError {
    StorageError::Database(e.to_string())
}

impl SqliteStore {
    /// Open (or create) a database file
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory SQLite database (for testing)
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS revisions (
                doc_id TEXT NOT NULL,
                seq INTEGER NOT NULL,
                generation INTEGER NOT NULL,
                digest BLOB NOT NULL,
                deleted INTEGER NOT NULL,
                body BLOB NOT NULL,
                parent INTEGER,
                merged INTEGER,
                PRIMARY KEY (doc_id, seq)
            );

            CREATE TABLE IF NOT EXISTS heads (
                doc_id TEXT PRIMARY KEY,
                seq INTEGER NOT NULL,
                updated_at INTEGER NOT NULL DEFAULT (strftime('%s', 'now') * 1000)
            );
            "#,
        )
        .map_err(db_err)?;

        Ok(())
    }

    /// Number of documents with a current revision
    pub fn document_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM heads", [], |row| row.get(0))
            .map_err(db_err)?;
        Ok(count as usize)
    }

    fn load_tree(conn: &Connection, doc_id: &DocumentId) -> Result<RevisionTree> {
        let mut stmt = conn
            .prepare(
                "SELECT generation, digest, deleted, body, parent, merged
                 FROM revisions WHERE doc_id = ?1 ORDER BY seq",
            )
            .map_err(db_err)?;

        let rows = stmt
            .query_map(params![doc_id.as_str()], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, Vec<u8>>(1)?,
                    row.get::<_, bool>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                    row.get::<_, Option<i64>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                ))
            })
            .map_err(db_err)?;

        let mut tree = RevisionTree::new();
        for row in rows {
            let (generation, digest, deleted, body, parent, merged) = row.map_err(db_err)?;
            let digest: [u8; 32] = digest
                .try_into()
                .map_err(|_| StorageError::Database(format!("corrupt digest for {}", doc_id)))?;
            let revision = RevisionRef {
                generation: generation as u64,
                digest: Digest::from_bytes(digest),
                deleted,
            };
            tree.insert(
                revision,
                decode_body(&body)?,
                parent.map(|p| p as usize),
                merged.map(|m| m as usize),
            );
        }

        let head: Option<i64> = conn
            .query_row(
                "SELECT seq FROM heads WHERE doc_id = ?1",
                params![doc_id.as_str()],
                |row| row.get(0),
            )
            .optional()
            .map_err(db_err)?;
        if let Some(seq) = head {
            tree.set_head(seq as usize);
        }

        Ok(tree)
    }

    fn persist(conn: &mut Connection, doc_id: &DocumentId, tree: &RevisionTree, from: usize) -> Result<()> {
        let Some(head) = tree.head_index() else {
            return Ok(());
        };

        let tx = conn.transaction().map_err(db_err)?;
        {
            let mut insert = tx
                .prepare(
                    "INSERT INTO revisions (doc_id, seq, generation, digest, deleted, body, parent, merged)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(db_err)?;

            for (seq, node) in tree.nodes().iter().enumerate().skip(from) {
                insert
                    .execute(params![
                        doc_id.as_str(),
                        seq as i64,
                        node.revision.generation as i64,
                        node.revision.digest.as_bytes().as_slice(),
                        node.revision.deleted,
                        encode_body(&node.body)?,
                        node.parent.map(|p| p as i64),
                        node.merged.map(|m| m as i64),
                    ])
                    .map_err(db_err)?;
            }
        }

        tx.execute(
            r#"
            INSERT INTO heads (doc_id, seq, updated_at)
            VALUES (?1, ?2, strftime('%s', 'now') * 1000)
            ON CONFLICT(doc_id) DO UPDATE SET
                seq = excluded.seq,
                updated_at = excluded.updated_at
            "#,
            params![doc_id.as_str(), head as i64],
        )
        .map_err(db_err)?;

        tx.commit().map_err(db_err)?;
        debug!(doc = %doc_id, appended = tree.len() - from, "Persisted revisions");
        Ok(())
    }
}

impl RevisionStore for SqliteStore {
    fn in_transaction<T, F>(&self, doc_id: &DocumentId, f: F) -> Result<T>
    where
        F: FnOnce(&mut dyn StoreTransaction) -> Result<T>,
    {
        let mut conn = self.conn.lock();
        let mut tree = Self::load_tree(&conn, doc_id)?;
        let loaded = tree.len();
        let head = tree.head_index();

        let value = f(&mut TreeTransaction::new(doc_id, &mut tree))?;

        if tree.len() > loaded || tree.head_index() != head {
            Self::persist(&mut conn, doc_id, &tree, loaded)?;
        }
        Ok(value)
    }
}
