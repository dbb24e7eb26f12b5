use crate::db::migrations;
use crate::libs::data_storage::DataStorage;
use anyhow::Result;
use parking_lot::{Mutex, MutexGuard};
use rusqlite::Connection;
use std::path::Path;
use std::sync::Arc;

pub const DB_FILE_NAME: &str = "vigil.db";

/// Shared handle to the SQLite store.
///
/// All business transactions serialise on the connection mutex; inside a
/// transaction SQLite's own locking keeps concurrent processes out. This is
/// the single serialisation point per record the concurrency model relies on.
#[derive(Clone)]
pub struct Db {
    conn: Arc<Mutex<Connection>>,
}

impl Db {
    /// Opens (and migrates) the database in the platform data directory.
    pub fn new() -> Result<Db> {
        let db_file_path = DataStorage::new().get_path(DB_FILE_NAME)?;
        Self::open(&db_file_path)
    }

    /// Opens (and migrates) the database at an explicit path.
    pub fn open(path: &Path) -> Result<Db> {
        let mut conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;

        migrations::init_with_migrations(&mut conn)?;

        Ok(Db {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Acquires the connection for the duration of one business transaction.
    pub fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock()
    }
}
