//! FOTA Registry Module
//! SQLite-backed device registry with connection pooling

use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub type DbPool = Pool<SqliteConnectionManager>;
pub type DbConnection = PooledConnection<SqliteConnectionManager>;

#[derive(Error, Debug)]
pub enum RegistryError {
    #[error("Failed to create registry pool: {0}")]
    PoolError(#[from] r2d2::Error),
    #[error("SQLite error: {0}")]
    SqliteError(#[from] rusqlite::Error),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Desired firmware state for one device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceRecord {
    pub device_id: String,
    pub desired_version: String,
    pub firmware_ref: String,
}

impl DeviceRecord {
    pub fn new(
        device_id: impl Into<String>,
        desired_version: impl Into<String>,
        firmware_ref: impl Into<String>,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            desired_version: desired_version.into(),
            firmware_ref: firmware_ref.into(),
        }
    }
}

#[derive(Clone)]
pub struct RegistryStore {
    pool: DbPool,
}

impl RegistryStore {
    pub fn open(db_path: &Path) -> Result<Self, RegistryError> {
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let manager = SqliteConnectionManager::file(db_path)
            .with_init(|conn| conn.busy_timeout(Duration::from_secs(5)));
        let pool = Pool::builder().max_size(10).build(manager)?;

        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    pub fn in_memory() -> Result<Self, RegistryError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder().max_size(1).build(manager)?;
        let store = Self { pool };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<(), RegistryError> {
        let conn = self.pool.get()?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS device_app (
                device_id TEXT PRIMARY KEY NOT NULL,
                app_ver TEXT NOT NULL,
                update_file_path TEXT NOT NULL
            )",
            [],
        )?;

        // WAL lets readers proceed while a writer holds the lock
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        Ok(())
    }

    fn get_connection(&self) -> Result<DbConnection, RegistryError> {
        Ok(self.pool.get()?)
    }

    pub fn get(&self, device_id: &str) -> Result<Option<DeviceRecord>, RegistryError> {
        let conn = self.get_connection()?;
        let record = conn
            .query_row(
                "SELECT device_id, app_ver, update_file_path FROM device_app WHERE device_id = ?1",
                params![device_id],
                |row| {
                    Ok(DeviceRecord {
                        device_id: row.get(0)?,
                        desired_version: row.get(1)?,
                        firmware_ref: row.get(2)?,
                    })
                },
            )
            .optional()?;
        Ok(record)
    }

    /// Insert or replace the record for `record.device_id` in one statement.
    pub fn put(&self, record: &DeviceRecord) -> Result<(), RegistryError> {
        let conn = self.get_connection()?;
        conn.execute(
            "INSERT INTO device_app (device_id, app_ver, update_file_path) VALUES (?1, ?2, ?3)
             ON CONFLICT(device_id) DO UPDATE SET
                app_ver = excluded.app_ver,
                update_file_path = excluded.update_file_path",
            params![record.device_id, record.desired_version, record.firmware_ref],
        )?;
        Ok(())
    }

    /// Returns whether a record existed.
    pub fn delete(&self, device_id: &str) -> Result<bool, RegistryError> {
        let conn = self.get_connection()?;
        let affected = conn.execute(
            "DELETE FROM device_app WHERE device_id = ?1",
            params![device_id],
        )?;
        Ok(affected > 0)
    }

    /// Snapshot of every row, read inside a single transaction.
    pub fn list_all(&self) -> Result<Vec<DeviceRecord>, RegistryError> {
        let mut conn = self.get_connection()?;
        let tx = conn.transaction()?;
        let records = {
            let mut stmt =
                tx.prepare("SELECT device_id, app_ver, update_file_path FROM device_app")?;
            let rows = stmt.query_map([], |row| {
                Ok(DeviceRecord {
                    device_id: row.get(0)?,
                    desired_version: row.get(1)?,
                    firmware_ref: row.get(2)?,
                })
            })?;
            rows.collect::<Result<Vec<DeviceRecord>, _>>()?
        };
        tx.commit()?;
        Ok(records)
    }
}
