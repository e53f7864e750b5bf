//! Fixed-size pool of SQLite connections served by blocking workers.

use std::path::Path;
use std::sync::{Arc, Mutex};

use rusqlite::{Connection, OpenFlags};
use tokio::sync::Semaphore;
use tracing::trace;

use crate::error::LocalStoreError;

/// Every job gets exclusive use of one connection on a `spawn_blocking` thread.
/// At most `size` jobs run at once; the rest wait for a permit without blocking
/// the async caller.
#[derive(Clone)]
pub struct WorkerPool {
    connections: Arc<Mutex<Vec<Connection>>>,
    permits: Arc<Semaphore>,
    size: usize,
}

impl WorkerPool {
    pub fn open_file(path: &Path, size: usize) -> Result<Self, LocalStoreError> {
        let connections = (0..size.max(1))
            .map(|_| {
                let conn = Connection::open(path)?;
                conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| {
                    row.get::<_, String>(0)
                })?;
                conn.busy_timeout(std::time::Duration::from_secs(5))?;
                Ok(conn)
            })
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        Ok(Self::from_connections(connections))
    }

    /// All connections share one in-memory database, alive as long as the pool is.
    pub fn open_in_memory(size: usize) -> Result<Self, LocalStoreError> {
        let uri = format!("file:eventtracker-{}?mode=memory&cache=shared", uuid::Uuid::new_v4());
        let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
            | OpenFlags::SQLITE_OPEN_CREATE
            | OpenFlags::SQLITE_OPEN_URI
            | OpenFlags::SQLITE_OPEN_NO_MUTEX;

        let connections = (0..size.max(1))
            .map(|_| Connection::open_with_flags(&uri, flags))
            .collect::<Result<Vec<_>, rusqlite::Error>>()?;

        Ok(Self::from_connections(connections))
    }

    fn from_connections(connections: Vec<Connection>) -> Self {
        let size = connections.len();
        WorkerPool {
            connections: Arc::new(Mutex::new(connections)),
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Run `job` against a pooled connection.
    pub async fn run<T, F>(&self, job: F) -> Result<T, LocalStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut Connection) -> Result<T, LocalStoreError> + Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| LocalStoreError::Closed)?;
        let connections = self.connections.clone();

        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let mut conn = connections
                .lock()
                .map_err(|_| LocalStoreError::Closed)?
                .pop()
                .ok_or(LocalStoreError::Closed)?;
            trace!("cache job started");

            let result = job(&mut conn);

            if let Ok(mut pool) = connections.lock() {
                pool.push(conn);
            }
            result
        })
        .await
        .map_err(|e| LocalStoreError::Io(format!("cache worker failed: {}", e)))?
    }

    /// Refuse new jobs. Jobs already running finish normally.
    pub fn close(&self) {
        self.permits.close();
    }
}
