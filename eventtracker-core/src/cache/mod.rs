//! On-device relational mirror of events.
//!
//! One `Event` table, no link back to the remote store. Every call runs on the
//! cache's worker pool, never on the caller's task.

pub mod pool;

use std::path::Path;

use rusqlite::{OptionalExtension, Row, params};
use tracing::{debug, info, instrument};

use crate::error::LocalStoreError;
use crate::event::Event;

pub use pool::WorkerPool;

/// Workers (and connections) when no size is configured.
pub const DEFAULT_WORKERS: usize = 4;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS Event (
    id TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    time TEXT,
    date TEXT
)";

const COLUMNS: &str = "id, title, time, date";

#[derive(Clone)]
pub struct LocalCache {
    pool: WorkerPool,
}

impl LocalCache {
    /// Open (creating if needed) a cache database file.
    #[instrument]
    pub async fn open(path: &Path, workers: usize) -> Result<Self, LocalStoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| LocalStoreError::Io(e.to_string()))?;
        }
        let cache = LocalCache {
            pool: WorkerPool::open_file(path, workers)?,
        };
        cache.create_schema().await?;
        info!(workers = cache.pool.size(), "local cache opened");
        Ok(cache)
    }

    pub async fn open_in_memory(workers: usize) -> Result<Self, LocalStoreError> {
        let cache = LocalCache {
            pool: WorkerPool::open_in_memory(workers)?,
        };
        cache.create_schema().await?;
        Ok(cache)
    }

    async fn create_schema(&self) -> Result<(), LocalStoreError> {
        self.pool
            .run(|conn| {
                conn.execute_batch(SCHEMA)?;
                Ok(())
            })
            .await
    }

    pub fn workers(&self) -> usize {
        self.pool.size()
    }

    /// First record with exactly this title.
    pub async fn get_event(&self, title: &str) -> Result<Option<Event>, LocalStoreError> {
        let title = title.to_string();
        self.pool
            .run(move |conn| {
                let sql = format!("SELECT {COLUMNS} FROM Event WHERE title = ?1 LIMIT 1");
                Ok(conn
                    .query_row(&sql, params![title], event_from_row)
                    .optional()?)
            })
            .await
    }

    /// Every record, ordered by the date column as text (case-insensitive).
    ///
    /// Dates are `MM/DD/YYYY` strings, so this is not calendar order:
    /// `01/02/2024` comes before `12/01/2023`.
    pub async fn get_events(&self) -> Result<Vec<Event>, LocalStoreError> {
        self.pool
            .run(|conn| {
                let sql = format!("SELECT {COLUMNS} FROM Event ORDER BY date COLLATE NOCASE");
                let mut stmt = conn.prepare(&sql)?;
                let events = stmt
                    .query_map([], event_from_row)?
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(events)
            })
            .await
    }

    /// Insert, or replace the record with the same id. Returns the row id.
    #[instrument(skip(self, event), fields(id = %event.id))]
    pub async fn add_event(&self, event: &Event) -> Result<i64, LocalStoreError> {
        let event = event.clone();
        let rowid = self
            .pool
            .run(move |conn| {
                conn.execute(
                    "INSERT OR REPLACE INTO Event (id, title, time, date) VALUES (?1, ?2, ?3, ?4)",
                    params![event.id, event.title, event.time, event.date],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await?;
        debug!(rowid, "cached event");
        Ok(rowid)
    }

    /// Overwrite the record with the same id. Returns the number of rows changed.
    pub async fn update_event(&self, event: &Event) -> Result<usize, LocalStoreError> {
        let event = event.clone();
        self.pool
            .run(move |conn| {
                Ok(conn.execute(
                    "UPDATE Event SET title = ?2, time = ?3, date = ?4 WHERE id = ?1",
                    params![event.id, event.title, event.time, event.date],
                )?)
            })
            .await
    }

    /// Returns the number of rows deleted.
    pub async fn delete_event(&self, id: &str) -> Result<usize, LocalStoreError> {
        let id = id.to_string();
        self.pool
            .run(move |conn| Ok(conn.execute("DELETE FROM Event WHERE id = ?1", params![id])?))
            .await
    }

    /// Make the table hold exactly `events`, in one transaction.
    #[instrument(skip(self, events), fields(count = events.len()))]
    pub async fn replace_all(&self, events: &[Event]) -> Result<usize, LocalStoreError> {
        let events = events.to_vec();
        self.pool
            .run(move |conn| {
                let tx = conn.transaction()?;
                tx.execute("DELETE FROM Event", [])?;
                {
                    let mut insert = tx.prepare(
                        "INSERT OR REPLACE INTO Event (id, title, time, date) VALUES (?1, ?2, ?3, ?4)",
                    )?;
                    for event in &events {
                        insert.execute(params![event.id, event.title, event.time, event.date])?;
                    }
                }
                tx.commit()?;
                Ok(events.len())
            })
            .await
    }

    /// Stop accepting work. Later calls fail with `Closed`.
    pub fn close(&self) {
        self.pool.close();
    }
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    let mut event = Event::default();
    event.id = row.get(0)?;
    event.title = row.get(1)?;
    event.time = row.get::<_, Option<String>>(2)?.unwrap_or_default();
    event.date = row.get::<_, Option<String>>(3)?.unwrap_or_default();
    Ok(event)
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn cache() -> LocalCache {
        LocalCache::open_in_memory(2).await.unwrap()
    }

    #[tokio::test]
    async fn add_then_fetch_by_title() {
        let cache = cache().await;
        let standup = Event::new("k1", "Standup", "03/05/2024", "9:00AM");
        cache.add_event(&standup).await.unwrap();

        assert_eq!(cache.get_event("Standup").await.unwrap(), Some(standup));
        assert_eq!(cache.get_event("standup").await.unwrap(), None);
    }

    #[tokio::test]
    async fn add_replaces_same_id() {
        let cache = cache().await;
        cache
            .add_event(&Event::new("k1", "Standup", "03/05/2024", "9:00AM"))
            .await
            .unwrap();
        cache
            .add_event(&Event::new("k1", "Standup", "03/06/2024", "9:30AM"))
            .await
            .unwrap();

        let events = cache.get_events().await.unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].date, "03/06/2024");
    }

    #[tokio::test]
    async fn fetch_all_orders_dates_as_text() {
        let cache = cache().await;
        cache
            .add_event(&Event::new("a", "Old", "12/01/2023", "9:00AM"))
            .await
            .unwrap();
        cache
            .add_event(&Event::new("b", "New", "01/02/2024", "9:00AM"))
            .await
            .unwrap();

        let titles: Vec<_> = cache
            .get_events()
            .await
            .unwrap()
            .into_iter()
            .map(|e| e.title)
            .collect();
        assert_eq!(titles, vec!["New", "Old"]);
    }

    #[tokio::test]
    async fn update_and_delete_report_affected_rows() {
        let cache = cache().await;
        let mut event = Event::new("k1", "Standup", "03/05/2024", "9:00AM");
        cache.add_event(&event).await.unwrap();

        event.time = "10:00AM".into();
        assert_eq!(cache.update_event(&event).await.unwrap(), 1);
        assert_eq!(
            cache.get_event("Standup").await.unwrap().unwrap().time,
            "10:00AM"
        );

        assert_eq!(cache.delete_event("k1").await.unwrap(), 1);
        assert_eq!(cache.delete_event("k1").await.unwrap(), 0);
        assert_eq!(
            cache
                .update_event(&Event::new("zz", "Ghost", "", ""))
                .await
                .unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn replace_all_mirrors_snapshot() {
        let cache = cache().await;
        cache
            .add_event(&Event::new("stale", "Gone", "01/01/2020", "1:00PM"))
            .await
            .unwrap();

        let snapshot = vec![
            Event::new("k1", "Standup", "03/05/2024", "9:00AM"),
            Event::new("k2", "Retro", "03/08/2024", "4:00PM"),
        ];
        assert_eq!(cache.replace_all(&snapshot).await.unwrap(), 2);
        assert_eq!(cache.get_events().await.unwrap(), snapshot);
    }

    #[tokio::test]
    async fn closed_cache_refuses_work() {
        let cache = cache().await;
        cache.close();
        assert_eq!(
            cache.get_events().await.unwrap_err(),
            LocalStoreError::Closed
        );
    }

    #[tokio::test]
    async fn file_cache_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("event.db");

        {
            let cache = LocalCache::open(&path, DEFAULT_WORKERS).await.unwrap();
            assert_eq!(cache.workers(), DEFAULT_WORKERS);
            cache
                .add_event(&Event::new("k1", "Standup", "03/05/2024", "9:00AM"))
                .await
                .unwrap();
        }

        let reopened = LocalCache::open(&path, 1).await.unwrap();
        assert_eq!(reopened.get_events().await.unwrap().len(), 1);
    }
}
