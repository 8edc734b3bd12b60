//! Photo repository trait and SQLite implementation.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::Connection;
use tokio::sync::{mpsc, oneshot};

use super::error::StateError;
use super::schema;
use super::types::{sort_records, PhotoFilter, PhotoRecord, SortKey};
use crate::flickr::RawPhoto;

/// Metadata store operations.
///
/// Object-safe so it can be shared as `Arc<dyn PhotoRepository>`.
#[async_trait]
pub trait PhotoRepository: Send + Sync {
    /// Return the record for `raw.id`, creating and staging it if unseen.
    ///
    /// Lookup and insert happen under one lock, so concurrent calls with the
    /// same id always agree on a single record.
    async fn find_or_create(&self, raw: &RawPhoto) -> Result<PhotoRecord, StateError>;

    /// Saved records matching `filter`, ordered by `sort`. Empty `sort`
    /// leaves the order unspecified.
    async fn query_all(
        &self,
        filter: Option<&PhotoFilter>,
        sort: &[SortKey],
    ) -> Result<Vec<PhotoRecord>, StateError>;

    /// Save staged changes.
    ///
    /// The foreground commit completes before this returns; the background
    /// commit to disk is dispatched afterwards and can be awaited through
    /// the returned receipt.
    async fn persist_pending(&self) -> Result<SaveReceipt, StateError>;

    /// Delete every record and save.
    async fn reset_all(&self) -> Result<SaveReceipt, StateError>;

    /// Number of saved records.
    async fn count(&self) -> Result<u64, StateError>;

    /// Wait until every dispatched background save has finished.
    async fn flush(&self) -> Result<(), StateError>;
}

/// Handle on one background save.
///
/// Dropping it is fine; the save proceeds regardless.
#[derive(Debug)]
pub struct SaveReceipt {
    rx: Option<oneshot::Receiver<Result<(), StateError>>>,
}

impl SaveReceipt {
    fn clean() -> Self {
        Self { rx: None }
    }

    /// True when there was nothing to save.
    pub fn is_noop(&self) -> bool {
        self.rx.is_none()
    }

    /// Wait for the background commit.
    pub async fn durable(self) -> Result<(), StateError> {
        match self.rx {
            None => Ok(()),
            Some(rx) => rx
                .await
                .map_err(|_| StateError::Persistence("background writer stopped".to_string()))?,
        }
    }
}

/// Changes staged in the foreground since the last save.
#[derive(Debug, Default)]
struct ChangeSet {
    delete_all: bool,
    inserts: Vec<PhotoRecord>,
}

/// Caller-facing view. `saved` is what reads see; `staged` holds inserts
/// awaiting the next save, keyed by external id.
#[derive(Debug, Default)]
struct Foreground {
    saved: HashMap<String, PhotoRecord>,
    staged: HashMap<String, PhotoRecord>,
    delete_all: bool,
    next_local_id: i64,
}

impl Foreground {
    fn is_dirty(&self) -> bool {
        self.delete_all || !self.staged.is_empty()
    }

    /// Fold staged changes into the saved view and hand them off.
    fn commit(&mut self) -> Option<ChangeSet> {
        if !self.is_dirty() {
            return None;
        }
        let delete_all = std::mem::take(&mut self.delete_all);
        if delete_all {
            self.saved.clear();
        }
        let mut inserts: Vec<PhotoRecord> = self.staged.drain().map(|(_, r)| r).collect();
        inserts.sort_by_key(|r| r.local_id);
        for record in &inserts {
            self.saved.insert(record.external_id.clone(), record.clone());
        }
        Some(ChangeSet {
            delete_all,
            inserts,
        })
    }
}

enum BackgroundJob {
    Save {
        changes: ChangeSet,
        done: oneshot::Sender<Result<(), StateError>>,
    },
    Flush(oneshot::Sender<()>),
}

/// SQLite-backed photo repository.
pub struct SqlitePhotoRepository {
    foreground: Mutex<Foreground>,
    background: mpsc::UnboundedSender<BackgroundJob>,
    path: PathBuf,
}

impl std::fmt::Debug for SqlitePhotoRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlitePhotoRepository")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

impl SqlitePhotoRepository {
    /// Open or create a database at the given path and load its records.
    ///
    /// Must be called within a tokio runtime; the background writer is
    /// spawned onto it.
    pub async fn open(path: &Path) -> Result<Self, StateError> {
        let path = path.to_path_buf();
        let path_clone = path.clone();

        let (conn, records) = tokio::task::spawn_blocking(move || {
            let conn = Connection::open(&path_clone).map_err(|e| StateError::Open {
                path: path_clone.clone(),
                source: e,
            })?;
            conn.pragma_update(None, "journal_mode", "WAL")
                .map_err(StateError::Migration)?;
            conn.pragma_update(None, "synchronous", "NORMAL")
                .map_err(StateError::Migration)?;
            schema::migrate(&conn)?;
            let records = load_records(&conn)?;
            Ok::<_, StateError>((conn, records))
        })
        .await??;

        tracing::debug!(count = records.len(), "Loaded photo records from {}", path.display());
        Ok(Self::from_parts(conn, records, path))
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self, StateError> {
        let conn = Connection::open_in_memory().map_err(|e| StateError::Open {
            path: PathBuf::from(":memory:"),
            source: e,
        })?;
        schema::migrate(&conn)?;
        Ok(Self::from_parts(conn, Vec::new(), PathBuf::from(":memory:")))
    }

    fn from_parts(conn: Connection, records: Vec<PhotoRecord>, path: PathBuf) -> Self {
        let next_local_id = records.iter().map(|r| r.local_id).max().unwrap_or(0) + 1;
        let saved = records
            .into_iter()
            .map(|r| (r.external_id.clone(), r))
            .collect();

        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(run_background_writer(Arc::new(Mutex::new(conn)), rx));

        Self {
            foreground: Mutex::new(Foreground {
                saved,
                next_local_id,
                ..Foreground::default()
            }),
            background: tx,
            path,
        }
    }

    fn lock_foreground(&self) -> Result<MutexGuard<'_, Foreground>, StateError> {
        self.foreground
            .lock()
            .map_err(|e| StateError::Query(e.to_string()))
    }

    /// Dispatch a committed change set to the background writer.
    fn dispatch(&self, changes: ChangeSet) -> Result<SaveReceipt, StateError> {
        let (done, rx) = oneshot::channel();
        self.background
            .send(BackgroundJob::Save { changes, done })
            .map_err(|_| StateError::Persistence("background writer stopped".to_string()))?;
        Ok(SaveReceipt { rx: Some(rx) })
    }
}

#[async_trait]
impl PhotoRepository for SqlitePhotoRepository {
    async fn find_or_create(&self, raw: &RawPhoto) -> Result<PhotoRecord, StateError> {
        let mut fg = self.lock_foreground()?;

        if let Some(existing) = fg.staged.get(&raw.id) {
            return Ok(existing.clone());
        }
        if !fg.delete_all {
            if let Some(existing) = fg.saved.get(&raw.id) {
                return Ok(existing.clone());
            }
        }

        let local_id = fg.next_local_id;
        fg.next_local_id += 1;
        let record = PhotoRecord::from_raw(raw, local_id, Utc::now());
        fg.staged.insert(raw.id.clone(), record.clone());
        tracing::debug!(photo_id = %raw.id, local_id, "Staged new photo record");
        Ok(record)
    }

    async fn query_all(
        &self,
        filter: Option<&PhotoFilter>,
        sort: &[SortKey],
    ) -> Result<Vec<PhotoRecord>, StateError> {
        let fg = self.lock_foreground()?;
        let mut records: Vec<PhotoRecord> = fg
            .saved
            .values()
            .filter(|r| filter.map_or(true, |f| f.matches(r)))
            .cloned()
            .collect();
        drop(fg);
        sort_records(&mut records, sort);
        Ok(records)
    }

    async fn persist_pending(&self) -> Result<SaveReceipt, StateError> {
        // Foreground commit first; the background dispatch below must never
        // see a change set the foreground has not committed.
        let changes = self.lock_foreground()?.commit();
        match changes {
            None => Ok(SaveReceipt::clean()),
            Some(changes) => self.dispatch(changes),
        }
    }

    async fn reset_all(&self) -> Result<SaveReceipt, StateError> {
        {
            let mut fg = self.lock_foreground()?;
            fg.staged.clear();
            fg.delete_all = true;
        }
        tracing::info!("Removing all photo records");
        self.persist_pending().await
    }

    async fn count(&self) -> Result<u64, StateError> {
        Ok(self.lock_foreground()?.saved.len() as u64)
    }

    async fn flush(&self) -> Result<(), StateError> {
        let (tx, rx) = oneshot::channel();
        self.background
            .send(BackgroundJob::Flush(tx))
            .map_err(|_| StateError::Persistence("background writer stopped".to_string()))?;
        rx.await
            .map_err(|_| StateError::Persistence("background writer stopped".to_string()))
    }
}

/// Apply saves one at a time, in dispatch order.
async fn run_background_writer(
    conn: Arc<Mutex<Connection>>,
    mut jobs: mpsc::UnboundedReceiver<BackgroundJob>,
) {
    while let Some(job) = jobs.recv().await {
        match job {
            BackgroundJob::Save { changes, done } => {
                let conn = Arc::clone(&conn);
                let result = tokio::task::spawn_blocking(move || apply_changes(&conn, &changes))
                    .await
                    .map_err(StateError::from)
                    .and_then(|r| r);
                if let Err(e) = &result {
                    // In-memory state stays as committed; disk may lag until the next save.
                    tracing::error!("Background save failed: {}", e);
                }
                let _ = done.send(result);
            }
            BackgroundJob::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

fn apply_changes(conn: &Mutex<Connection>, changes: &ChangeSet) -> Result<(), StateError> {
    let mut conn = conn
        .lock()
        .map_err(|e| StateError::Persistence(e.to_string()))?;
    let persistence = |e: rusqlite::Error| StateError::Persistence(e.to_string());

    let tx = conn.transaction().map_err(persistence)?;
    if changes.delete_all {
        tx.execute("DELETE FROM photos", []).map_err(persistence)?;
    }
    {
        let mut stmt = tx
            .prepare_cached(
                r#"
                INSERT INTO photos (local_id, external_id, title, server_id, farm_id, secret, source_url, created_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
                ON CONFLICT(external_id) DO NOTHING
                "#,
            )
            .map_err(persistence)?;
        for record in &changes.inserts {
            stmt.execute(rusqlite::params![
                record.local_id,
                record.external_id,
                record.title,
                record.server_id,
                record.farm_id,
                record.secret,
                record.source_url,
                record.created_at.timestamp_millis(),
            ])
            .map_err(persistence)?;
        }
    }
    tx.commit().map_err(persistence)?;

    tracing::debug!(
        inserted = changes.inserts.len(),
        delete_all = changes.delete_all,
        "Background save complete"
    );
    Ok(())
}

fn load_records(conn: &Connection) -> Result<Vec<PhotoRecord>, StateError> {
    let mut stmt = conn
        .prepare(
            "SELECT local_id, external_id, title, server_id, farm_id, secret, source_url, created_at FROM photos",
        )
        .map_err(StateError::query)?;

    let records = stmt
        .query_map([], |row| {
            let created_at_ms: i64 = row.get(7)?;
            Ok(PhotoRecord {
                local_id: row.get(0)?,
                external_id: row.get(1)?,
                title: row.get(2)?,
                server_id: row.get(3)?,
                farm_id: row.get(4)?,
                secret: row.get(5)?,
                source_url: row.get(6)?,
                created_at: Utc
                    .timestamp_millis_opt(created_at_ms)
                    .single()
                    .unwrap_or(DateTime::UNIX_EPOCH),
            })
        })
        .map_err(StateError::query)?
        .collect::<Result<Vec<_>, _>>()
        .map_err(StateError::query)?;

    Ok(records)
}
