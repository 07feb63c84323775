use crate::{albums, items};
use async_trait::async_trait;
use cratedig_core::{
    error::Result, types::*, CatalogStore, CatalogTransaction, DigError,
};
use sqlx::{Sqlite, SqlitePool, Transaction};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::debug;

/// Row counts, used for reporting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CatalogStats {
    pub albums: i64,
    pub items: i64,
}

/// Catalog store using `SQLite`
///
/// Writes are serialized: [`CatalogStore::transaction`] waits until the
/// previous transaction has committed or rolled back.
#[derive(Clone)]
pub struct SqliteCatalog {
    pool: SqlitePool,
    write_lock: Arc<Mutex<()>>,
}

impl SqliteCatalog {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            write_lock: Arc::new(Mutex::new(())),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub async fn stats(&self) -> Result<CatalogStats> {
        Ok(CatalogStats {
            albums: albums::count(&self.pool).await?,
            items: items::count(&self.pool).await?,
        })
    }
}

#[async_trait]
impl CatalogStore for SqliteCatalog {
    async fn find_duplicates(&self, identity: &Identity) -> Result<Vec<CatalogEntry>> {
        let key = identity.key();
        if identity.is_album() {
            albums::find_by_identity(&self.pool, &key).await
        } else {
            items::find_singletons(&self.pool, &key).await
        }
    }

    async fn album_items(&self, album_id: i64) -> Result<Vec<TrackRecord>> {
        items::get_by_album(&self.pool, album_id).await
    }

    async fn item(&self, item_id: i64) -> Result<Option<TrackRecord>> {
        items::get_by_id(&self.pool, item_id).await
    }

    async fn paths_under(&self, dir: &Path) -> Result<Vec<PathBuf>> {
        items::paths_under(&self.pool, &dir.to_string_lossy()).await
    }

    async fn transaction(&self) -> Result<Box<dyn CatalogTransaction>> {
        let guard = Arc::clone(&self.write_lock).lock_owned().await;
        let tx = self.pool.begin().await?;
        debug!("Catalog transaction started");
        Ok(Box::new(SqliteCatalogTransaction { tx, _guard: guard }))
    }
}

/// Write transaction holding the catalog's writer lock
///
/// Field order matters: the transaction is dropped (rolled back) before the
/// lock is released.
pub struct SqliteCatalogTransaction {
    tx: Transaction<'static, Sqlite>,
    _guard: OwnedMutexGuard<()>,
}

#[async_trait]
impl CatalogTransaction for SqliteCatalogTransaction {
    async fn add(&mut self, records: &[TrackRecord]) -> Result<Vec<i64>> {
        let mut ids = Vec::with_capacity(records.len());
        for record in records {
            ids.push(items::insert(&mut self.tx, record, None).await?);
        }
        Ok(ids)
    }

    async fn add_album(&mut self, album: &NewAlbum, records: &[TrackRecord]) -> Result<i64> {
        let album_ref = albums::insert(&mut self.tx, album).await?;
        for record in records {
            items::insert(&mut self.tx, record, Some(album_ref)).await?;
        }
        Ok(album_ref)
    }

    async fn remove(&mut self, entry: EntryId) -> Result<Vec<PathBuf>> {
        match entry {
            EntryId::Album(id) => albums::delete(&mut self.tx, id).await,
            EntryId::Item(id) => items::delete(&mut self.tx, id)
                .await?
                .map(|path| vec![path])
                .ok_or_else(|| DigError::not_found("Item", id.to_string())),
        }
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.commit().await?;
        debug!("Catalog transaction committed");
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        let this = *self;
        this.tx.rollback().await?;
        debug!("Catalog transaction rolled back");
        Ok(())
    }
}
