//! Record store for places.
//!
//! Writes go through the blocking pool so callers on an interactive thread
//! never touch SQLite directly. Every successful write is announced on a
//! broadcast bus, which is what drives the reactive queries
//! ([`watch_place`], [`watch_all`]).

use crate::db::{self, DbPool};
use crate::error::Result;
use crate::models::Place;
use async_trait::async_trait;
use rusqlite::Connection;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::sync::mpsc;

const CHANGE_BUS_CAPACITY: usize = 64;
const STREAM_CAPACITY: usize = 8;

/// Emissions of a reactive query: the current value first, then a fresh
/// value after each relevant store change.
pub type RecordStream<T> = mpsc::Receiver<T>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreChange {
    Inserted(i64),
    Updated(i64),
    Deleted(i64),
}

impl StoreChange {
    pub fn id(&self) -> i64 {
        match *self {
            StoreChange::Inserted(id) | StoreChange::Updated(id) | StoreChange::Deleted(id) => id,
        }
    }
}

#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Returns the stored id. A place carrying an id replaces that record.
    async fn insert(&self, place: Place) -> Result<i64>;

    /// Fails with `Error::NotFound` when no record has the place's id.
    async fn update(&self, place: Place) -> Result<()>;

    /// Fails with `Error::NotFound` when no record has the place's id.
    async fn delete(&self, place: Place) -> Result<()>;

    async fn get(&self, id: i64) -> Result<Option<Place>>;

    /// Newest first.
    async fn list(&self) -> Result<Vec<Place>>;

    fn changes(&self) -> broadcast::Receiver<StoreChange>;
}

#[derive(Clone)]
pub struct SqlitePlaceStore {
    pool: DbPool,
    changes: broadcast::Sender<StoreChange>,
}

impl SqlitePlaceStore {
    pub fn new(pool: DbPool) -> Self {
        let (changes, _) = broadcast::channel(CHANGE_BUS_CAPACITY);
        Self { pool, changes }
    }

    async fn with_conn<T, F>(&self, op: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let pool = self.pool.clone();
        tokio::task::spawn_blocking(move || {
            let conn = pool.get()?;
            op(&conn)
        })
        .await?
    }

    fn announce(&self, change: StoreChange) {
        // No subscribers is fine.
        let _ = self.changes.send(change);
    }
}

#[async_trait]
impl RecordStore for SqlitePlaceStore {
    async fn insert(&self, place: Place) -> Result<i64> {
        log::debug!("Store insert called for: {}", place.title);
        let id = self
            .with_conn(move |conn| db::insert_place(conn, &place))
            .await?;
        log::debug!("Store insert finished, id {id}");
        self.announce(StoreChange::Inserted(id));
        Ok(id)
    }

    async fn update(&self, place: Place) -> Result<()> {
        log::debug!("Store update called for: {}, id {:?}", place.title, place.id);
        let id = place.id;
        self.with_conn(move |conn| db::update_place(conn, &place))
            .await?;
        if let Some(id) = id {
            self.announce(StoreChange::Updated(id));
        }
        Ok(())
    }

    async fn delete(&self, place: Place) -> Result<()> {
        let id = place.id.ok_or_else(|| {
            crate::error::Error::Validation("cannot delete a place without an id".into())
        })?;
        log::debug!("Store delete called for: {}, id {id}", place.title);
        self.with_conn(move |conn| db::delete_place(conn, id)).await?;
        self.announce(StoreChange::Deleted(id));
        Ok(())
    }

    async fn get(&self, id: i64) -> Result<Option<Place>> {
        self.with_conn(move |conn| db::get_place(conn, id)).await
    }

    async fn list(&self) -> Result<Vec<Place>> {
        self.with_conn(db::list_places).await
    }

    fn changes(&self) -> broadcast::Receiver<StoreChange> {
        self.changes.subscribe()
    }
}

/// Reactive query for one record; yields `None` while it does not exist.
pub fn watch_place(store: Arc<dyn RecordStore>, id: i64) -> RecordStream<Option<Place>> {
    spawn_query(
        store,
        move |change| change.id() == id,
        move |store| async move { store.get(id).await },
    )
}

/// Reactive query for every record, newest first.
pub fn watch_all(store: Arc<dyn RecordStore>) -> RecordStream<Vec<Place>> {
    spawn_query(store, |_| true, |store| async move { store.list().await })
}

fn spawn_query<T, R, L, Fut>(store: Arc<dyn RecordStore>, relevant: R, load: L) -> RecordStream<T>
where
    T: Send + 'static,
    R: Fn(StoreChange) -> bool + Send + 'static,
    L: Fn(Arc<dyn RecordStore>) -> Fut + Send + 'static,
    Fut: Future<Output = Result<T>> + Send,
{
    let (tx, rx) = mpsc::channel(STREAM_CAPACITY);
    // Subscribe before the first load so no change slips in between.
    let mut changes = store.changes();
    tokio::spawn(async move {
        loop {
            match load(store.clone()).await {
                Ok(value) => {
                    if tx.send(value).await.is_err() {
                        return;
                    }
                }
                Err(err) => log::warn!("Reactive query load failed: {err}"),
            }

            loop {
                tokio::select! {
                    _ = tx.closed() => return,
                    change = changes.recv() => match change {
                        Ok(change) if relevant(change) => break,
                        Ok(_) => continue,
                        Err(RecvError::Lagged(skipped)) => {
                            log::debug!("Reactive query lagged by {skipped} changes; reloading");
                            break;
                        }
                        Err(RecvError::Closed) => return,
                    },
                }
            }
        }
    });
    rx
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::models::Coordinates;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use tokio::time::timeout;

    fn store() -> SqlitePlaceStore {
        SqlitePlaceStore::new(db::init_memory_database().unwrap())
    }

    fn place(title: &str) -> Place {
        Place {
            id: None,
            title: title.into(),
            image_path: format!("/images/{title}.jpg"),
            note: None,
            date: "2024-06-01".into(),
            location: Some(Coordinates::new(41.9028, 12.4964).unwrap()),
            address: None,
        }
    }

    async fn next<T>(stream: &mut RecordStream<T>) -> T {
        timeout(Duration::from_secs(5), stream.recv())
            .await
            .expect("stream emission timed out")
            .expect("stream closed")
    }

    #[tokio::test]
    async fn crud_round_trip_announces_changes() {
        let store = store();
        let mut changes = store.changes();

        let id = store.insert(place("fountain")).await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), StoreChange::Inserted(id));

        let mut stored = store.get(id).await.unwrap().unwrap();
        stored.address = Some("Rome, Italy".into());
        store.update(stored.clone()).await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), StoreChange::Updated(id));
        assert_eq!(store.get(id).await.unwrap(), Some(stored.clone()));

        store.delete(stored.clone()).await.unwrap();
        assert_eq!(changes.recv().await.unwrap(), StoreChange::Deleted(id));
        assert!(matches!(store.delete(stored).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn watch_place_emits_current_then_updates() {
        let store = store();
        let id = store.insert(place("steps")).await.unwrap();
        let shared: Arc<dyn RecordStore> = Arc::new(store.clone());

        let mut stream = watch_place(shared, id);
        assert_eq!(next(&mut stream).await.map(|p| p.title), Some("steps".into()));

        // Unrelated records do not trigger an emission for this id.
        store.insert(place("other")).await.unwrap();
        let mut renamed = store.get(id).await.unwrap().unwrap();
        renamed.title = "Spanish Steps".into();
        store.update(renamed).await.unwrap();
        assert_eq!(
            next(&mut stream).await.map(|p| p.title),
            Some("Spanish Steps".into())
        );

        store.delete(store.get(id).await.unwrap().unwrap()).await.unwrap();
        assert_eq!(next(&mut stream).await, None);
    }

    #[tokio::test]
    async fn watch_all_is_newest_first() {
        let store = store();
        let shared: Arc<dyn RecordStore> = Arc::new(store.clone());
        let mut stream = watch_all(shared);
        assert!(next(&mut stream).await.is_empty());

        store.insert(place("first")).await.unwrap();
        assert_eq!(next(&mut stream).await.len(), 1);
        store.insert(place("second")).await.unwrap();
        let titles: Vec<String> = next(&mut stream).await.into_iter().map(|p| p.title).collect();
        assert_eq!(titles, vec!["second".to_string(), "first".to_string()]);
    }
}
