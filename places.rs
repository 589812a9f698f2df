use crate::error::{Error, Result};
use crate::models::{Coordinates, Place};
use crate::store::{self, RecordStream, RecordStore};
use serde::Serialize;
use std::sync::Arc;

/// A place as shown on the overview map.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MapMarker {
    pub id: i64,
    pub title: String,
    pub coordinates: Coordinates,
    pub address: Option<String>,
    pub date: String,
}

impl MapMarker {
    /// Address when known, otherwise the coordinates.
    pub fn label(&self) -> String {
        self.address
            .clone()
            .unwrap_or_else(|| self.coordinates.to_string())
    }
}

/// Read side of the app: the grid of places and the overview map.
#[derive(Clone)]
pub struct PlaceCatalog {
    store: Arc<dyn RecordStore>,
}

impl PlaceCatalog {
    pub fn new(store: Arc<dyn RecordStore>) -> Self {
        Self { store }
    }

    /// Newest first, re-emitted on every change.
    pub fn watch_grid(&self) -> RecordStream<Vec<Place>> {
        store::watch_all(self.store.clone())
    }

    pub async fn all(&self) -> Result<Vec<Place>> {
        self.store.list().await
    }

    pub async fn get(&self, id: i64) -> Result<Option<Place>> {
        self.store.get(id).await
    }

    pub async fn markers(&self) -> Result<Vec<MapMarker>> {
        let places = self.store.list().await?;
        Ok(places.into_iter().filter_map(to_marker).collect())
    }

    pub async fn delete(&self, id: i64) -> Result<Place> {
        let place = self.store.get(id).await?.ok_or(Error::NotFound(id))?;
        log::info!("Deleting place {id}: {}", place.title);
        self.store.delete(place.clone()).await?;
        Ok(place)
    }
}

fn to_marker(place: Place) -> Option<MapMarker> {
    Some(MapMarker {
        id: place.id?,
        coordinates: place.location?,
        title: place.title,
        address: place.address,
        date: place.date,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db;
    use crate::store::SqlitePlaceStore;
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    fn catalog() -> (PlaceCatalog, SqlitePlaceStore) {
        let store = SqlitePlaceStore::new(db::init_memory_database().unwrap());
        (PlaceCatalog::new(Arc::new(store.clone())), store)
    }

    fn place(title: &str, location: Option<(f64, f64)>) -> Place {
        Place {
            id: None,
            title: title.into(),
            image_path: format!("/images/{title}.jpg"),
            note: None,
            date: "2024-02-02".into(),
            location: location.map(|(lat, lon)| Coordinates::new(lat, lon).unwrap()),
            address: None,
        }
    }

    #[tokio::test]
    async fn markers_skip_places_without_location() {
        let (catalog, store) = catalog();
        store.insert(place("attic", None)).await.unwrap();
        let pier = store.insert(place("pier", Some((50.1, -5.5)))).await.unwrap();

        let markers = catalog.markers().await.unwrap();
        assert_eq!(markers.len(), 1);
        assert_eq!(markers[0].id, pier);
        assert_eq!(markers[0].label(), "50.1000, -5.5000");
    }

    #[tokio::test]
    async fn delete_removes_and_grid_follows() {
        let (catalog, store) = catalog();
        let id = store.insert(place("attic", None)).await.unwrap();
        let mut grid = catalog.watch_grid();
        let first = tokio::time::timeout(Duration::from_secs(5), grid.recv())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(first.len(), 1);

        assert_eq!(catalog.delete(id).await.unwrap().title, "attic");
        let after = tokio::time::timeout(Duration::from_secs(5), grid.recv())
            .await
            .unwrap()
            .unwrap();
        assert!(after.is_empty());
        assert!(matches!(catalog.delete(id).await, Err(Error::NotFound(_))));
    }
}
