//! One add/edit session for a place.
//!
//! A [`DraftSession`] owns the [`DraftState`] of a single session and runs
//! the asynchronous work it asks for: reverse geocoding, current-location
//! fixes, the edited record's store subscription and the map selection
//! hand-off. Background work holds only a weak reference to the session and
//! is aborted when the session commits or is cancelled, so completions that
//! arrive afterwards never reach a draft.

use crate::config::{MapConfig, Settings};
use crate::draft::{DraftSnapshot, DraftState, Effect};
use crate::error::{Error, GeocodeError, Result};
use crate::geocode::{self, ReverseGeocoder};
use crate::location::LocationProvider;
use crate::map_picker::MapSelection;
use crate::models::{Coordinates, DraftField, PickedLocation, Place, SessionMode, DATE_FORMAT};
use crate::store::{self, RecordStore};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Collaborators injected into every session.
#[derive(Clone)]
pub struct PlaceServices {
    pub store: Arc<dyn RecordStore>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub location: Arc<dyn LocationProvider>,
    pub map: MapConfig,
    pub address_delimiter: String,
}

impl PlaceServices {
    pub fn new(
        store: Arc<dyn RecordStore>,
        geocoder: Arc<dyn ReverseGeocoder>,
        location: Arc<dyn LocationProvider>,
    ) -> Self {
        Self {
            store,
            geocoder,
            location,
            map: MapConfig::default(),
            address_delimiter: ", ".to_string(),
        }
    }

    pub fn with_settings(mut self, settings: &Settings) -> Self {
        self.map = settings.map.clone();
        self.address_delimiter = settings.geocode.delimiter.clone();
        self
    }
}

/// Cheap handle to a session; clones share the same draft.
#[derive(Clone)]
pub struct DraftSession {
    inner: Arc<SessionInner>,
}

struct SessionInner {
    id: Uuid,
    services: PlaceServices,
    state: Mutex<DraftState>,
    snapshots: watch::Sender<DraftSnapshot>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Drop for SessionInner {
    fn drop(&mut self) {
        let tasks = self.tasks.get_mut().unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }
}

impl DraftSession {
    /// Starts an empty session for a new place.
    pub fn start_add(services: PlaceServices) -> Self {
        Self::start(services, SessionMode::Add)
    }

    /// Starts a session editing the stored place `id`. Must be called inside
    /// a tokio runtime; the draft fills in once the store answers.
    pub fn start_edit(services: PlaceServices, id: i64) -> Self {
        let session = Self::start(services, SessionMode::Edit(id));
        let mut emissions = store::watch_place(session.inner.services.store.clone(), id);
        let weak = Arc::downgrade(&session.inner);
        let task = tokio::spawn(async move {
            while let Some(place) = emissions.recv().await {
                let Some(session) = DraftSession::upgrade(&weak) else {
                    break;
                };
                session.on_store_emission(place);
            }
        });
        session.track(task);
        session
    }

    fn start(services: PlaceServices, mode: SessionMode) -> Self {
        let id = Uuid::new_v4();
        let state = DraftState::new(mode);
        let (snapshots, _) = watch::channel(state.snapshot());
        log::info!("Draft session {id} started ({mode:?})");
        Self {
            inner: Arc::new(SessionInner {
                id,
                services,
                state: Mutex::new(state),
                snapshots,
                tasks: Mutex::new(Vec::new()),
            }),
        }
    }

    fn upgrade(weak: &Weak<SessionInner>) -> Option<Self> {
        weak.upgrade().map(|inner| Self { inner })
    }

    pub fn id(&self) -> Uuid {
        self.inner.id
    }

    pub fn mode(&self) -> SessionMode {
        self.lock_state().mode()
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        self.inner.snapshots.borrow().clone()
    }

    /// Snapshots are published after every change, each one consistent.
    pub fn subscribe(&self) -> watch::Receiver<DraftSnapshot> {
        self.inner.snapshots.subscribe()
    }

    fn lock_state(&self) -> MutexGuard<'_, DraftState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Runs `change` under the state lock and publishes the resulting
    /// snapshot before releasing it, so publications keep mutation order.
    fn mutate<R>(&self, change: impl FnOnce(&mut DraftState) -> R) -> R {
        let mut state = self.lock_state();
        let result = change(&mut state);
        let snapshot = state.snapshot();
        self.inner.snapshots.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
        result
    }

    fn track(&self, task: JoinHandle<()>) {
        let active = self.lock_state().phase().is_active();
        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        tasks.retain(|t| !t.is_finished());
        if active {
            tasks.push(task);
        } else {
            task.abort();
        }
    }

    fn abort_tasks(&self) {
        let mut tasks = self
            .inner
            .tasks
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        for task in tasks.drain(..) {
            task.abort();
        }
    }

    fn run(&self, effect: Option<Effect>) {
        match effect {
            Some(Effect::ResolveAddress(coordinates)) => self.resolve_address(coordinates),
            None => {}
        }
    }

    fn resolve_address(&self, coordinates: Coordinates) {
        let geocoder = self.inner.services.geocoder.clone();
        let delimiter = self.inner.services.address_delimiter.clone();
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            let result = geocode::reverse_geocode(geocoder.as_ref(), coordinates, &delimiter).await;
            if let Some(session) = DraftSession::upgrade(&weak) {
                session.on_geocode_result(coordinates, result);
            }
        });
        self.track(task);
    }

    pub fn update_field(&self, field: DraftField) -> Result<()> {
        self.mutate(|state| state.update_field(field))
    }

    /// Asks the location provider for a fix and, on success, moves the
    /// draft there and starts resolving its address. On failure the draft
    /// is left as it was. Returns `None` when a newer pick or request
    /// superseded this one while the fix was pending.
    pub async fn request_current_location(&self) -> Result<Option<Coordinates>> {
        let token = self.mutate(|state| state.begin_location_request())?;
        let coordinates = match self.inner.services.location.current_location().await {
            Ok(coordinates) => coordinates,
            Err(err) => {
                log::warn!("Draft session {}: error getting current location: {err}", self.id());
                return Err(match err {
                    Error::LocationUnavailable(reason) => Error::LocationUnavailable(reason),
                    other => Error::LocationUnavailable(other.to_string()),
                });
            }
        };
        let effect = self.mutate(|state| {
            if state.phase().is_active() {
                Ok(state.apply_current_location(token, coordinates))
            } else {
                Err(Error::SessionClosed)
            }
        })?;
        let applied = effect.is_some();
        self.run(effect);
        Ok(applied.then_some(coordinates))
    }

    /// Opens a map selection seeded with the draft's location. Its confirmed
    /// pick is delivered back to this session.
    pub fn open_map_selection(&self) -> Result<MapSelection> {
        let initial = {
            let state = self.lock_state();
            if !state.phase().is_active() {
                return Err(Error::SessionClosed);
            }
            state.draft().location()
        };
        let (selection, reply) = MapSelection::open(initial, &self.inner.services.map);
        let weak = Arc::downgrade(&self.inner);
        let task = tokio::spawn(async move {
            match reply.await {
                Ok(picked) => {
                    if let Some(session) = DraftSession::upgrade(&weak) {
                        session.on_picked_location(picked);
                    }
                }
                Err(_) => log::debug!("Map selection closed without a pick"),
            }
        });
        self.track(task);
        Ok(selection)
    }

    pub fn on_picked_location(&self, picked: PickedLocation) {
        log::info!(
            "Draft session {}: picked location {}",
            self.id(),
            picked.coordinates
        );
        let effect = self.mutate(|state| state.apply_pick(picked));
        self.run(effect);
    }

    pub fn on_geocode_result(
        &self,
        issued_for: Coordinates,
        result: std::result::Result<String, GeocodeError>,
    ) {
        self.mutate(|state| state.apply_geocode(issued_for, result));
    }

    fn on_store_emission(&self, place: Option<Place>) {
        log::debug!(
            "Draft session {}: store emission {:?}",
            self.id(),
            place.as_ref().map(|p| &p.title)
        );
        let effect = self.mutate(|state| state.apply_stored(place));
        self.run(effect);
    }

    /// Writes the draft: one insert in add mode, one update in edit mode.
    /// Returns the place id. A failed write keeps the draft for a retry.
    ///
    /// The write runs on its own task, so dropping the returned future does
    /// not lose the outcome; the session still ends up committed or back in
    /// editing once the store answers.
    pub async fn commit(&self) -> Result<i64> {
        let date = chrono::Local::now().format(DATE_FORMAT).to_string();
        let place = self.mutate(|state| state.begin_commit(date))?;
        let mode = self.mode();
        log::info!("Draft session {} committing: {}", self.id(), place.title);

        let session = self.clone();
        let write = tokio::spawn(async move {
            let store = session.inner.services.store.clone();
            let result = match mode {
                SessionMode::Add => store.insert(place).await,
                SessionMode::Edit(id) => store.update(place).await.map(|()| id),
            };
            session.mutate(|state| state.finish_commit(result.is_ok()));
            match &result {
                Ok(id) => {
                    log::info!("Draft session {} committed place {id}", session.id());
                    session.abort_tasks();
                }
                Err(err) => log::error!("Draft session {} commit failed: {err}", session.id()),
            }
            result
        });
        write.await?
    }

    /// Discards the draft. Pending work is dropped and late results ignored.
    pub fn cancel(&self) {
        if self.mutate(|state| state.cancel()) {
            log::info!("Draft session {} cancelled", self.id());
        }
        self.abort_tasks();
    }

    /// Waits until no address lookup is pending (or the session ended).
    pub async fn wait_settled(&self) -> Result<DraftSnapshot> {
        self.wait_until(|s| s.status.is_settled() || !s.phase.is_active())
            .await
    }

    /// Waits until the edited record has been read (or the session ended).
    pub async fn wait_loaded(&self) -> Result<DraftSnapshot> {
        self.wait_until(|s| s.loaded || !s.phase.is_active()).await
    }

    /// Waits for the first snapshot, current or future, that satisfies `ready`.
    pub async fn wait_until(&self, ready: impl FnMut(&DraftSnapshot) -> bool) -> Result<DraftSnapshot> {
        let mut snapshots = self.subscribe();
        let snapshot = snapshots
            .wait_for(ready)
            .await
            .map_err(|_| Error::SessionClosed)?
            .clone();
        Ok(snapshot)
    }
}
