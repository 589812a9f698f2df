//! The edit-session state machine, free of I/O.
//!
//! Every input (field edits, location fixes, map picks, geocoder answers,
//! store emissions, commit and cancel) is a method on [`DraftState`]. Inputs
//! that need the address of new coordinates hand back an [`Effect`] for the
//! caller to run; their answers come back through
//! [`DraftState::apply_geocode`] tagged with the coordinates they were issued
//! for.

use crate::error::{Error, GeocodeError, Result};
use crate::models::{
    Coordinates, DraftField, LocationFetchStatus, PickedLocation, Place, SessionMode,
};
use serde::Serialize;

/// Work the state machine asks its owner to perform.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Effect {
    ResolveAddress(Coordinates),
}

/// Whether the user confirmed a map pick during this session. Once set, store
/// emissions stop overwriting the location.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PickState {
    #[default]
    NoPick,
    ExplicitPick,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    #[default]
    Editing,
    Committing,
    Committed,
    Cancelled,
}

impl Phase {
    pub fn is_active(&self) -> bool {
        matches!(self, Phase::Editing | Phase::Committing)
    }
}

/// Working copy of a place. Coordinates and their address status only change
/// together, through [`DraftState`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaceDraft {
    pub title: String,
    pub note: Option<String>,
    pub image_path: Option<String>,
    /// Date of the stored record being edited, for display.
    pub date: Option<String>,
    location: Option<Coordinates>,
    status: LocationFetchStatus,
}

impl PlaceDraft {
    pub fn location(&self) -> Option<Coordinates> {
        self.location
    }

    pub fn status(&self) -> &LocationFetchStatus {
        &self.status
    }

    pub fn address(&self) -> Option<&str> {
        self.status.address()
    }

    pub fn can_commit(&self) -> bool {
        !self.title.trim().is_empty()
            && self
                .image_path
                .as_deref()
                .is_some_and(|path| !path.trim().is_empty())
    }

    fn set_location(&mut self, coordinates: Coordinates) -> Effect {
        self.location = Some(coordinates);
        self.status = LocationFetchStatus::Fetching;
        Effect::ResolveAddress(coordinates)
    }
}

/// What the UI sees of a session at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DraftSnapshot {
    pub mode: SessionMode,
    pub phase: Phase,
    pub title: String,
    pub note: Option<String>,
    pub image_path: Option<String>,
    pub date: Option<String>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub address: Option<String>,
    pub status: LocationFetchStatus,
    pub pick: PickState,
    /// Edit mode: the stored record has been read at least once.
    pub loaded: bool,
    pub can_commit: bool,
}

#[derive(Debug, Clone)]
pub struct DraftState {
    mode: SessionMode,
    draft: PlaceDraft,
    pick: PickState,
    phase: Phase,
    loaded: bool,
    filled: bool,
    location_epoch: u64,
}

impl DraftState {
    pub fn new(mode: SessionMode) -> Self {
        Self {
            mode,
            draft: PlaceDraft::default(),
            pick: PickState::NoPick,
            phase: Phase::Editing,
            loaded: matches!(mode, SessionMode::Add),
            filled: false,
            location_epoch: 0,
        }
    }

    pub fn mode(&self) -> SessionMode {
        self.mode
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn draft(&self) -> &PlaceDraft {
        &self.draft
    }

    fn ensure_active(&self) -> Result<()> {
        if self.phase.is_active() {
            Ok(())
        } else {
            Err(Error::SessionClosed)
        }
    }

    pub fn update_field(&mut self, field: DraftField) -> Result<()> {
        self.ensure_active()?;
        match field {
            DraftField::Title(title) => self.draft.title = title,
            DraftField::Note(note) => self.draft.note = Some(note),
            DraftField::ImagePath(path) => self.draft.image_path = path,
        }
        Ok(())
    }

    /// Starts a current-location request and returns its token. Any later
    /// pick or request makes the token stale.
    pub fn begin_location_request(&mut self) -> Result<u64> {
        self.ensure_active()?;
        self.location_epoch += 1;
        Ok(self.location_epoch)
    }

    pub fn apply_current_location(&mut self, token: u64, coordinates: Coordinates) -> Option<Effect> {
        if !self.phase.is_active() {
            return None;
        }
        if token != self.location_epoch {
            log::debug!("Discarding superseded location fix {coordinates}");
            return None;
        }
        Some(self.draft.set_location(coordinates))
    }

    pub fn apply_pick(&mut self, picked: PickedLocation) -> Option<Effect> {
        if !self.phase.is_active() {
            return None;
        }
        self.location_epoch += 1;
        self.pick = PickState::ExplicitPick;
        Some(self.draft.set_location(picked.coordinates))
    }

    /// Applies a geocoder answer if the draft still sits on the coordinates it
    /// was issued for. Returns whether it was applied.
    pub fn apply_geocode(
        &mut self,
        issued_for: Coordinates,
        result: std::result::Result<String, GeocodeError>,
    ) -> bool {
        if !self.phase.is_active()
            || self.draft.location != Some(issued_for)
            || self.draft.status != LocationFetchStatus::Fetching
        {
            log::debug!("Discarding stale address result for {issued_for}");
            return false;
        }
        self.draft.status = match result {
            Ok(address) => LocationFetchStatus::Resolved(address),
            Err(err) => {
                log::warn!("Address lookup failed for {issued_for}: {err}");
                LocationFetchStatus::Unresolved
            }
        };
        true
    }

    /// Reconciles an emission of the stored record (edit mode). The first
    /// emission fills the draft; later ones never touch the text fields and
    /// only move the location while this session has not set one itself.
    pub fn apply_stored(&mut self, stored: Option<Place>) -> Option<Effect> {
        if !self.phase.is_active() || self.mode == SessionMode::Add {
            return None;
        }
        self.loaded = true;
        let Some(place) = stored else {
            log::warn!("Edited place {:?} is not in the store", self.mode);
            return None;
        };
        let first = !self.filled;
        self.filled = true;

        if first {
            self.draft.title = place.title;
            self.draft.note = place.note;
            self.draft.image_path = Some(place.image_path);
            self.draft.date = Some(place.date);
        }
        if self.pick == PickState::ExplicitPick {
            // The pending pick owns the location.
            return None;
        }
        if !first && self.location_epoch != 0 {
            // A location request since loading owns the location.
            return None;
        }

        let address = place
            .address
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty());
        match (place.location, address) {
            (None, _) => {
                self.draft.location = None;
                self.draft.status = LocationFetchStatus::Empty;
                None
            }
            (Some(coordinates), Some(address)) => {
                self.draft.location = Some(coordinates);
                self.draft.status = LocationFetchStatus::Resolved(address);
                None
            }
            (Some(coordinates), None) => {
                let already_handled = self.draft.location == Some(coordinates)
                    && matches!(
                        self.draft.status,
                        LocationFetchStatus::Fetching | LocationFetchStatus::Resolved(_)
                    );
                if already_handled {
                    None
                } else {
                    Some(self.draft.set_location(coordinates))
                }
            }
        }
    }

    /// Validates the draft and moves into `Committing`, returning the place
    /// to write.
    pub fn begin_commit(&mut self, date: String) -> Result<Place> {
        match self.phase {
            Phase::Editing => {}
            Phase::Committing => return Err(Error::SessionBusy),
            Phase::Committed | Phase::Cancelled => return Err(Error::SessionClosed),
        }
        let title = self.draft.title.trim();
        if title.is_empty() {
            return Err(Error::Validation("title is required".into()));
        }
        let image_path = self
            .draft
            .image_path
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::Validation("image is required".into()))?;

        let place = Place {
            id: match self.mode {
                SessionMode::Add => None,
                SessionMode::Edit(id) => Some(id),
            },
            title: title.to_string(),
            image_path: image_path.to_string(),
            note: self
                .draft
                .note
                .as_deref()
                .map(str::trim)
                .filter(|n| !n.is_empty())
                .map(str::to_string),
            date,
            location: self.draft.location,
            address: self.draft.address().map(|a| a.trim().to_string()),
        };
        self.phase = Phase::Committing;
        Ok(place)
    }

    pub fn finish_commit(&mut self, succeeded: bool) {
        if self.phase != Phase::Committing {
            return;
        }
        self.phase = if succeeded {
            Phase::Committed
        } else {
            Phase::Editing
        };
    }

    /// Returns whether the session was still active.
    pub fn cancel(&mut self) -> bool {
        let was_active = self.phase.is_active();
        if was_active {
            self.phase = Phase::Cancelled;
        }
        was_active
    }

    pub fn snapshot(&self) -> DraftSnapshot {
        let draft = &self.draft;
        DraftSnapshot {
            mode: self.mode,
            phase: self.phase,
            title: draft.title.clone(),
            note: draft.note.clone(),
            image_path: draft.image_path.clone(),
            date: draft.date.clone(),
            latitude: draft.location.map(|c| c.latitude()),
            longitude: draft.location.map(|c| c.longitude()),
            address: draft.address().map(str::to_string),
            status: draft.status.clone(),
            pick: self.pick,
            loaded: self.loaded,
            can_commit: self.phase == Phase::Editing && draft.can_commit(),
        }
    }
}
