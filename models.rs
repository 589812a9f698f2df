use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;

/// Format of [`Place::date`].
pub const DATE_FORMAT: &str = "%Y-%m-%d";

/// A validated latitude/longitude pair. Holding both values in one type is
/// what keeps a place or draft from ever carrying one without the other.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCoordinates")]
pub struct Coordinates {
    latitude: f64,
    longitude: f64,
}

#[derive(Deserialize)]
struct RawCoordinates {
    latitude: f64,
    longitude: f64,
}

impl TryFrom<RawCoordinates> for Coordinates {
    type Error = Error;

    fn try_from(raw: RawCoordinates) -> Result<Self> {
        Coordinates::new(raw.latitude, raw.longitude)
    }
}

impl Coordinates {
    pub fn new(latitude: f64, longitude: f64) -> Result<Self> {
        if !latitude.is_finite() || !(-90.0..=90.0).contains(&latitude) {
            return Err(Error::Validation(format!(
                "latitude {latitude} is outside -90..90"
            )));
        }
        if !longitude.is_finite() || !(-180.0..=180.0).contains(&longitude) {
            return Err(Error::Validation(format!(
                "longitude {longitude} is outside -180..180"
            )));
        }
        Ok(Self {
            latitude,
            longitude,
        })
    }

    /// For compile-time constants already known to be in range.
    pub(crate) const fn from_trusted(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Builds coordinates from two nullable columns. Exactly one present is
    /// rejected.
    pub fn from_parts(latitude: Option<f64>, longitude: Option<f64>) -> Result<Option<Self>> {
        match (latitude, longitude) {
            (Some(lat), Some(lon)) => Self::new(lat, lon).map(Some),
            (None, None) => Ok(None),
            _ => Err(Error::Validation(
                "latitude and longitude must be set together".into(),
            )),
        }
    }

    pub fn latitude(&self) -> f64 {
        self.latitude
    }

    pub fn longitude(&self) -> f64 {
        self.longitude
    }
}

impl std::fmt::Display for Coordinates {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.4}, {:.4}", self.latitude, self.longitude)
    }
}

/// A persisted happy place. `id` is `None` until the store assigns one.
#[skip_serializing_none]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Place {
    pub id: Option<i64>,
    pub title: String,
    pub image_path: String,
    pub note: Option<String>,
    pub date: String,
    #[serde(flatten)]
    pub location: Option<Coordinates>,
    pub address: Option<String>,
}

impl Place {
    pub fn latitude(&self) -> Option<f64> {
        self.location.map(|c| c.latitude())
    }

    pub fn longitude(&self) -> Option<f64> {
        self.location.map(|c| c.longitude())
    }
}

/// Progress of turning the draft's coordinates into an address.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "state", content = "address", rename_all = "snake_case")]
pub enum LocationFetchStatus {
    #[default]
    Empty,
    Fetching,
    Resolved(String),
    Unresolved,
}

impl LocationFetchStatus {
    /// The address only exists once resolution has finished successfully.
    pub fn address(&self) -> Option<&str> {
        match self {
            LocationFetchStatus::Resolved(address) => Some(address),
            _ => None,
        }
    }

    pub fn is_settled(&self) -> bool {
        !matches!(self, LocationFetchStatus::Fetching)
    }
}

/// One coordinate pair confirmed in a map selection.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickedLocation {
    pub coordinates: Coordinates,
}

/// Field edits the UI may apply to a draft.
#[derive(Debug, Clone, PartialEq)]
pub enum DraftField {
    Title(String),
    Note(String),
    ImagePath(Option<String>),
}

/// Whether a session creates a new place or edits a stored one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionMode {
    Add,
    Edit(i64),
}
