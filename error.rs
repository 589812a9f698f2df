use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database Pool Error: {0}")]
    DbPool(#[from] r2d2::Error),

    #[error("Database Error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Task Error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Place {0} not found")]
    NotFound(i64),

    #[error("Validation Error: {0}")]
    Validation(String),

    #[error("Location Unavailable: {0}")]
    LocationUnavailable(String),

    #[error("Geocode Error: {0}")]
    Geocode(#[from] GeocodeError),

    #[error("A commit is already in progress for this session")]
    SessionBusy,

    #[error("The edit session is no longer active")]
    SessionClosed,

    #[error("Path Error: {0}")]
    Path(String),

    #[error("Initialization Failed: {0}")]
    Init(String),
}

impl Error {
    /// True for failures coming from the record store; the draft is kept so
    /// the commit can be retried.
    pub fn is_store_error(&self) -> bool {
        matches!(
            self,
            Error::DbPool(_) | Error::Database(_) | Error::Join(_) | Error::NotFound(_)
        )
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum GeocodeError {
    #[error("geocoder service failed: {0}")]
    Service(String),

    #[error("no address found for coordinates")]
    NoAddress,
}
