use crate::config::LocationConfig;
use crate::error::{Error, Result};
use crate::models::Coordinates;
use async_trait::async_trait;

#[async_trait]
pub trait LocationProvider: Send + Sync {
    /// Single-shot fix at the best available accuracy. Failures, including
    /// "no fix yet", are `Error::LocationUnavailable`.
    async fn current_location(&self) -> Result<Coordinates>;
}

/// Headless provider reporting the fix configured in settings.
#[derive(Debug, Clone, Default)]
pub struct FixedLocationProvider {
    fix: Option<Coordinates>,
}

impl FixedLocationProvider {
    pub fn new(fix: Option<Coordinates>) -> Self {
        Self { fix }
    }

    pub fn from_config(config: &LocationConfig) -> Self {
        Self::new(config.fixed)
    }
}

#[async_trait]
impl LocationProvider for FixedLocationProvider {
    async fn current_location(&self) -> Result<Coordinates> {
        self.fix.ok_or_else(|| {
            log::warn!("Location provider returned no fix");
            Error::LocationUnavailable("Unable to get current location.".into())
        })
    }
}
