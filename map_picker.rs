//! Map selection: the user marks one point and either confirms it, handing
//! exactly one [`PickedLocation`] back to whoever opened the selection, or
//! cancels and hands back nothing.

use crate::config::MapConfig;
use crate::error::{Error, Result};
use crate::models::{Coordinates, PickedLocation};
use tokio::sync::oneshot;

/// Where the map opens.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MapViewport {
    pub center: Coordinates,
    pub zoom: f64,
}

#[derive(Debug)]
pub struct MapSelection {
    marked: Option<Coordinates>,
    viewport: MapViewport,
    reply: Option<oneshot::Sender<PickedLocation>>,
}

impl MapSelection {
    /// Opens a selection and returns the receiving end of its single event.
    pub fn open(
        initial: Option<Coordinates>,
        config: &MapConfig,
    ) -> (Self, oneshot::Receiver<PickedLocation>) {
        let (tx, rx) = oneshot::channel();
        let viewport = match initial {
            Some(center) => MapViewport {
                center,
                zoom: config.focused_zoom,
            },
            None => MapViewport {
                center: config.default_center,
                zoom: config.default_zoom,
            },
        };
        log::debug!(
            "Map selection opened at {} (zoom {})",
            viewport.center,
            viewport.zoom
        );
        let selection = Self {
            marked: initial,
            viewport,
            reply: Some(tx),
        };
        (selection, rx)
    }

    pub fn viewport(&self) -> MapViewport {
        self.viewport
    }

    pub fn marked(&self) -> Option<Coordinates> {
        self.marked
    }

    /// Marks a point, replacing any previous mark.
    pub fn tap(&mut self, latitude: f64, longitude: f64) -> Result<Coordinates> {
        let point = Coordinates::new(latitude, longitude)?;
        log::debug!("Map tapped at: {point}");
        self.marked = Some(point);
        Ok(point)
    }

    pub fn can_confirm(&self) -> bool {
        self.marked.is_some() && self.reply.is_some()
    }

    /// Sends the marked point. Only the first successful confirm delivers.
    pub fn confirm(&mut self) -> Result<PickedLocation> {
        let coordinates = self
            .marked
            .ok_or_else(|| Error::Validation("no location marked on the map".into()))?;
        let reply = self.reply.take().ok_or(Error::SessionClosed)?;
        let picked = PickedLocation { coordinates };
        log::debug!("Confirming location: {coordinates}");
        if reply.send(picked).is_err() {
            log::warn!("Map selection confirmed after its opener went away");
        }
        Ok(picked)
    }

    /// Closes the selection without delivering anything.
    pub fn cancel(self) {
        log::debug!("Map selection cancelled");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn viewport_follows_initial_mark() {
        let config = MapConfig::default();
        let (fresh, _rx) = MapSelection::open(None, &config);
        assert_eq!(fresh.viewport().zoom, 6.0);
        assert_eq!(fresh.viewport().center, config.default_center);
        assert!(!fresh.can_confirm());

        let home = Coordinates::new(40.4168, -3.7038).unwrap();
        let (seeded, _rx) = MapSelection::open(Some(home), &config);
        assert_eq!(seeded.viewport(), MapViewport { center: home, zoom: 15.0 });
        assert_eq!(seeded.marked(), Some(home));
    }

    #[test]
    fn taps_replace_mark_and_confirm_delivers_once() {
        let (mut selection, mut rx) = MapSelection::open(None, &MapConfig::default());
        assert!(matches!(selection.confirm(), Err(Error::Validation(_))));
        assert!(selection.tap(91.0, 0.0).is_err());

        selection.tap(10.0, 10.0).unwrap();
        let last = selection.tap(20.0, 30.0).unwrap();
        assert_eq!(selection.marked(), Some(last));

        let picked = selection.confirm().unwrap();
        assert_eq!(picked.coordinates, last);
        assert_eq!(rx.try_recv().unwrap(), picked);
        assert!(matches!(selection.confirm(), Err(Error::SessionClosed)));
    }

    #[test]
    fn cancel_delivers_nothing() {
        let (mut selection, mut rx) = MapSelection::open(None, &MapConfig::default());
        selection.tap(1.0, 2.0).unwrap();
        selection.cancel();
        assert!(matches!(
            rx.try_recv(),
            Err(oneshot::error::TryRecvError::Closed)
        ));
    }
}
