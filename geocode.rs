use crate::config::GeocodeConfig;
use crate::error::{GeocodeError, Result};
use crate::models::Coordinates;
use async_trait::async_trait;
use serde::Deserialize;
use std::path::Path;

const EARTH_RADIUS_KM: f64 = 6371.0;

#[async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Address lines for the coordinates, most specific first.
    async fn address_lines(
        &self,
        coordinates: Coordinates,
    ) -> std::result::Result<Vec<String>, GeocodeError>;
}

/// Resolves coordinates to one display line. An address that is empty once
/// trimmed counts as not found.
pub async fn reverse_geocode(
    geocoder: &dyn ReverseGeocoder,
    coordinates: Coordinates,
    delimiter: &str,
) -> std::result::Result<String, GeocodeError> {
    log::debug!("Reverse geocoding {coordinates}");
    let lines = geocoder.address_lines(coordinates).await?;
    format_address(&lines, delimiter).ok_or(GeocodeError::NoAddress)
}

pub fn format_address(lines: &[String], delimiter: &str) -> Option<String> {
    let joined = lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(delimiter);
    let trimmed = joined.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct GazetteerEntry {
    pub latitude: f64,
    pub longitude: f64,
    pub lines: Vec<String>,
}

/// Offline geocoder answering with the nearest known entry inside a radius.
#[derive(Debug, Clone, Default)]
pub struct GazetteerGeocoder {
    entries: Vec<GazetteerEntry>,
    max_distance_km: f64,
}

impl GazetteerGeocoder {
    pub fn new(entries: Vec<GazetteerEntry>, max_distance_km: f64) -> Self {
        Self {
            entries,
            max_distance_km,
        }
    }

    pub fn load(path: &Path, max_distance_km: f64) -> Result<Self> {
        let data = std::fs::read(path)?;
        let entries: Vec<GazetteerEntry> = serde_json::from_slice(&data)?;
        log::info!("Loaded {} gazetteer entries from {}", entries.len(), path.display());
        Ok(Self::new(entries, max_distance_km))
    }

    pub fn from_config(config: &GeocodeConfig) -> Result<Self> {
        match &config.gazetteer_path {
            Some(path) => Self::load(path, config.max_distance_km),
            None => {
                log::warn!("No gazetteer configured; addresses will not resolve");
                Ok(Self::new(Vec::new(), config.max_distance_km))
            }
        }
    }
}

#[async_trait]
impl ReverseGeocoder for GazetteerGeocoder {
    async fn address_lines(
        &self,
        coordinates: Coordinates,
    ) -> std::result::Result<Vec<String>, GeocodeError> {
        self.entries
            .iter()
            .map(|entry| (distance_km(coordinates, entry.latitude, entry.longitude), entry))
            .filter(|(distance, _)| *distance <= self.max_distance_km)
            .min_by(|a, b| a.0.total_cmp(&b.0))
            .map(|(_, entry)| entry.lines.clone())
            .ok_or(GeocodeError::NoAddress)
    }
}

/// Great-circle distance (haversine).
fn distance_km(from: Coordinates, latitude: f64, longitude: f64) -> f64 {
    let (lat1, lat2) = (from.latitude().to_radians(), latitude.to_radians());
    let d_lat = lat2 - lat1;
    let d_lon = (longitude - from.longitude()).to_radians();
    let a = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * a.sqrt().asin()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn entry(lat: f64, lon: f64, lines: &[&str]) -> GazetteerEntry {
        GazetteerEntry {
            latitude: lat,
            longitude: lon,
            lines: lines.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn format_joins_and_trims() {
        let lines = vec![" Unter den Linden 1 ".to_string(), "".into(), "Berlin".into()];
        assert_eq!(
            format_address(&lines, ", "),
            Some("Unter den Linden 1, Berlin".to_string())
        );
        assert_eq!(format_address(&["   ".to_string()], ", "), None);
        assert_eq!(format_address(&[], ", "), None);
    }

    #[test]
    fn haversine_is_roughly_right() {
        let berlin = Coordinates::new(52.52, 13.405).unwrap();
        let km = distance_km(berlin, 48.8566, 2.3522);
        assert!((km - 878.0).abs() < 10.0, "got {km}");
    }

    #[tokio::test]
    async fn nearest_entry_within_radius_wins() {
        let geocoder = GazetteerGeocoder::new(
            vec![
                entry(52.52, 13.405, &["Berlin", "Germany"]),
                entry(52.40, 13.06, &["Potsdam", "Germany"]),
            ],
            25.0,
        );
        let near_berlin = Coordinates::new(52.51, 13.39).unwrap();
        assert_eq!(
            reverse_geocode(&geocoder, near_berlin, ", ").await,
            Ok("Berlin, Germany".to_string())
        );

        let far_away = Coordinates::new(-33.86, 151.21).unwrap();
        assert_eq!(
            reverse_geocode(&geocoder, far_away, ", ").await,
            Err(GeocodeError::NoAddress)
        );
    }

    #[tokio::test]
    async fn blank_lines_count_as_no_address() {
        let geocoder = GazetteerGeocoder::new(vec![entry(0.0, 0.0, &["  "])], 25.0);
        let here = Coordinates::new(0.0, 0.0).unwrap();
        assert_eq!(
            reverse_geocode(&geocoder, here, ", ").await,
            Err(GeocodeError::NoAddress)
        );
    }
}
