use crate::error::{Error, Result};
use crate::models::Coordinates;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeocodeConfig {
    #[serde(default = "default_delimiter")]
    pub delimiter: String,
    /// Optional JSON gazetteer used by the offline geocoder.
    #[serde(default)]
    pub gazetteer_path: Option<PathBuf>,
    #[serde(default = "default_max_distance_km")]
    pub max_distance_km: f64,
}

impl Default for GeocodeConfig {
    fn default() -> Self {
        Self {
            delimiter: default_delimiter(),
            gazetteer_path: None,
            max_distance_km: default_max_distance_km(),
        }
    }
}

fn default_delimiter() -> String {
    ", ".to_string()
}

fn default_max_distance_km() -> f64 {
    25.0
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MapConfig {
    #[serde(default = "default_center")]
    pub default_center: Coordinates,
    #[serde(default = "default_zoom")]
    pub default_zoom: f64,
    #[serde(default = "default_focused_zoom")]
    pub focused_zoom: f64,
}

impl Default for MapConfig {
    fn default() -> Self {
        Self {
            default_center: default_center(),
            default_zoom: default_zoom(),
            focused_zoom: default_focused_zoom(),
        }
    }
}

fn default_center() -> Coordinates {
    // London
    Coordinates::from_trusted(51.5074, 0.1278)
}

fn default_zoom() -> f64 {
    6.0
}

fn default_focused_zoom() -> f64 {
    15.0
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationConfig {
    /// Fix reported by the headless location provider. Without one every
    /// current-location request fails.
    #[serde(default)]
    pub fixed: Option<Coordinates>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub geocode: GeocodeConfig,
    #[serde(default)]
    pub map: MapConfig,
    #[serde(default)]
    pub location: LocationConfig,
}

impl Settings {
    /// Reads `settings.json`, falling back to defaults when it does not exist.
    pub fn load(paths: &AppPaths) -> Result<Self> {
        if !paths.settings_path.exists() {
            log::debug!(
                "No settings at {}; using defaults",
                paths.settings_path.display()
            );
            return Ok(Self::default());
        }
        let data = std::fs::read(&paths.settings_path)?;
        let settings = serde_json::from_slice(&data)?;
        log::info!("Loaded settings from {}", paths.settings_path.display());
        Ok(settings)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppPaths {
    pub root: PathBuf,
    pub db_path: PathBuf,
    pub images_dir: PathBuf,
    pub settings_path: PathBuf,
}

impl AppPaths {
    pub fn discover() -> Result<Self> {
        let dirs = ProjectDirs::from("com", "example", "happy-places")
            .ok_or_else(|| Error::Path("Failed to get app data dir".to_string()))?;
        Self::at(dirs.data_dir())
    }

    /// Lays out the app directories under `root`, creating them as needed.
    pub fn at(root: &Path) -> Result<Self> {
        let images_dir = root.join("images");
        std::fs::create_dir_all(&images_dir)?;

        Ok(Self {
            root: root.to_path_buf(),
            db_path: root.join("happy_places.db"),
            images_dir,
            settings_path: root.join("settings.json"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    #[test]
    fn missing_settings_file_uses_defaults() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::at(dir.path()).unwrap();
        let settings = Settings::load(&paths).unwrap();
        assert_eq!(settings.geocode.delimiter, ", ");
        assert_eq!(settings.map.default_zoom, 6.0);
        assert_eq!(settings.map.default_center.latitude(), 51.5074);
        assert!(settings.location.fixed.is_none());
        assert!(paths.images_dir.is_dir());
    }

    #[test]
    fn partial_settings_keep_other_defaults() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::at(dir.path()).unwrap();
        std::fs::write(
            &paths.settings_path,
            r#"{"geocode": {"delimiter": " / "}, "location": {"fixed": {"latitude": 1.5, "longitude": 2.5}}}"#,
        )
        .unwrap();
        let settings = Settings::load(&paths).unwrap();
        assert_eq!(settings.geocode.delimiter, " / ");
        assert_eq!(settings.geocode.max_distance_km, 25.0);
        assert_eq!(settings.map.focused_zoom, 15.0);
        assert_eq!(
            settings.location.fixed,
            Some(Coordinates::new(1.5, 2.5).unwrap())
        );
    }

    #[test]
    fn out_of_range_fixed_location_fails_to_load() {
        let dir = TempDir::new().unwrap();
        let paths = AppPaths::at(dir.path()).unwrap();
        std::fs::write(
            &paths.settings_path,
            r#"{"location": {"fixed": {"latitude": 100.0, "longitude": 0.0}}}"#,
        )
        .unwrap();
        assert!(matches!(Settings::load(&paths), Err(Error::Json(_))));
    }
}
