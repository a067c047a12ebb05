// config.rs — viewer options, loadable from JSON
//
// Every field has a default so a config file only lists what it changes:
//
//   { "default_long": "90deg", "anim_speed": "1rpm", "longitude_range": ["-45deg", "45deg"] }

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::coords::Position;
use crate::error::{Result, ViewerError};
use crate::markers::MarkerConfig;
use crate::units::{parse_speed, AngleValue};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TransitionConfig {
    /// Milliseconds; 0 disables the cross-fade.
    pub duration: f64,
}

impl Default for TransitionConfig {
    fn default() -> Self {
        Self { duration: 1500.0 }
    }
}

/// Resolution of the sphere used for picking.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SphereSegments {
    pub width: usize,
    pub height: usize,
}

impl Default for SphereSegments {
    fn default() -> Self {
        Self {
            width: 64,
            height: 32,
        }
    }
}

/// Strings shown by the host UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Lang {
    pub autorotate: String,
    pub zoom: String,
    pub zoom_in: String,
    pub zoom_out: String,
    pub reset: String,
    pub fullscreen: String,
    pub markers: String,
    pub gyroscope: String,
    pub loading: String,
    pub open_image: String,
    pub load_error: String,
}

impl Default for Lang {
    fn default() -> Self {
        Self {
            autorotate: "Automatic rotation".into(),
            zoom: "Zoom".into(),
            zoom_in: "Zoom in".into(),
            zoom_out: "Zoom out".into(),
            reset: "Reset view".into(),
            fullscreen: "Fullscreen".into(),
            markers: "Markers".into(),
            gyroscope: "Gyroscope".into(),
            loading: "Loading...".into(),
            open_image: "Open image...".into(),
            load_error: "The panorama cannot be loaded".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    pub default_long: AngleValue,
    pub default_lat: AngleValue,
    /// Degrees.
    pub min_fov: f64,
    /// Degrees.
    pub max_fov: f64,
    pub default_zoom_lvl: f64,
    pub longitude_range: Option<[AngleValue; 2]>,
    pub latitude_range: Option<[AngleValue; 2]>,
    pub move_speed: f64,
    pub zoom_speed: f64,
    pub mousewheel_factor: f64,
    pub anim_speed: String,
    pub anim_lat: Option<AngleValue>,
    /// Idle milliseconds before autorotate starts; `None` disables it.
    pub time_anim: Option<u64>,
    pub move_inertia: bool,
    pub mousewheel: bool,
    pub mousemove: bool,
    pub transition: TransitionConfig,
    pub sphere_segments: SphereSegments,
    pub lang: Lang,
    pub ui_font: Option<PathBuf>,
    /// Added when the viewer is created; texture placements need a panorama first.
    pub markers: Vec<MarkerConfig>,
}

impl Default for ViewerConfig {
    fn default() -> Self {
        Self {
            default_long: AngleValue::Radians(0.0),
            default_lat: AngleValue::Radians(0.0),
            min_fov: 30.0,
            max_fov: 90.0,
            default_zoom_lvl: 50.0,
            longitude_range: None,
            latitude_range: None,
            move_speed: 1.0,
            zoom_speed: 2.0,
            mousewheel_factor: 1.0,
            anim_speed: "2rpm".into(),
            anim_lat: None,
            time_anim: Some(2000),
            move_inertia: true,
            mousewheel: true,
            mousemove: true,
            transition: TransitionConfig::default(),
            sphere_segments: SphereSegments::default(),
            lang: Lang::default(),
            ui_font: None,
            markers: Vec::new(),
        }
    }
}

/// Validated navigation parameters, angles in radians.
#[derive(Debug, Clone, PartialEq)]
pub struct NavigationLimits {
    pub min_fov: f64,
    pub max_fov: f64,
    pub default_position: Position,
    pub default_zoom: f64,
    /// `(start, end)`; `start > end` means the range crosses longitude 0.
    pub longitude_range: Option<(f64, f64)>,
    /// `(min, max)`.
    pub latitude_range: Option<(f64, f64)>,
    pub move_speed: f64,
    pub zoom_speed: f64,
    pub mousewheel_factor: f64,
    /// Radians per second.
    pub anim_speed: f64,
    pub anim_lat: f64,
}

impl ViewerConfig {
    pub fn from_json_str(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config = Self::from_json_str(&text)?;
        log::info!("configuration loaded from {}", path.as_ref().display());
        Ok(config)
    }

    /// Validate everything and convert to radians.
    pub fn resolve(&self) -> Result<NavigationLimits> {
        if !(self.min_fov > 0.0 && self.min_fov < 180.0) {
            return Err(ViewerError::InvalidConfigValue {
                field: "min_fov",
                value: self.min_fov,
            });
        }
        if !(self.max_fov > 0.0 && self.max_fov < 180.0) {
            return Err(ViewerError::InvalidConfigValue {
                field: "max_fov",
                value: self.max_fov,
            });
        }
        if self.max_fov < self.min_fov {
            return Err(ViewerError::InvalidFovRange {
                min: self.min_fov,
                max: self.max_fov,
            });
        }
        for (field, value) in [
            ("default_zoom_lvl", self.default_zoom_lvl),
            ("move_speed", self.move_speed),
            ("zoom_speed", self.zoom_speed),
            ("mousewheel_factor", self.mousewheel_factor),
        ] {
            if !value.is_finite() {
                return Err(ViewerError::InvalidConfigValue { field, value });
            }
        }

        let default_position = Position::new(
            self.default_long.resolve(false)?,
            self.default_lat.resolve(true)?,
        );

        let longitude_range = match &self.longitude_range {
            Some([start, end]) => Some((start.resolve(false)?, end.resolve(false)?)),
            None => None,
        };
        let latitude_range = match &self.latitude_range {
            Some([a, b]) => {
                let (a, b) = (a.resolve(true)?, b.resolve(true)?);
                Some((a.min(b), a.max(b)))
            }
            None => None,
        };

        let anim_lat = match &self.anim_lat {
            Some(angle) => angle.resolve(true)?,
            None => default_position.latitude,
        };

        Ok(NavigationLimits {
            min_fov: self.min_fov.to_radians(),
            max_fov: self.max_fov.to_radians(),
            default_position,
            default_zoom: self.default_zoom_lvl.clamp(0.0, 100.0),
            longitude_range,
            latitude_range,
            move_speed: self.move_speed,
            zoom_speed: self.zoom_speed,
            mousewheel_factor: self.mousewheel_factor,
            anim_speed: parse_speed(&self.anim_speed)?,
            anim_lat,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::{FRAC_PI_4, TAU};

    #[test]
    fn defaults_resolve() {
        let limits = ViewerConfig::default().resolve().unwrap();
        assert!((limits.min_fov - 30f64.to_radians()).abs() < 1e-12);
        assert!((limits.anim_speed - 2.0 * TAU / 60.0).abs() < 1e-12);
        assert_eq!(limits.default_zoom, 50.0);
        assert_eq!(limits.longitude_range, None);
    }

    #[test]
    fn parses_partial_json() {
        let config = ViewerConfig::from_json_str(
            r#"{
                "default_long": "90deg",
                "default_lat": -0.2,
                "longitude_range": ["-45deg", "45deg"],
                "latitude_range": ["30deg", "-30deg"],
                "time_anim": null,
                "lang": { "autorotate": "Rotation" }
            }"#,
        )
        .unwrap();
        assert_eq!(config.time_anim, None);
        assert_eq!(config.lang.autorotate, "Rotation");
        assert_eq!(config.lang.zoom, "Zoom");
        assert_eq!(config.max_fov, 90.0);

        let limits = config.resolve().unwrap();
        assert!((limits.default_position.longitude - std::f64::consts::FRAC_PI_2).abs() < 1e-12);
        assert!((limits.default_position.latitude + 0.2).abs() < 1e-12);
        assert!((limits.anim_lat + 0.2).abs() < 1e-12);

        let (start, end) = limits.longitude_range.unwrap();
        assert!((start - (TAU - FRAC_PI_4)).abs() < 1e-12);
        assert!((end - FRAC_PI_4).abs() < 1e-12);

        let (min, max) = limits.latitude_range.unwrap();
        assert!(min < max);
    }

    #[test]
    fn markers_in_config() {
        let config = ViewerConfig::from_json_str(
            r#"{
                "markers": [
                    { "id": "door", "type": "html", "html": "Door", "position": { "longitude": 0.5, "latitude": 0.0 } },
                    { "id": "roof", "type": "polyline", "points": [
                        { "longitude": 0.1, "latitude": 0.3 }, { "longitude": 0.4, "latitude": 0.3 }
                    ] }
                ]
            }"#,
        )
        .unwrap();
        assert_eq!(config.markers.len(), 2);
        assert_eq!(config.markers[0].id, "door");
        assert_eq!(config.markers[1].kind.name(), "polyline");
    }

    #[test]
    fn rejects_inverted_fov() {
        let config = ViewerConfig {
            min_fov: 90.0,
            max_fov: 30.0,
            ..Default::default()
        };
        assert_eq!(
            config.resolve(),
            Err(ViewerError::InvalidFovRange { min: 90.0, max: 30.0 })
        );
    }

    #[test]
    fn rejects_bad_units() {
        let config = ViewerConfig {
            anim_speed: "2 laps".into(),
            ..Default::default()
        };
        assert_eq!(
            config.resolve(),
            Err(ViewerError::UnknownSpeedUnit("laps".into()))
        );

        let config = ViewerConfig {
            default_long: AngleValue::from("3 turns"),
            ..Default::default()
        };
        assert!(matches!(config.resolve(), Err(ViewerError::UnknownAngleUnit(_))));
    }

    #[test]
    fn invalid_json_is_a_config_error() {
        assert!(matches!(
            ViewerConfig::from_json_str("{ \"min_fov\": \"wide\" }"),
            Err(ViewerError::Config(_))
        ));
    }
}
