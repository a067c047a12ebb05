// error.rs — configuration and usage errors surfaced by the navigation core

use thiserror::Error;

pub type Result<T> = std::result::Result<T, ViewerError>;

/// Errors returned synchronously by the mutating viewer operations.
///
/// None of these leave the viewer half-updated: every operation validates its
/// input before touching position, zoom or the marker registry.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ViewerError {
    #[error("unknown speed unit \"{0}\"")]
    UnknownSpeedUnit(String),

    #[error("unknown angle \"{0}\"")]
    InvalidAngle(String),

    #[error("unknown angle unit \"{0}\"")]
    UnknownAngleUnit(String),

    #[error("unknown easing \"{0}\"")]
    UnknownEasing(String),

    #[error("invalid anchor \"{0}\"")]
    InvalidAnchor(String),

    #[error("max_fov ({max}) cannot be lower than min_fov ({min})")]
    InvalidFovRange { min: f64, max: f64 },

    #[error("invalid value for {field}: {value}")]
    InvalidConfigValue { field: &'static str, value: f64 },

    #[error("marker \"{0}\" is missing its position")]
    MissingMarkerPosition(String),

    #[error("marker \"{0}\" is missing its width/height")]
    MissingMarkerSize(String),

    #[error("marker \"{0}\" already exists")]
    DuplicateMarker(String),

    #[error("cannot find marker \"{0}\"")]
    UnknownMarker(String),

    #[error("the type of marker \"{0}\" cannot be changed")]
    MarkerTypeChange(String),

    #[error("texture coordinates are not available for cubemap panoramas")]
    CubemapTextureCoords,

    #[error("texture coordinates require a loaded panorama")]
    NoPanorama,

    #[error("device orientation is not supported")]
    GyroscopeUnavailable,

    #[error("invalid configuration: {0}")]
    Config(String),
}

impl From<serde_json::Error> for ViewerError {
    fn from(err: serde_json::Error) -> Self {
        ViewerError::Config(err.to_string())
    }
}

impl From<std::io::Error> for ViewerError {
    fn from(err: std::io::Error) -> Self {
        ViewerError::Config(err.to_string())
    }
}
