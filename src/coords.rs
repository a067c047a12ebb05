// coords.rs — spherical / texture / 3D / screen conversions
//
// Convention: longitude 0 faces +z, longitude grows towards -x, latitude grows towards +y.
// Every other space is derived from `spherical_to_vector3`.

use std::f64::consts::{FRAC_PI_2, PI, TAU};

use glam::{DVec2, DVec3};
use serde::{Deserialize, Serialize};

use crate::camera::Camera;
use crate::error::{Result, ViewerError};
use crate::mesh::SphereMesh;
use crate::units::{clamp_latitude, normalize_angle};

/// Radius of the panorama sphere in scene units.
pub const SPHERE_RADIUS: f64 = 100.0;

/// A direction on the sphere, in radians.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Position {
    pub longitude: f64,
    pub latitude: f64,
}

impl Position {
    pub fn new(longitude: f64, latitude: f64) -> Self {
        Self { longitude, latitude }
    }

    /// Longitude wrapped into `[0, 2π)`, latitude clamped to the poles.
    pub fn normalized(self) -> Self {
        Self {
            longitude: normalize_angle(self.longitude),
            latitude: clamp_latitude(self.latitude),
        }
    }

    /// Great-circle angle to `other` (spherical law of cosines).
    pub fn angle_to(&self, other: &Position) -> f64 {
        let cos = self.latitude.cos() * other.latitude.cos() * (self.longitude - other.longitude).cos()
            + self.latitude.sin() * other.latitude.sin();
        cos.clamp(-1.0, 1.0).acos()
    }
}

/// A pixel on the source equirectangular image.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct TexturePoint {
    pub x: f64,
    pub y: f64,
}

impl TexturePoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Crop metadata of a (possibly partial) equirectangular panorama.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PanoData {
    pub full_width: f64,
    pub full_height: f64,
    pub cropped_width: f64,
    pub cropped_height: f64,
    pub cropped_x: f64,
    pub cropped_y: f64,
}

impl PanoData {
    /// A complete 2:1 panorama.
    pub fn full(width: f64, height: f64) -> Self {
        Self {
            full_width: width,
            full_height: height,
            cropped_width: width,
            cropped_height: height,
            cropped_x: 0.0,
            cropped_y: 0.0,
        }
    }

    /// Crop data for an image covering the full 360° horizontally but only part of the
    /// vertical range, assumed centred on the horizon.
    pub fn centered(width: f64, height: f64) -> Self {
        let full_height = (width / 2.0).max(height);
        Self {
            full_width: width,
            full_height,
            cropped_width: width,
            cropped_height: height,
            cropped_x: 0.0,
            cropped_y: ((full_height - height) / 2.0).floor(),
        }
    }
}

/// What kind of panorama is currently displayed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PanoramaKind {
    Equirectangular(PanoData),
    Cubemap { face_size: u32 },
}

impl PanoramaKind {
    fn pano_data(&self) -> Result<&PanoData> {
        match self {
            PanoramaKind::Equirectangular(data) => Ok(data),
            PanoramaKind::Cubemap { .. } => Err(ViewerError::CubemapTextureCoords),
        }
    }
}

pub fn spherical_to_vector3(position: Position) -> DVec3 {
    let (sin_lat, cos_lat) = position.latitude.sin_cos();
    let (sin_lon, cos_lon) = position.longitude.sin_cos();
    DVec3::new(-cos_lat * sin_lon, sin_lat, cos_lat * cos_lon) * SPHERE_RADIUS
}

/// Inverse of [`spherical_to_vector3`] for any non-zero vector.
///
/// At the poles the longitude is undefined; whatever `atan2` yields there is returned.
pub fn vector3_to_spherical(v: DVec3) -> Position {
    let horizontal = v.x.hypot(v.z);
    if horizontal == 0.0 && v.y == 0.0 {
        return Position::default();
    }

    // same as π/2 - acos(y/|v|), without the precision loss near the poles
    let latitude = v.y.atan2(horizontal).clamp(-FRAC_PI_2, FRAC_PI_2);
    let theta = v.x.atan2(v.z);
    let longitude = if theta < 0.0 { -theta } else { TAU - theta };

    Position {
        longitude: normalize_angle(longitude),
        latitude,
    }
}

pub fn texture_to_spherical(panorama: &PanoramaKind, point: TexturePoint) -> Result<Position> {
    let data = panorama.pano_data()?;

    let relative_x = (point.x + data.cropped_x) / data.full_width * TAU;
    let relative_y = (point.y + data.cropped_y) / data.full_height * PI;

    Ok(Position {
        longitude: if relative_x >= PI {
            relative_x - PI
        } else {
            relative_x + PI
        },
        latitude: FRAC_PI_2 - relative_y,
    })
}

pub fn spherical_to_texture(panorama: &PanoramaKind, position: Position) -> Result<TexturePoint> {
    let data = panorama.pano_data()?;
    let position = position.normalized();

    let relative_long = position.longitude / TAU * data.full_width;
    let relative_lat = position.latitude / PI * data.full_height;

    let x = if position.longitude < PI {
        relative_long + data.full_width / 2.0
    } else {
        relative_long - data.full_width / 2.0
    };

    Ok(TexturePoint {
        x: x - data.cropped_x,
        y: data.full_height / 2.0 - relative_lat - data.cropped_y,
    })
}

/// Project a scene point to viewer pixels. Points behind the camera project mirrored;
/// callers check the hemisphere first.
pub fn vector3_to_viewer_coords(v: DVec3, camera: &Camera) -> DVec2 {
    camera.project(v)
}

/// Cast a ray through a viewer pixel and return where it meets the sphere mesh.
pub fn viewer_coords_to_vector3(point: DVec2, camera: &Camera, mesh: &SphereMesh) -> Option<DVec3> {
    let direction = camera.unproject_ray(point)?;
    let hit = mesh.raycast(DVec3::ZERO, direction);
    if hit.is_none() {
        log::warn!("no sphere intersection at viewer point ({}, {})", point.x, point.y);
    }
    hit
}
