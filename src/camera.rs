// camera.rs — viewport geometry and the perspective camera at the sphere centre

use glam::{DMat4, DVec2, DVec3};

use crate::coords::{spherical_to_vector3, Position, SPHERE_RADIUS};

const NEAR: f64 = 1.0;
const FAR: f64 = SPHERE_RADIUS * 3.0;

/// Pinhole relation between vertical and horizontal field of view.
pub fn horizontal_fov(vfov: f64, aspect: f64) -> f64 {
    2.0 * ((vfov / 2.0).tan() * aspect).atan()
}

/// Size of the drawing surface and the fields of view derived from it. Angles in radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub width: f64,
    pub height: f64,
    pub aspect: f64,
    pub hfov: f64,
    pub vfov: f64,
}

impl Viewport {
    pub fn new(width: f64, height: f64, vfov: f64) -> Self {
        let aspect = if width > 0.0 && height > 0.0 {
            width / height
        } else {
            1.0
        };
        Self {
            width,
            height,
            aspect,
            hfov: horizontal_fov(vfov, aspect),
            vfov,
        }
    }

    pub fn with_vfov(&self, vfov: f64) -> Self {
        Self::new(self.width, self.height, vfov)
    }

    pub fn resized(&self, width: f64, height: f64) -> Self {
        Self::new(width, height, self.vfov)
    }

    pub fn vfov_degrees(&self) -> f64 {
        self.vfov.to_degrees()
    }

    pub fn hfov_degrees(&self) -> f64 {
        self.hfov.to_degrees()
    }
}

/// Read-only camera snapshot for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Camera {
    /// Unit view direction.
    pub direction: DVec3,
    pub up: DVec3,
    pub vfov: f64,
    pub aspect: f64,
    pub width: f64,
    pub height: f64,
}

impl Camera {
    pub fn looking_at(position: Position, viewport: &Viewport) -> Self {
        let direction = spherical_to_vector3(position).normalize();
        // latitude tangent: world up away from the poles, still defined at them
        let (sin_lat, cos_lat) = position.latitude.sin_cos();
        let (sin_lon, cos_lon) = position.longitude.sin_cos();
        let up = DVec3::new(sin_lat * sin_lon, cos_lat, -sin_lat * cos_lon);

        Self {
            direction,
            up,
            vfov: viewport.vfov,
            aspect: viewport.aspect,
            width: viewport.width,
            height: viewport.height,
        }
    }

    pub fn view_projection(&self) -> DMat4 {
        let view = DMat4::look_at_rh(DVec3::ZERO, self.direction, self.up);
        let projection = DMat4::perspective_rh_gl(self.vfov, self.aspect, NEAR, FAR);
        projection * view
    }

    pub fn project(&self, v: DVec3) -> DVec2 {
        let ndc = self.view_projection().project_point3(v);
        DVec2::new(
            (ndc.x + 1.0) / 2.0 * self.width,
            (1.0 - ndc.y) / 2.0 * self.height,
        )
    }

    /// Unit direction of the ray leaving the camera through a viewer pixel.
    pub fn unproject_ray(&self, point: DVec2) -> Option<DVec3> {
        if self.width <= 0.0 || self.height <= 0.0 || !point.is_finite() {
            return None;
        }

        let ndc_x = 2.0 * point.x / self.width - 1.0;
        let ndc_y = 1.0 - 2.0 * point.y / self.height;
        let inverse = self.view_projection().inverse();
        let near = inverse.project_point3(DVec3::new(ndc_x, ndc_y, -1.0));
        let far = inverse.project_point3(DVec3::new(ndc_x, ndc_y, 1.0));

        let ray = far - near;
        if !ray.is_finite() || ray.length_squared() == 0.0 {
            return None;
        }
        Some(ray.normalize())
    }
}
