// mesh.rs — triangulated UV sphere used for picking (viewer point -> sphere point)

use glam::DVec3;

use crate::coords::{spherical_to_vector3, Position, SPHERE_RADIUS};

#[derive(Debug, Clone)]
pub struct SphereMesh {
    pub radius: f64,
    pub positions: Vec<DVec3>,
    pub indices: Vec<u32>,
}

/// Build a sphere with `lat` rings and `lon` slices, vertices laid out with the same
/// orientation as [`spherical_to_vector3`].
pub fn build_sphere(radius: f64, lat: usize, lon: usize) -> SphereMesh {
    let lat = lat.max(2);
    let lon = lon.max(3);
    let mut positions = Vec::with_capacity((lat + 1) * (lon + 1));
    let mut indices = Vec::with_capacity(lat * lon * 6);

    for i in 0..=lat {
        let latitude = std::f64::consts::FRAC_PI_2 - std::f64::consts::PI * (i as f64) / (lat as f64);

        for j in 0..=lon {
            let longitude = std::f64::consts::TAU * (j as f64) / (lon as f64);
            let unit = spherical_to_vector3(Position::new(longitude, latitude)) / SPHERE_RADIUS;
            positions.push(unit * radius);
        }
    }

    for i in 0..lat {
        for j in 0..lon {
            let a = (i * (lon + 1) + j) as u32;
            let b = a + (lon + 1) as u32;

            indices.extend_from_slice(&[
                a, b, a + 1,
                b, b + 1, a + 1,
            ]);
        }
    }

    SphereMesh {
        radius,
        positions,
        indices,
    }
}

impl SphereMesh {
    /// Nearest intersection of the ray with the mesh, both faces considered.
    pub fn raycast(&self, origin: DVec3, direction: DVec3) -> Option<DVec3> {
        if !direction.is_finite() || direction.length_squared() == 0.0 {
            return None;
        }

        let mut nearest: Option<f64> = None;
        for tri in self.indices.chunks_exact(3) {
            let v0 = self.positions[tri[0] as usize];
            let v1 = self.positions[tri[1] as usize];
            let v2 = self.positions[tri[2] as usize];

            if let Some(t) = intersect_triangle(origin, direction, v0, v1, v2) {
                if nearest.map_or(true, |n| t < n) {
                    nearest = Some(t);
                }
            }
        }

        nearest.map(|t| origin + direction * t)
    }
}

// Möller–Trumbore
fn intersect_triangle(origin: DVec3, dir: DVec3, v0: DVec3, v1: DVec3, v2: DVec3) -> Option<f64> {
    const EPSILON: f64 = 1e-12;

    let edge1 = v1 - v0;
    let edge2 = v2 - v0;
    let p = dir.cross(edge2);
    let det = edge1.dot(p);
    // pole rows produce degenerate triangles
    if det.abs() < EPSILON {
        return None;
    }

    let inv_det = 1.0 / det;
    let s = origin - v0;
    let u = s.dot(p) * inv_det;
    if !(0.0..=1.0).contains(&u) {
        return None;
    }

    let q = s.cross(edge1);
    let v = dir.dot(q) * inv_det;
    if v < 0.0 || u + v > 1.0 {
        return None;
    }

    let t = edge2.dot(q) * inv_det;
    (t > EPSILON).then_some(t)
}
