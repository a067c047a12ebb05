// visibility.rs — per-frame marker projection and hemisphere clipping

use std::collections::HashMap;

use glam::{DQuat, DVec2, DVec3};

use super::{Marker, MarkerMeasure, MarkerRegistry, Size};
use crate::camera::Camera;
use crate::coords::SPHERE_RADIUS;
use crate::events::ViewerEvent;

/// Angle (radians) by which clip points are pulled off the horizon towards the camera.
pub const CLIP_EPSILON: f64 = 0.01;

/// Polyline hit tolerance in pixels.
const LINE_HIT_DISTANCE: f64 = 6.0;

/// Point where the great circle through `visible` and `hidden` crosses the edge of the
/// hemisphere seen along `camera_direction`, nudged slightly into view.
///
/// The result lies on the sphere. When the two points are antipodal any great circle
/// through them qualifies; the one also containing the camera direction is used.
pub fn great_circle_clip_point(visible: DVec3, hidden: DVec3, camera_direction: DVec3) -> DVec3 {
    let c = camera_direction.normalize();
    let p1 = visible;

    let n = p1.cross(hidden);
    let n = if n.length_squared() > 1e-12 {
        n.normalize()
    } else {
        let alt = p1.cross(c);
        if alt.length_squared() > 1e-12 {
            alt.normalize()
        } else {
            p1.normalize().any_orthonormal_vector()
        }
    };

    let v = n.cross(p1).normalize();
    let h = (p1 * -c.dot(v) + v * c.dot(p1)).normalize();
    let axis = h.cross(c).normalize();
    (DQuat::from_axis_angle(axis, CLIP_EPSILON) * h) * SPHERE_RADIUS
}

/// Where a marker lands on screen this frame.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkerProjection {
    pub visible: bool,
    /// Top-left corner of the marker box (point markers) or of the outline bounds.
    pub position_2d: DVec2,
    /// Clipped outline of poly markers, empty for point markers.
    pub outline: Vec<DVec2>,
    pub size: Option<Size>,
}

impl MarkerProjection {
    fn hidden() -> Self {
        Self {
            visible: false,
            position_2d: DVec2::ZERO,
            outline: Vec::new(),
            size: None,
        }
    }
}

fn project_point_marker(
    marker: &Marker,
    camera: &Camera,
    measure: &dyn MarkerMeasure,
    pixel_ratio: f64,
) -> MarkerProjection {
    let Some(&point) = marker.positions_3d().first() else {
        return MarkerProjection::hidden();
    };
    let size = marker.size(measure, pixel_ratio).unwrap_or_default();
    let anchor = marker.anchor();
    let top_left =
        camera.project(point) - DVec2::new(size.width * anchor.x, size.height * anchor.y);

    // the marker's own size is the slack, so half-offscreen markers stay visible
    let visible = point.dot(camera.direction) > 0.0
        && top_left.x + size.width >= 0.0
        && top_left.x - size.width <= camera.width
        && top_left.y + size.height >= 0.0
        && top_left.y - size.height <= camera.height;

    MarkerProjection {
        visible,
        position_2d: top_left,
        outline: Vec::new(),
        size: Some(size),
    }
}

/// Scene-space outline of a poly marker with hidden vertices replaced by clip points.
pub fn clip_outline(points: &[DVec3], closed: bool, camera_direction: DVec3) -> Vec<DVec3> {
    let n = points.len();
    let seen: Vec<bool> = points.iter().map(|p| p.dot(camera_direction) > 0.0).collect();
    let mut outline = Vec::with_capacity(n + 2);

    for i in 0..n {
        if seen[i] {
            outline.push(points[i]);
            continue;
        }
        let prev = if i > 0 {
            Some(i - 1)
        } else if closed && n > 1 {
            Some(n - 1)
        } else {
            None
        };
        let next = if i + 1 < n {
            Some(i + 1)
        } else if closed && n > 1 {
            Some(0)
        } else {
            None
        };

        for neighbour in [prev, next].into_iter().flatten() {
            if seen[neighbour] {
                outline.push(great_circle_clip_point(
                    points[neighbour],
                    points[i],
                    camera_direction,
                ));
            }
        }
    }
    outline
}

fn project_poly_marker(marker: &Marker, camera: &Camera) -> MarkerProjection {
    let closed = marker.is_polygon();
    let outline: Vec<DVec2> = clip_outline(marker.positions_3d(), closed, camera.direction)
        .into_iter()
        .map(|p| camera.project(p))
        .collect();

    let min_points = if closed { 3 } else { 2 };
    if outline.len() < min_points {
        return MarkerProjection::hidden();
    }

    let min = outline.iter().fold(DVec2::splat(f64::INFINITY), |a, p| a.min(*p));
    let max = outline
        .iter()
        .fold(DVec2::splat(f64::NEG_INFINITY), |a, p| a.max(*p));
    let visible = max.x >= 0.0 && min.x <= camera.width && max.y >= 0.0 && min.y <= camera.height;

    MarkerProjection {
        visible,
        position_2d: min,
        outline,
        size: None,
    }
}

fn point_in_polygon(point: DVec2, polygon: &[DVec2]) -> bool {
    let mut inside = false;
    let mut j = polygon.len().wrapping_sub(1);
    for i in 0..polygon.len() {
        let (a, b) = (polygon[i], polygon[j]);
        if (a.y > point.y) != (b.y > point.y)
            && point.x < (b.x - a.x) * (point.y - a.y) / (b.y - a.y) + a.x
        {
            inside = !inside;
        }
        j = i;
    }
    inside
}

fn distance_to_segment(point: DVec2, a: DVec2, b: DVec2) -> f64 {
    let ab = b - a;
    let len2 = ab.length_squared();
    let t = if len2 > 0.0 {
        ((point - a).dot(ab) / len2).clamp(0.0, 1.0)
    } else {
        0.0
    };
    point.distance(a + ab * t)
}

/// Keeps the latest projection of every marker.
#[derive(Debug, Default)]
pub struct MarkerVisibilityEngine {
    projections: HashMap<String, MarkerProjection>,
}

impl MarkerVisibilityEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Re-project every marker against `camera`, returning the visibility changes.
    ///
    /// Hidden markers (user-hidden or culled) keep a projection with `visible == false`.
    pub fn update(
        &mut self,
        registry: &MarkerRegistry,
        camera: &Camera,
        measure: &dyn MarkerMeasure,
        pixel_ratio: f64,
    ) -> Vec<ViewerEvent> {
        let mut events = Vec::new();
        let mut next = HashMap::with_capacity(registry.len());

        for marker in registry.iter() {
            let mut projection = if marker.is_poly() {
                project_poly_marker(marker, camera)
            } else {
                project_point_marker(marker, camera, measure, pixel_ratio)
            };
            projection.visible &= marker.config().visible;

            let was_visible = self
                .projections
                .get(marker.id())
                .is_some_and(|p| p.visible);
            if was_visible != projection.visible {
                events.push(ViewerEvent::MarkerVisibilityChanged {
                    id: marker.id().to_string(),
                    visible: projection.visible,
                });
            }
            next.insert(marker.id().to_string(), projection);
        }

        self.projections = next;
        events
    }

    pub fn projection(&self, id: &str) -> Option<&MarkerProjection> {
        self.projections.get(id)
    }

    pub fn is_visible(&self, id: &str) -> bool {
        self.projection(id).is_some_and(|p| p.visible)
    }

    pub fn forget(&mut self, id: &str) {
        self.projections.remove(id);
    }

    pub fn clear(&mut self) {
        self.projections.clear();
    }

    /// Top-most visible marker under a viewer point; later markers are drawn on top.
    pub fn hit_test(&self, registry: &MarkerRegistry, point: DVec2) -> Option<String> {
        registry.iter().rev().find_map(|marker| {
            let projection = self.projections.get(marker.id()).filter(|p| p.visible)?;
            let hit = if marker.is_polygon() {
                point_in_polygon(point, &projection.outline)
            } else if marker.is_poly() {
                projection
                    .outline
                    .windows(2)
                    .any(|w| distance_to_segment(point, w[0], w[1]) <= LINE_HIT_DISTANCE)
            } else {
                let size = projection.size.unwrap_or_default();
                let min = projection.position_2d;
                point.x >= min.x
                    && point.x <= min.x + size.width
                    && point.y >= min.y
                    && point.y <= min.y + size.height
            };
            hit.then(|| marker.id().to_string())
        })
    }
}
