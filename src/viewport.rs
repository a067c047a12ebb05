// viewport.rs — camera position / zoom state and the navigation drivers that move it
//
// `ViewState` is the only writer of position and zoom. Drivers (animations, autorotate,
// gyroscope, inertia) get it as their tick context; `ViewportController` owns both the
// state and the single driver slot.

use std::f64::consts::{FRAC_PI_2, TAU};

use glam::{DQuat, DVec2, DVec3, EulerRot};

use crate::animation::{
    AnimationOptions, AnimationScheduler, AnimationTask, DriverKind, FrameDriver, TaskHandle,
    TickOutcome,
};
use crate::camera::{Camera, Viewport};
use crate::config::NavigationLimits;
use crate::coords::{vector3_to_spherical, Position};
use crate::easing::Easing;
use crate::error::{Result, ViewerError};
use crate::events::ViewerEvent;
use crate::system::SystemContext;
use crate::units::{angular_distance, clamp_latitude, normalize_angle, parse_speed};

/// Which range boundaries a position was clamped against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Sides {
    pub left: bool,
    pub right: bool,
    pub top: bool,
    pub bottom: bool,
}

impl Sides {
    pub fn any(&self) -> bool {
        self.left || self.right || self.top || self.bottom
    }
}

/// Longitude delta from `from` to `to` along the shorter way around.
pub fn shortest_arc(from: f64, to: f64) -> f64 {
    let delta = to - from;
    [delta, delta + TAU, delta - TAU]
        .into_iter()
        .fold(delta, |best, candidate| {
            if candidate.abs() < best.abs() {
                candidate
            } else {
                best
            }
        })
}

/// Device orientation angles in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DeviceOrientation {
    pub alpha: f64,
    pub beta: f64,
    pub gamma: f64,
    /// Screen rotation, 0 in portrait.
    pub screen: f64,
}

impl DeviceOrientation {
    pub fn new(alpha: f64, beta: f64, gamma: f64) -> Self {
        Self {
            alpha,
            beta,
            gamma,
            screen: 0.0,
        }
    }

    /// Where the back of the device points.
    pub fn direction(&self) -> DVec3 {
        let q = DQuat::from_euler(
            EulerRot::YXZ,
            self.alpha.to_radians(),
            self.beta.to_radians(),
            -self.gamma.to_radians(),
        ) * DQuat::from_rotation_x(-FRAC_PI_2)
            * DQuat::from_rotation_z(-self.screen.to_radians());
        q * DVec3::NEG_Z
    }
}

/// Target of [`ViewportController::animate`].
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct AnimateTarget {
    pub position: Option<Position>,
    pub zoom: Option<f64>,
}

impl AnimateTarget {
    pub fn position(position: Position) -> Self {
        Self {
            position: Some(position),
            zoom: None,
        }
    }

    pub fn zoom(level: f64) -> Self {
        Self {
            position: None,
            zoom: Some(level),
        }
    }

    pub fn with_zoom(mut self, level: f64) -> Self {
        self.zoom = Some(level);
        self
    }
}

/// A fixed duration in milliseconds, or an angular speed such as `"2rpm"`.
#[derive(Debug, Clone, PartialEq)]
pub enum AnimationSpeed {
    Duration(f64),
    Speed(String),
}

impl From<f64> for AnimationSpeed {
    fn from(ms: f64) -> Self {
        AnimationSpeed::Duration(ms)
    }
}

impl From<&str> for AnimationSpeed {
    fn from(speed: &str) -> Self {
        AnimationSpeed::Speed(speed.to_string())
    }
}

impl From<String> for AnimationSpeed {
    fn from(speed: String) -> Self {
        AnimationSpeed::Speed(speed)
    }
}

/// Writable navigation state.
#[derive(Debug)]
pub struct ViewState {
    position: Position,
    zoom_level: f64,
    viewport: Viewport,
    limits: NavigationLimits,
    pointer: Option<DVec2>,
    orientation: Option<DeviceOrientation>,
    /// Longitude between the device heading and the view, fixed on the first gyroscope sample.
    gyro_offset: Option<f64>,
    crossfade: f64,
    events: Vec<ViewerEvent>,
}

impl ViewState {
    fn new(limits: NavigationLimits, width: f64, height: f64) -> Self {
        let mut state = Self {
            position: Position::default(),
            zoom_level: limits.default_zoom,
            viewport: Viewport::new(width, height, limits.max_fov),
            limits,
            pointer: None,
            orientation: None,
            gyro_offset: None,
            crossfade: 1.0,
            events: Vec::new(),
        };
        state.zoom(state.limits.default_zoom);
        state.rotate(state.limits.default_position, false);
        state.events.clear();
        state
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn zoom_level(&self) -> f64 {
        self.zoom_level
    }

    pub fn viewport(&self) -> &Viewport {
        &self.viewport
    }

    /// Normalise, clamp to the ranges unless `ignore_range`, then store.
    pub fn rotate(&mut self, position: Position, ignore_range: bool) -> Sides {
        let mut target = Position {
            longitude: if position.longitude.is_finite() {
                normalize_angle(position.longitude)
            } else {
                self.position.longitude
            },
            latitude: if position.latitude.is_finite() {
                clamp_latitude(position.latitude)
            } else {
                self.position.latitude
            },
        };

        let sides = if ignore_range {
            Sides::default()
        } else {
            self.apply_ranges(&mut target)
        };
        if sides.any() {
            self.events.push(ViewerEvent::SidesReached(sides));
        }

        if target != self.position {
            self.position = target;
            self.events.push(ViewerEvent::PositionUpdated(target));
        }
        sides
    }

    pub fn zoom(&mut self, level: f64) {
        if !level.is_finite() {
            return;
        }
        let level = level.clamp(0.0, 100.0);
        let limits = &self.limits;
        let vfov = limits.max_fov - (level / 100.0) * (limits.max_fov - limits.min_fov);
        self.viewport = self.viewport.with_vfov(vfov);

        if level != self.zoom_level {
            self.zoom_level = level;
            self.events.push(ViewerEvent::ZoomUpdated(level));
        }
        self.reapply_ranges();
    }

    fn resize(&mut self, width: f64, height: f64) {
        self.viewport = self.viewport.resized(width, height);
        self.events.push(ViewerEvent::SizeUpdated { width, height });
        self.reapply_ranges();
    }

    // the FOV changed, so the same centre may now show something out of range
    fn reapply_ranges(&mut self) {
        if self.limits.longitude_range.is_none() && self.limits.latitude_range.is_none() {
            return;
        }
        let mut position = self.position;
        self.apply_ranges(&mut position);
        if position != self.position {
            self.position = position;
            self.events.push(ViewerEvent::PositionUpdated(position));
        }
    }

    /// Clamp `position` so the edges of the view stay inside the configured ranges.
    pub fn apply_ranges(&self, position: &mut Position) -> Sides {
        let mut sides = Sides::default();

        if let Some((start, end)) = self.limits.longitude_range {
            let span = normalize_angle(end - start);
            let half = self.viewport.hfov / 2.0;

            if span > 0.0 && span <= 2.0 * half {
                position.longitude = normalize_angle(start + span / 2.0);
            } else if span > 0.0 {
                let lo = normalize_angle(start + half);
                let hi = normalize_angle(end - half);
                let lon = position.longitude;
                let inside = if lo <= hi {
                    lon >= lo && lon <= hi
                } else {
                    lon >= lo || lon <= hi
                };

                if !inside {
                    if angular_distance(lon, lo) <= angular_distance(lon, hi) {
                        position.longitude = lo;
                        sides.left = true;
                    } else {
                        position.longitude = hi;
                        sides.right = true;
                    }
                }
            }
        }

        if let Some((min, max)) = self.limits.latitude_range {
            let half = self.viewport.vfov / 2.0;
            let lo = min + half;
            let hi = max - half;

            if lo > hi {
                position.latitude = (min + max) / 2.0;
            } else if position.latitude < lo {
                position.latitude = lo;
                sides.bottom = true;
            } else if position.latitude > hi {
                position.latitude = hi;
                sides.top = true;
            }
        }

        sides
    }

    fn begin_pointer(&mut self, x: f64, y: f64) {
        self.pointer = Some(DVec2::new(x, y));
    }

    /// Longitude/latitude change for the pointer movement since the previous call.
    fn pointer_delta(&mut self, x: f64, y: f64) -> Option<DVec2> {
        let last = self.pointer.replace(DVec2::new(x, y))?;
        let vp = self.viewport;
        if vp.width <= 0.0 || vp.height <= 0.0 {
            return None;
        }
        let speed = self.limits.move_speed;
        Some(DVec2::new(
            -(x - last.x) / vp.width * speed * vp.hfov,
            (y - last.y) / vp.height * speed * vp.vfov,
        ))
    }

    /// Rotate by the pointer movement since the previous call, as a live drag does.
    pub fn drag_to(&mut self, x: f64, y: f64) {
        let Some(delta) = self.pointer_delta(x, y) else {
            return;
        };
        self.rotate(
            Position::new(
                self.position.longitude + delta.x,
                self.position.latitude + delta.y,
            ),
            false,
        );
    }

    /// Drag under gyroscope control: only the heading moves, and it sticks because the
    /// gyroscope offset moves with it.
    fn drag_heading(&mut self, x: f64, y: f64) {
        let Some(delta) = self.pointer_delta(x, y) else {
            return;
        };
        if let Some(offset) = self.gyro_offset.as_mut() {
            *offset += delta.x;
        }
        self.rotate(
            Position::new(self.position.longitude + delta.x, self.position.latitude),
            false,
        );
    }

    pub fn crossfade(&self) -> f64 {
        self.crossfade
    }

    fn apply_values(&mut self, position: Option<Position>, zoom: Option<f64>) {
        if let Some(z) = zoom {
            self.zoom(z);
        }
        if let Some(p) = position {
            self.rotate(p, false);
        }
    }
}

struct Autorotate {
    speed: f64,
    rest_latitude: f64,
    last_frame: Option<f64>,
    cancelled: bool,
}

impl FrameDriver<ViewState> for Autorotate {
    fn tick(&mut self, now: f64, state: &mut ViewState) -> TickOutcome {
        if self.cancelled {
            return TickOutcome::Settled;
        }
        let elapsed = self.last_frame.map_or(0.0, |last| (now - last).max(0.0));
        self.last_frame = Some(now);

        let p = state.position;
        // per-frame decay towards the resting latitude
        let sides = state.rotate(
            Position::new(
                p.longitude + self.speed * elapsed / 1000.0,
                p.latitude - (p.latitude - self.rest_latitude) / 200.0,
            ),
            false,
        );

        if (self.speed > 0.0 && sides.right) || (self.speed < 0.0 && sides.left) {
            self.speed = -self.speed;
        }
        TickOutcome::Continue
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}

struct Gyroscope {
    cancelled: bool,
}

impl FrameDriver<ViewState> for Gyroscope {
    fn tick(&mut self, _now: f64, state: &mut ViewState) -> TickOutcome {
        if self.cancelled {
            return TickOutcome::Settled;
        }
        let Some(orientation) = state.orientation else {
            return TickOutcome::Continue;
        };

        let device = vector3_to_spherical(orientation.direction());
        let current = state.position.longitude;
        let offset = *state.gyro_offset.get_or_insert(current - device.longitude);
        state.rotate(
            Position::new(device.longitude + offset, device.latitude),
            false,
        );
        TickOutcome::Continue
    }

    fn cancel(&mut self) {
        self.cancelled = true;
    }
}

/// Owns the navigation state and the one active navigation driver.
pub struct ViewportController {
    state: ViewState,
    scheduler: AnimationScheduler<ViewState>,
}

impl ViewportController {
    pub fn new(limits: NavigationLimits, width: f64, height: f64) -> Self {
        Self {
            state: ViewState::new(limits, width, height),
            scheduler: AnimationScheduler::new(),
        }
    }

    pub fn position(&self) -> Position {
        self.state.position
    }

    pub fn zoom_level(&self) -> f64 {
        self.state.zoom_level
    }

    pub fn viewport(&self) -> Viewport {
        self.state.viewport
    }

    pub fn limits(&self) -> &NavigationLimits {
        &self.state.limits
    }

    pub fn camera(&self) -> Camera {
        Camera::looking_at(self.state.position, &self.state.viewport)
    }

    pub fn crossfade(&self) -> f64 {
        self.state.crossfade
    }

    pub fn active_driver(&self) -> Option<DriverKind> {
        self.scheduler.active_kind()
    }

    pub fn is_animating(&self) -> bool {
        matches!(
            self.active_driver(),
            Some(DriverKind::Animation | DriverKind::Zoom | DriverKind::Transition)
        )
    }

    pub fn is_autorotating(&self) -> bool {
        self.scheduler.is_active(DriverKind::Autorotate)
    }

    pub fn is_gyroscoping(&self) -> bool {
        self.scheduler.is_active(DriverKind::Gyroscope)
    }

    pub fn rotate(&mut self, position: Position, ignore_range: bool) -> Sides {
        self.state.rotate(position, ignore_range)
    }

    pub fn zoom(&mut self, level: f64) {
        self.state.zoom(level);
    }

    pub fn zoom_in(&mut self) {
        let step = self.state.limits.zoom_speed;
        self.zoom(self.state.zoom_level + step);
    }

    pub fn zoom_out(&mut self) {
        let step = self.state.limits.zoom_speed;
        self.zoom(self.state.zoom_level - step);
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.state.resize(width, height);
    }

    pub fn begin_drag(&mut self, x: f64, y: f64) {
        self.state.begin_pointer(x, y);
    }

    /// While the gyroscope runs, horizontal movement re-aims it and vertical movement
    /// is ignored.
    pub fn drag_to(&mut self, x: f64, y: f64) {
        if self.is_gyroscoping() {
            self.state.drag_heading(x, y);
        } else {
            self.state.drag_to(x, y);
        }
    }

    pub fn update_orientation(&mut self, orientation: DeviceOrientation) {
        self.state.orientation = Some(orientation);
    }

    fn install(&mut self, kind: DriverKind, driver: Box<dyn FrameDriver<ViewState>>) {
        let previous = self.scheduler.start(kind, driver);
        self.note_stopped(previous);
        match kind {
            DriverKind::Autorotate => self.state.events.push(ViewerEvent::AutorotateChanged(true)),
            DriverKind::Gyroscope => self.state.events.push(ViewerEvent::GyroscopeChanged(true)),
            _ => {}
        }
    }

    fn note_stopped(&mut self, kind: Option<DriverKind>) {
        match kind {
            Some(DriverKind::Autorotate) => self.state.events.push(ViewerEvent::AutorotateChanged(false)),
            Some(DriverKind::Gyroscope) => {
                self.state.orientation = None;
                self.state.gyro_offset = None;
                self.state.events.push(ViewerEvent::GyroscopeChanged(false));
            }
            Some(DriverKind::Transition) => self.state.crossfade = 1.0,
            _ => {}
        }
    }

    /// Make `task` the primary driver, cancelling whatever was running.
    pub fn start_task(&mut self, kind: DriverKind, task: AnimationTask<ViewState>) -> TaskHandle {
        let handle = task.handle();
        self.install(kind, Box::new(task));
        handle
    }

    /// Cancel the active driver.
    pub fn stop_all(&mut self) {
        let previous = self.scheduler.stop();
        self.note_stopped(previous);
    }

    /// Rotate (and/or zoom) to `target` along the shortest arc.
    ///
    /// The request is validated before anything is cancelled or moved. When there is
    /// nothing to animate the returned handle is already resolved.
    pub fn animate(
        &mut self,
        target: AnimateTarget,
        speed: impl Into<AnimationSpeed>,
    ) -> Result<TaskHandle> {
        let speed = speed.into();
        let angular_speed = match &speed {
            AnimationSpeed::Speed(s) => Some(parse_speed(s)?),
            AnimationSpeed::Duration(_) => None,
        };

        self.stop_all();

        let current = self.state.position;
        let mut options = AnimationOptions::default().easing(Easing::InOutSine);
        let mut destination = None;
        let mut angle = 0.0;

        if let Some(p) = target
            .position
            .filter(|p| p.longitude.is_finite() && p.latitude.is_finite())
        {
            let mut dest = p.normalized();
            self.state.apply_ranges(&mut dest);
            let delta = shortest_arc(current.longitude, dest.longitude);
            if delta != 0.0 || dest.latitude != current.latitude {
                angle = current.angle_to(&dest);
                options = options
                    .property("longitude", current.longitude, current.longitude + delta)
                    .property("latitude", current.latitude, dest.latitude);
                destination = Some(dest);
            }
        }

        let mut zoom = None;
        if let Some(level) = target.zoom.filter(|z| z.is_finite()) {
            let level = level.clamp(0.0, 100.0);
            if level != self.state.zoom_level {
                options = options.property("zoom", self.state.zoom_level, level);
                zoom = Some(level);
            }
        }

        if destination.is_none() && zoom.is_none() {
            return Ok(TaskHandle::resolved());
        }

        let duration = match (speed, angular_speed) {
            (_, Some(rad_per_s)) => angle / rad_per_s.abs() * 1000.0,
            (AnimationSpeed::Duration(ms), None) => ms,
            (AnimationSpeed::Speed(_), None) => 0.0,
        };

        if !(duration.is_finite() && duration > 0.0) {
            self.state.apply_values(destination, zoom);
            return Ok(TaskHandle::resolved());
        }
        options.duration = duration;

        let kind = if destination.is_some() {
            DriverKind::Animation
        } else {
            DriverKind::Zoom
        };
        let task = AnimationTask::new(options, |state: &mut ViewState, values, _| {
            if let Some(z) = values.get("zoom") {
                state.zoom(z);
            }
            if let (Some(lon), Some(lat)) = (values.get("longitude"), values.get("latitude")) {
                state.rotate(Position::new(lon, lat), false);
            }
        });
        Ok(self.start_task(kind, task))
    }

    /// Cross-fade to a new panorama while moving to `target`.
    pub fn transition(&mut self, target: AnimateTarget, duration: f64) -> TaskHandle {
        self.stop_all();

        let position = target
            .position
            .filter(|p| p.longitude.is_finite() && p.latitude.is_finite());
        let zoom = target.zoom.filter(|z| z.is_finite());

        if !(duration > 0.0) {
            self.state.apply_values(position, zoom);
            return TaskHandle::resolved();
        }

        let current = self.state.position;
        let mut options = AnimationOptions::new(duration)
            .easing(Easing::InOutSine)
            .property("crossfade", 0.0, 1.0);
        if let Some(p) = position {
            let mut dest = p.normalized();
            self.state.apply_ranges(&mut dest);
            let delta = shortest_arc(current.longitude, dest.longitude);
            options = options
                .property("longitude", current.longitude, current.longitude + delta)
                .property("latitude", current.latitude, dest.latitude);
        }
        if let Some(level) = zoom {
            options = options.property("zoom", self.state.zoom_level, level.clamp(0.0, 100.0));
        }

        self.state.crossfade = 0.0;
        let task = AnimationTask::new(options, |state: &mut ViewState, values, _| {
            if let Some(fade) = values.get("crossfade") {
                state.crossfade = fade;
            }
            if let Some(z) = values.get("zoom") {
                state.zoom(z);
            }
            if let (Some(lon), Some(lat)) = (values.get("longitude"), values.get("latitude")) {
                state.rotate(Position::new(lon, lat), false);
            }
        });
        self.start_task(DriverKind::Transition, task)
    }

    pub fn start_autorotate(&mut self) {
        if self.is_autorotating() {
            return;
        }
        let limits = &self.state.limits;
        let driver = Autorotate {
            speed: limits.anim_speed,
            rest_latitude: limits.anim_lat,
            last_frame: None,
            cancelled: false,
        };
        self.install(DriverKind::Autorotate, Box::new(driver));
    }

    pub fn stop_autorotate(&mut self) {
        if self.is_autorotating() {
            self.stop_all();
        }
    }

    pub fn toggle_autorotate(&mut self) {
        if self.is_autorotating() {
            self.stop_autorotate();
        } else {
            self.start_autorotate();
        }
    }

    pub fn start_gyroscope(&mut self, system: &SystemContext) -> Result<()> {
        if !system.device_orientation_supported {
            log::warn!("gyroscope requested but device orientation is not supported");
            return Err(ViewerError::GyroscopeUnavailable);
        }
        if self.is_gyroscoping() {
            return Ok(());
        }
        self.install(
            DriverKind::Gyroscope,
            Box::new(Gyroscope { cancelled: false }),
        );
        Ok(())
    }

    pub fn stop_gyroscope(&mut self) {
        if self.is_gyroscoping() {
            self.stop_all();
        }
    }

    /// Advance the active driver by one frame (`now` in milliseconds).
    pub fn tick(&mut self, now: f64) {
        if let Some(kind) = self.scheduler.tick(now, &mut self.state) {
            log::debug!("navigation driver {:?} finished", kind);
            self.note_stopped(Some(kind));
        }
    }

    pub fn drain_events(&mut self) -> Vec<ViewerEvent> {
        std::mem::take(&mut self.state.events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::animation::TaskState;
    use crate::config::ViewerConfig;
    use crate::units::AngleValue;
    use std::f64::consts::PI;

    fn controller_with(config: ViewerConfig) -> ViewportController {
        ViewportController::new(config.resolve().unwrap(), 800.0, 800.0)
    }

    fn controller() -> ViewportController {
        controller_with(ViewerConfig::default())
    }

    fn deg(d: f64) -> f64 {
        d.to_radians()
    }

    #[test]
    fn zoom_is_clamped() {
        let mut c = controller();
        c.zoom(150.0);
        assert_eq!(c.zoom_level(), 100.0);
        c.zoom(-20.0);
        assert_eq!(c.zoom_level(), 0.0);
        c.zoom(f64::NAN);
        assert_eq!(c.zoom_level(), 0.0);
    }

    #[test]
    fn zoom_maps_linearly_to_vertical_fov() {
        let mut c = controller();
        c.zoom(50.0);
        assert!((c.viewport().vfov_degrees() - 60.0).abs() < 1e-9);
        c.zoom(0.0);
        assert!((c.viewport().vfov_degrees() - 90.0).abs() < 1e-9);
        c.zoom(100.0);
        assert!((c.viewport().vfov_degrees() - 30.0).abs() < 1e-9);
        // square viewport
        assert!((c.viewport().hfov_degrees() - 30.0).abs() < 1e-9);
    }

    #[test]
    fn rotate_normalizes_longitude_and_clamps_latitude() {
        let mut c = controller();
        c.rotate(Position::new(4.0 * PI + 0.5, 0.0), false);
        assert!((c.position().longitude - 0.5).abs() < 1e-12);

        c.rotate(Position::new(-0.5, 3.0), false);
        assert!((c.position().longitude - (TAU - 0.5)).abs() < 1e-12);
        assert_eq!(c.position().latitude, FRAC_PI_2);
    }

    #[test]
    fn shortest_arc_crosses_the_seam() {
        assert!((shortest_arc(TAU - 0.1, 0.1) - 0.2).abs() < 1e-12);
        assert!((shortest_arc(0.1, TAU - 0.1) + 0.2).abs() < 1e-12);
        assert!((shortest_arc(1.0, 2.0) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn animate_takes_the_short_way_round() {
        let mut c = controller();
        c.rotate(Position::new(TAU - 0.1, 0.0), false);
        let handle = c
            .animate(AnimateTarget::position(Position::new(0.1, 0.0)), 1000.0)
            .unwrap();
        assert_eq!(c.active_driver(), Some(DriverKind::Animation));

        c.tick(0.0);
        for t in [100.0, 250.0, 500.0, 750.0, 900.0] {
            c.tick(t);
            let lon = c.position().longitude;
            assert!(lon > TAU - 0.11 || lon < 0.11, "went the long way: {lon}");
        }
        c.tick(1000.0);
        assert!((c.position().longitude - 0.1).abs() < 1e-12);
        assert_eq!(handle.state(), TaskState::Resolved);
        assert_eq!(c.active_driver(), None);
    }

    #[test]
    fn speed_strings_derive_the_duration_from_the_arc() {
        let mut c = controller();
        let handle = c
            .animate(AnimateTarget::position(Position::new(FRAC_PI_2, 0.0)), "1rpm")
            .unwrap();
        // a quarter turn at one turn per minute
        c.tick(0.0);
        c.tick(14_990.0);
        assert_eq!(handle.state(), TaskState::Running);
        c.tick(15_001.0);
        assert_eq!(handle.state(), TaskState::Resolved);
        assert!((c.position().longitude - FRAC_PI_2).abs() < 1e-12);
    }

    #[test]
    fn bad_speed_changes_nothing() {
        let mut c = controller();
        c.start_autorotate();
        let before = c.position();
        let err = c
            .animate(AnimateTarget::position(Position::new(1.0, 0.2)), "3 laps")
            .unwrap_err();
        assert_eq!(err, ViewerError::UnknownSpeedUnit("laps".into()));
        assert!(c.is_autorotating());
        assert_eq!(c.position(), before);
    }

    #[test]
    fn animate_without_delta_resolves_immediately() {
        let mut c = controller();
        c.start_autorotate();
        let handle = c.animate(AnimateTarget::position(c.position()), 500.0).unwrap();
        assert_eq!(handle.state(), TaskState::Resolved);
        assert_eq!(c.active_driver(), None);
    }

    #[test]
    fn zoom_only_animation() {
        let mut c = controller();
        let handle = c.animate(AnimateTarget::zoom(80.0), 200.0).unwrap();
        assert_eq!(c.active_driver(), Some(DriverKind::Zoom));
        c.tick(0.0);
        c.tick(100.0);
        assert!(c.zoom_level() > 50.0 && c.zoom_level() < 80.0);
        c.tick(200.0);
        assert_eq!(c.zoom_level(), 80.0);
        assert!(handle.is_settled());
    }

    #[test]
    fn new_animation_cancels_the_previous_one() {
        let mut c = controller();
        let first = c
            .animate(AnimateTarget::position(Position::new(1.0, 0.0)), 1000.0)
            .unwrap();
        c.tick(0.0);
        c.tick(100.0);
        let second = c
            .animate(AnimateTarget::position(Position::new(2.0, 0.0)), 1000.0)
            .unwrap();
        assert_eq!(first.state(), TaskState::Cancelled);
        c.tick(200.0);
        c.tick(1200.0);
        assert_eq!(second.state(), TaskState::Resolved);
        assert!((c.position().longitude - 2.0).abs() < 1e-12);
    }

    #[test]
    fn autorotate_advances_and_eases_latitude() {
        let mut c = controller();
        c.rotate(Position::new(0.0, 0.5), false);
        c.start_autorotate();
        let events = c.drain_events();
        assert!(events.contains(&ViewerEvent::AutorotateChanged(true)));

        c.tick(0.0);
        let lat = 0.5 - 0.5 / 200.0;
        assert!((c.position().latitude - lat).abs() < 1e-12);
        assert_eq!(c.position().longitude, 0.0);

        c.tick(1000.0);
        let speed = 2.0 * TAU / 60.0;
        assert!((c.position().longitude - speed).abs() < 1e-12);
        assert!((c.position().latitude - (lat - lat / 200.0)).abs() < 1e-12);

        c.stop_autorotate();
        assert!(!c.is_autorotating());
        assert!(c.drain_events().contains(&ViewerEvent::AutorotateChanged(false)));
    }

    #[test]
    fn autorotate_reverses_at_the_longitude_bound() {
        let mut c = controller_with(ViewerConfig {
            longitude_range: Some([AngleValue::from("-60deg"), AngleValue::from("60deg")]),
            anim_speed: "1rps".into(),
            ..Default::default()
        });
        c.zoom(100.0); // 30° square view
        c.start_autorotate();
        c.tick(0.0);
        c.tick(200.0); // 72°, past the right bound
        assert!((c.position().longitude - deg(45.0)).abs() < 1e-9);
        assert!(c
            .drain_events()
            .iter()
            .any(|e| matches!(e, ViewerEvent::SidesReached(s) if s.right)));

        c.tick(210.0);
        // now heading back towards the left bound
        assert!(c.position().longitude < deg(45.0));
    }

    #[test]
    fn ranges_crossing_zero_snap_to_the_closer_bound() {
        let c = controller_with(ViewerConfig {
            longitude_range: Some([AngleValue::from("300deg"), AngleValue::from("60deg")]),
            min_fov: 30.0,
            default_zoom_lvl: 100.0,
            ..Default::default()
        });
        let mut p = Position::new(deg(100.0), 0.0);
        let sides = c.state.apply_ranges(&mut p);
        assert!(sides.right && !sides.left);
        assert!((p.longitude - deg(45.0)).abs() < 1e-9);

        let mut p = Position::new(deg(250.0), 0.0);
        let sides = c.state.apply_ranges(&mut p);
        assert!(sides.left);
        assert!((p.longitude - deg(315.0)).abs() < 1e-9);

        let mut p = Position::new(deg(5.0), 0.0);
        assert!(!c.state.apply_ranges(&mut p).any());
        assert!((p.longitude - deg(5.0)).abs() < 1e-12);
    }

    #[test]
    fn plain_range_snaps_across_the_seam_when_closer() {
        let c = controller_with(ViewerConfig {
            longitude_range: Some([AngleValue::from("100deg"), AngleValue::from("200deg")]),
            default_long: AngleValue::from("150deg"),
            default_zoom_lvl: 100.0,
            ..Default::default()
        });
        let mut p = Position::new(deg(350.0), 0.0);
        let sides = c.state.apply_ranges(&mut p);
        assert!(sides.left);
        assert!((p.longitude - deg(115.0)).abs() < 1e-9);
    }

    #[test]
    fn narrow_ranges_pin_to_their_centre() {
        let c = controller_with(ViewerConfig {
            longitude_range: Some([AngleValue::from("10deg"), AngleValue::from("20deg")]),
            latitude_range: Some([AngleValue::from("-5deg"), AngleValue::from("15deg")]),
            ..Default::default()
        });
        assert!((c.position().longitude - deg(15.0)).abs() < 1e-9);
        assert!((c.position().latitude - deg(5.0)).abs() < 1e-9);
    }

    #[test]
    fn latitude_range_reports_top_and_bottom() {
        let mut c = controller_with(ViewerConfig {
            latitude_range: Some([AngleValue::from("-60deg"), AngleValue::from("60deg")]),
            default_zoom_lvl: 100.0,
            ..Default::default()
        });
        let sides = c.rotate(Position::new(0.0, deg(80.0)), false);
        assert!(sides.top);
        assert!((c.position().latitude - deg(45.0)).abs() < 1e-9);

        let sides = c.rotate(Position::new(0.0, deg(-80.0)), true);
        assert!(!sides.any());
        assert!((c.position().latitude - deg(-80.0)).abs() < 1e-9);
    }

    #[test]
    fn dragging_moves_the_view_with_the_pointer() {
        let mut c = controller();
        let hfov = c.viewport().hfov;
        let vfov = c.viewport().vfov;
        c.begin_drag(400.0, 400.0);
        c.drag_to(480.0, 400.0);
        assert!((c.position().longitude - (TAU - hfov / 10.0)).abs() < 1e-12);
        c.drag_to(480.0, 440.0);
        assert!((c.position().latitude - vfov / 20.0).abs() < 1e-12);
    }

    #[test]
    fn gyroscope_needs_device_support() {
        let mut c = controller();
        assert_eq!(
            c.start_gyroscope(&SystemContext::default()),
            Err(ViewerError::GyroscopeUnavailable)
        );
        assert!(!c.is_gyroscoping());
    }

    #[test]
    fn gyroscope_follows_the_device() {
        let mut c = controller();
        c.rotate(Position::new(1.0, 0.0), false);
        let system = SystemContext::default().with_device_orientation(true);
        c.start_gyroscope(&system).unwrap();

        // upright device: looking at the horizon, aligned with the current longitude
        c.update_orientation(DeviceOrientation::new(0.0, 90.0, 0.0));
        c.tick(0.0);
        assert!((c.position().longitude - 1.0).abs() < 1e-9);
        assert!(c.position().latitude.abs() < 1e-9);

        // turning the device by 10° turns the view by 10°
        c.update_orientation(DeviceOrientation::new(10.0, 90.0, 0.0));
        c.tick(16.0);
        assert!((angular_distance(c.position().longitude, 1.0) - deg(10.0)).abs() < 1e-9);

        c.start_autorotate();
        assert!(!c.is_gyroscoping());
        assert!(c.drain_events().contains(&ViewerEvent::GyroscopeChanged(false)));
    }

    #[test]
    fn transition_cross_fades_and_moves() {
        let mut c = controller();
        let handle = c.transition(AnimateTarget::position(Position::new(1.0, 0.0)), 1000.0);
        assert_eq!(c.crossfade(), 0.0);
        c.tick(0.0);
        c.tick(500.0);
        assert!(c.crossfade() > 0.0 && c.crossfade() < 1.0);
        c.tick(1000.0);
        assert_eq!(c.crossfade(), 1.0);
        assert!((c.position().longitude - 1.0).abs() < 1e-12);
        assert!(handle.is_settled());
    }

    #[test]
    fn interrupted_transition_restores_full_opacity() {
        let mut c = controller();
        c.transition(AnimateTarget::default(), 1000.0);
        c.tick(0.0);
        c.stop_all();
        assert_eq!(c.crossfade(), 1.0);
    }
}
