// viewer.rs — the facade a host drives: input primitives in, render state and events out

use glam::{DVec2, DVec3};

use crate::animation::{DriverKind, TaskHandle};
use crate::camera::{Camera, Viewport};
use crate::config::{NavigationLimits, ViewerConfig};
use crate::coords::{
    self, spherical_to_vector3, vector3_to_spherical, PanoramaKind, Position, TexturePoint,
    SPHERE_RADIUS,
};
use crate::error::{Result, ViewerError};
use crate::events::{ClickData, EventBus, EventKind, ListenerId, ViewerEvent};
use crate::inertia::InertiaController;
use crate::markers::visibility::{MarkerProjection, MarkerVisibilityEngine};
use crate::markers::{
    Hideable, Marker, MarkerConfig, MarkerMeasure, MarkerRegistry, MarkerUpdate, TextMeasure,
};
use crate::mesh::{build_sphere, SphereMesh};
use crate::system::SystemContext;
use crate::viewport::{
    AnimateTarget, AnimationSpeed, DeviceOrientation, Sides, ViewportController,
};

/// A pointer that moved less than this between press and release clicked.
pub const MOVE_THRESHOLD: f64 = 4.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyNav {
    Up,
    Down,
    Left,
    Right,
    ZoomIn,
    ZoomOut,
}

/// How a new panorama is brought in.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PanoramaOptions {
    pub position: Option<Position>,
    pub zoom: Option<f64>,
    /// Cross-fade from the previous panorama.
    pub transition: bool,
}

impl Default for PanoramaOptions {
    fn default() -> Self {
        Self {
            position: None,
            zoom: None,
            transition: true,
        }
    }
}

/// What the renderer needs for one frame.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderState {
    pub direction: DVec3,
    pub up: DVec3,
    pub vfov: f64,
    pub aspect: f64,
    /// 0 shows the previous panorama, 1 the current one.
    pub crossfade: f64,
}

#[derive(Debug, Clone, Copy)]
struct Drag {
    start: DVec2,
}

pub struct Viewer {
    config: ViewerConfig,
    system: SystemContext,
    controller: ViewportController,
    inertia: InertiaController,
    markers: MarkerRegistry,
    visibility: MarkerVisibilityEngine,
    measure: Box<dyn MarkerMeasure>,
    mesh: SphereMesh,
    panorama: Option<PanoramaKind>,
    bus: EventBus,
    pending: Vec<ViewerEvent>,
    drag: Option<Drag>,
    last_interaction: Option<f64>,
    clock: f64,
}

impl Viewer {
    pub fn new(config: ViewerConfig, system: SystemContext, width: f64, height: f64) -> Result<Self> {
        let limits = config.resolve()?;
        let segments = config.sphere_segments;
        let mesh = build_sphere(SPHERE_RADIUS, segments.height, segments.width);
        log::info!(
            "viewer {}x{} (pixel ratio {}), fov {}..{}°",
            width,
            height,
            system.pixel_ratio,
            config.min_fov,
            config.max_fov
        );

        let mut markers = MarkerRegistry::new();
        for marker in &config.markers {
            markers.add(marker.clone(), None)?;
        }

        Ok(Self {
            controller: ViewportController::new(limits, width, height),
            config,
            system,
            inertia: InertiaController::new(),
            markers,
            visibility: MarkerVisibilityEngine::new(),
            measure: Box::new(TextMeasure::default()),
            mesh,
            panorama: None,
            bus: EventBus::new(),
            pending: Vec::new(),
            drag: None,
            last_interaction: None,
            clock: 0.0,
        })
    }

    /// Replace the estimate used to size markers without explicit width/height.
    pub fn with_measure(mut self, measure: impl MarkerMeasure + 'static) -> Self {
        self.measure = Box::new(measure);
        self
    }

    pub fn config(&self) -> &ViewerConfig {
        &self.config
    }

    pub fn system(&self) -> &SystemContext {
        &self.system
    }

    pub fn position(&self) -> Position {
        self.controller.position()
    }

    pub fn zoom_level(&self) -> f64 {
        self.controller.zoom_level()
    }

    pub fn viewport(&self) -> Viewport {
        self.controller.viewport()
    }

    pub fn camera(&self) -> Camera {
        self.controller.camera()
    }

    pub fn limits(&self) -> &NavigationLimits {
        self.controller.limits()
    }

    pub fn panorama(&self) -> Option<&PanoramaKind> {
        self.panorama.as_ref()
    }

    pub fn active_driver(&self) -> Option<DriverKind> {
        self.controller.active_driver()
    }

    pub fn is_autorotating(&self) -> bool {
        self.controller.is_autorotating()
    }

    pub fn is_gyroscoping(&self) -> bool {
        self.controller.is_gyroscoping()
    }

    pub fn render_state(&self) -> RenderState {
        let camera = self.camera();
        RenderState {
            direction: camera.direction,
            up: camera.up,
            vfov: camera.vfov,
            aspect: camera.aspect,
            crossfade: self.controller.crossfade(),
        }
    }

    // events

    pub fn on(&mut self, kind: EventKind, listener: impl FnMut(&ViewerEvent) + 'static) -> ListenerId {
        self.bus.on(kind, listener)
    }

    pub fn on_any(&mut self, listener: impl FnMut(&ViewerEvent) + 'static) -> ListenerId {
        self.bus.on_any(listener)
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        self.bus.off(id)
    }

    fn flush(&mut self) {
        let mut events = self.controller.drain_events();
        events.append(&mut self.pending);
        for event in &events {
            self.bus.dispatch(event);
        }
    }

    // panorama lifecycle

    /// Show a new panorama. The position/zoom are applied through a cross-fade when
    /// a panorama was already displayed and the transition is enabled.
    pub fn set_panorama(&mut self, kind: PanoramaKind, options: PanoramaOptions) -> TaskHandle {
        let duration = if options.transition && self.panorama.is_some() {
            self.config.transition.duration
        } else {
            0.0
        };
        log::info!("panorama set: {:?}", kind);

        self.panorama = Some(kind);
        self.markers.relocate(self.panorama.as_ref());

        let target = AnimateTarget {
            position: options.position,
            zoom: options.zoom,
        };
        let handle = self.controller.transition(target, duration);
        self.last_interaction = Some(self.clock);
        self.pending.push(ViewerEvent::PanoramaLoaded);
        self.render_markers();
        handle
    }

    /// Report a loader failure; navigation state is left untouched.
    pub fn panorama_load_failed(&mut self, message: impl Into<String>) {
        let message = message.into();
        log::warn!("panorama failed to load: {}", message);
        self.pending.push(ViewerEvent::PanoramaLoadFailed(message));
        self.flush();
    }

    /// Advance one frame (`now` in milliseconds).
    pub fn tick(&mut self, now: f64) {
        self.clock = now;

        if let (Some(delay), Some(since)) = (self.config.time_anim, self.last_interaction) {
            let idle = self.panorama.is_some()
                && self.drag.is_none()
                && self.controller.active_driver().is_none();
            if idle && now - since >= delay as f64 {
                log::debug!("idle for {}ms, starting autorotate", delay);
                self.controller.start_autorotate();
                self.last_interaction = None;
            }
        }

        self.controller.tick(now);
        self.render_markers();
    }

    // navigation

    /// Look at `position`; `ignore_range` skips the longitude/latitude ranges.
    pub fn rotate(&mut self, position: Position, ignore_range: bool) -> Sides {
        let sides = self.controller.rotate(position, ignore_range);
        self.render_markers();
        sides
    }

    pub fn zoom(&mut self, level: f64) {
        self.controller.zoom(level);
        self.render_markers();
    }

    pub fn zoom_in(&mut self) {
        self.controller.zoom_in();
        self.render_markers();
    }

    pub fn zoom_out(&mut self) {
        self.controller.zoom_out();
        self.render_markers();
    }

    pub fn animate(
        &mut self,
        target: AnimateTarget,
        speed: impl Into<AnimationSpeed>,
    ) -> Result<TaskHandle> {
        let handle = self.controller.animate(target, speed)?;
        // idle time counts from the last requested move
        self.last_interaction = Some(self.clock);
        self.render_markers();
        Ok(handle)
    }

    pub fn resize(&mut self, width: f64, height: f64) {
        self.controller.resize(width, height);
        self.render_markers();
    }

    pub fn stop_all(&mut self) {
        self.controller.stop_all();
        self.flush();
    }

    pub fn start_autorotate(&mut self) {
        self.controller.start_autorotate();
        self.flush();
    }

    pub fn stop_autorotate(&mut self) {
        self.controller.stop_autorotate();
        self.flush();
    }

    pub fn toggle_autorotate(&mut self) {
        self.controller.toggle_autorotate();
        self.flush();
    }

    pub fn start_gyroscope(&mut self) -> Result<()> {
        self.controller.start_gyroscope(&self.system)?;
        self.flush();
        Ok(())
    }

    pub fn stop_gyroscope(&mut self) {
        self.controller.stop_gyroscope();
        self.flush();
    }

    pub fn update_orientation(&mut self, orientation: DeviceOrientation) {
        self.controller.update_orientation(orientation);
    }

    // input primitives

    // user input stops autorotate and animations; the gyroscope keeps running and a
    // drag re-aims it instead
    fn interrupt(&mut self, now: f64) {
        self.last_interaction = Some(now);
        if !self.controller.is_gyroscoping() {
            self.controller.stop_all();
        }
    }

    pub fn start_drag(&mut self, now: f64, x: f64, y: f64) {
        self.interrupt(now);
        self.drag = Some(Drag {
            start: DVec2::new(x, y),
        });
        self.controller.begin_drag(x, y);
        self.inertia.start(now, x, y);
        self.flush();
    }

    pub fn drag(&mut self, now: f64, x: f64, y: f64) {
        if self.drag.is_none() {
            return;
        }
        self.last_interaction = Some(now);
        if self.config.mousemove {
            self.controller.drag_to(x, y);
        }
        self.inertia.record(now, x, y);
        self.render_markers();
    }

    pub fn end_drag(&mut self, now: f64, x: f64, y: f64) {
        let Some(drag) = self.drag.take() else {
            return;
        };
        self.last_interaction = Some(now);
        let point = DVec2::new(x, y);

        if point.distance(drag.start) < MOVE_THRESHOLD {
            self.inertia.clear();
            self.click(x, y);
            return;
        }

        if self.config.mousemove {
            self.controller.drag_to(x, y);
        }
        if self.config.mousemove && self.config.move_inertia && !self.controller.is_gyroscoping() {
            let task = self.inertia.release(now, x, y);
            self.controller.start_task(DriverKind::Inertia, task);
        } else {
            self.inertia.clear();
        }
        self.render_markers();
    }

    /// Treat a viewer point as clicked: resolves the sphere position, texture pixel and
    /// marker under it.
    pub fn click(&mut self, x: f64, y: f64) -> ClickData {
        let point = DVec2::new(x, y);
        let position = self.viewer_coords_to_spherical(point);
        let texture = match (&self.panorama, position) {
            (Some(panorama @ PanoramaKind::Equirectangular(_)), Some(position)) => {
                coords::spherical_to_texture(panorama, position).ok()
            }
            _ => None,
        };
        let marker = self.visibility.hit_test(&self.markers, point);

        let data = ClickData {
            point,
            position,
            texture,
            marker: marker.clone(),
        };
        self.pending.push(ViewerEvent::Click(data.clone()));
        if let Some(id) = marker {
            self.pending.push(ViewerEvent::MarkerSelected(id));
        }
        self.flush();
        data
    }

    /// `distance_delta` is the change of the distance between the two touches, in pixels.
    pub fn pinch(&mut self, now: f64, distance_delta: f64) {
        self.interrupt(now);
        let width = self.viewport().width.max(1.0);
        let level = self.zoom_level() + 80.0 * distance_delta / width;
        self.controller.zoom(level);
        self.render_markers();
    }

    /// Positive `delta` zooms out.
    pub fn wheel(&mut self, now: f64, delta: f64) {
        if !self.config.mousewheel || delta == 0.0 || !delta.is_finite() {
            return;
        }
        self.interrupt(now);
        let limits = self.controller.limits();
        let step = delta.clamp(-1.0, 1.0) * limits.zoom_speed * limits.mousewheel_factor;
        self.controller.zoom(self.zoom_level() - step);
        self.render_markers();
    }

    pub fn key_nav(&mut self, now: f64, key: KeyNav) {
        self.interrupt(now);
        let viewport = self.viewport();
        let speed = self.controller.limits().move_speed;
        let h_step = 0.01 * speed * viewport.hfov_degrees();
        let v_step = 0.01 * speed * viewport.vfov_degrees();
        let p = self.position();

        match key {
            KeyNav::Left => {
                self.controller
                    .rotate(Position::new(p.longitude - h_step, p.latitude), false);
            }
            KeyNav::Right => {
                self.controller
                    .rotate(Position::new(p.longitude + h_step, p.latitude), false);
            }
            KeyNav::Up => {
                self.controller
                    .rotate(Position::new(p.longitude, p.latitude + v_step), false);
            }
            KeyNav::Down => {
                self.controller
                    .rotate(Position::new(p.longitude, p.latitude - v_step), false);
            }
            KeyNav::ZoomIn => self.controller.zoom_in(),
            KeyNav::ZoomOut => self.controller.zoom_out(),
        }
        self.render_markers();
    }

    // markers

    /// Re-project every marker and dispatch the queued events.
    pub fn render_markers(&mut self) {
        let camera = self.controller.camera();
        let changes = self.visibility.update(
            &self.markers,
            &camera,
            self.measure.as_ref(),
            self.system.pixel_ratio,
        );
        self.pending.extend(changes);
        self.flush();
    }

    fn after_marker_change(&mut self, render: bool) {
        if render {
            self.render_markers();
        } else {
            self.flush();
        }
    }

    pub fn add_marker(&mut self, config: MarkerConfig, render: bool) -> Result<()> {
        let id = self.markers.add(config, self.panorama.as_ref())?.id().to_string();
        self.pending.push(ViewerEvent::MarkerAdded(id));
        self.after_marker_change(render);
        Ok(())
    }

    pub fn remove_marker(&mut self, id: &str, render: bool) -> Result<()> {
        self.markers.remove(id)?;
        self.visibility.forget(id);
        self.pending.push(ViewerEvent::MarkerRemoved(id.to_string()));
        self.after_marker_change(render);
        Ok(())
    }

    pub fn update_marker(&mut self, id: &str, update: MarkerUpdate, render: bool) -> Result<()> {
        self.markers.update(id, update, self.panorama.as_ref())?;
        self.after_marker_change(render);
        Ok(())
    }

    pub fn get_marker(&self, id: &str) -> Result<&Marker> {
        self.markers.get(id)
    }

    pub fn markers(&self) -> impl DoubleEndedIterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn marker_projection(&self, id: &str) -> Option<&MarkerProjection> {
        self.visibility.projection(id)
    }

    /// Top-most visible marker under a viewer pixel.
    pub fn marker_at(&self, x: f64, y: f64) -> Option<String> {
        self.visibility.hit_test(&self.markers, DVec2::new(x, y))
    }

    /// Animate back to the configured default position and zoom.
    pub fn reset_view(&mut self, speed: impl Into<AnimationSpeed>) -> Result<TaskHandle> {
        let limits = self.controller.limits();
        let target = AnimateTarget::position(limits.default_position).with_zoom(limits.default_zoom);
        self.animate(target, speed)
    }

    pub fn show_marker(&mut self, id: &str, render: bool) -> Result<()> {
        self.markers.get_mut(id)?.show();
        self.after_marker_change(render);
        Ok(())
    }

    pub fn hide_marker(&mut self, id: &str, render: bool) -> Result<()> {
        self.markers.get_mut(id)?.hide();
        self.after_marker_change(render);
        Ok(())
    }

    pub fn toggle_marker(&mut self, id: &str, render: bool) -> Result<()> {
        self.markers.get_mut(id)?.toggle();
        self.after_marker_change(render);
        Ok(())
    }

    pub fn clear_markers(&mut self, render: bool) {
        for id in self.markers.clear() {
            self.visibility.forget(&id);
            self.pending.push(ViewerEvent::MarkerRemoved(id));
        }
        self.after_marker_change(render);
    }

    /// Animate to a marker's (first) position.
    pub fn go_to_marker(&mut self, id: &str, speed: impl Into<AnimationSpeed>) -> Result<TaskHandle> {
        let position = *self
            .markers
            .get(id)?
            .positions()
            .first()
            .ok_or_else(|| ViewerError::MissingMarkerPosition(id.to_string()))?;
        self.animate(AnimateTarget::position(position), speed)
    }

    // coordinate helpers bound to the current panorama and camera

    pub fn texture_to_spherical(&self, point: TexturePoint) -> Result<Position> {
        let panorama = self.panorama.as_ref().ok_or(ViewerError::NoPanorama)?;
        coords::texture_to_spherical(panorama, point)
    }

    pub fn spherical_to_texture(&self, position: Position) -> Result<TexturePoint> {
        let panorama = self.panorama.as_ref().ok_or(ViewerError::NoPanorama)?;
        coords::spherical_to_texture(panorama, position)
    }

    pub fn viewer_coords_to_spherical(&self, point: DVec2) -> Option<Position> {
        coords::viewer_coords_to_vector3(point, &self.camera(), &self.mesh).map(vector3_to_spherical)
    }

    /// Viewer pixel of a sphere position, `None` when it is behind the camera.
    pub fn spherical_to_viewer_coords(&self, position: Position) -> Option<DVec2> {
        let camera = self.camera();
        let v = spherical_to_vector3(position);
        (v.dot(camera.direction) > 0.0).then(|| coords::vector3_to_viewer_coords(v, &camera))
    }
}
