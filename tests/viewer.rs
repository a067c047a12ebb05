use std::cell::RefCell;
use std::f64::consts::{PI, TAU};
use std::rc::Rc;

use panosphere::markers::Placement;
use panosphere::units::AngleValue;
use panosphere::{
    AnimateTarget, DeviceOrientation, DriverKind, MarkerConfig, MarkerKind, PanoData, PanoramaKind, PanoramaOptions,
    Position, SystemContext, TaskState, TexturePoint, Viewer, ViewerConfig, ViewerError,
    ViewerEvent,
};

fn viewer_with(config: ViewerConfig) -> Viewer {
    Viewer::new(config, SystemContext::default(), 800.0, 800.0).unwrap()
}

fn quiet_config() -> ViewerConfig {
    ViewerConfig {
        time_anim: None,
        ..Default::default()
    }
}

fn record(viewer: &mut Viewer) -> Rc<RefCell<Vec<ViewerEvent>>> {
    let events = Rc::new(RefCell::new(Vec::new()));
    let sink = events.clone();
    viewer.on_any(move |event| sink.borrow_mut().push(event.clone()));
    events
}

fn equirectangular() -> PanoramaKind {
    PanoramaKind::Equirectangular(PanoData::full(4000.0, 2000.0))
}

fn html_marker(id: &str, longitude: f64, latitude: f64) -> MarkerConfig {
    MarkerConfig::new(
        id,
        MarkerKind::Html {
            html: id.to_uppercase(),
            position: Some(Placement::Spherical(Position::new(longitude, latitude))),
        },
    )
    .with_size(40.0, 20.0)
}

#[test]
fn drag_release_hands_over_to_inertia() {
    let mut viewer = viewer_with(quiet_config());
    let hfov = viewer.viewport().hfov;

    viewer.start_drag(0.0, 400.0, 400.0);
    viewer.drag(10.0, 420.0, 400.0);
    viewer.drag(20.0, 440.0, 400.0);
    viewer.end_drag(30.0, 460.0, 400.0);

    let released = viewer.position().longitude;
    assert!((released - (TAU - 60.0 / 800.0 * hfov)).abs() < 1e-9);
    assert_eq!(viewer.active_driver(), Some(DriverKind::Inertia));

    viewer.tick(30.0);
    viewer.tick(300.0);
    assert_eq!(viewer.active_driver(), None);
    let settled = viewer.position().longitude;
    assert!((settled - (TAU - 120.0 / 800.0 * hfov)).abs() < 1e-9);
}

#[test]
fn inertia_can_be_disabled() {
    let mut viewer = viewer_with(ViewerConfig {
        move_inertia: false,
        ..quiet_config()
    });
    viewer.start_drag(0.0, 400.0, 400.0);
    viewer.drag(10.0, 450.0, 400.0);
    viewer.end_drag(20.0, 500.0, 400.0);
    assert_eq!(viewer.active_driver(), None);
}

#[test]
fn short_press_clicks_the_marker_under_it() {
    let mut viewer = viewer_with(quiet_config());
    viewer.add_marker(html_marker("door", 0.0, 0.0), true).unwrap();
    let events = record(&mut viewer);

    viewer.start_drag(0.0, 400.0, 400.0);
    viewer.end_drag(50.0, 401.0, 400.0);

    let events = events.borrow();
    let click = events.iter().find_map(|e| match e {
        ViewerEvent::Click(data) => Some(data.clone()),
        _ => None,
    });
    let click = click.expect("click event");
    assert_eq!(click.marker.as_deref(), Some("door"));
    assert!(click.position.is_some());
    assert_eq!(click.texture, None);
    assert!(events.contains(&ViewerEvent::MarkerSelected("door".into())));
    assert_eq!(viewer.position(), Position::new(0.0, 0.0));
}

#[test]
fn marker_visibility_follows_the_camera() {
    let mut viewer = viewer_with(quiet_config());
    let events = record(&mut viewer);

    viewer.add_marker(html_marker("door", 0.0, 0.0), true).unwrap();
    assert!(viewer.marker_projection("door").is_some_and(|p| p.visible));
    assert_eq!(viewer.marker_at(400.0, 400.0).as_deref(), Some("door"));

    viewer.rotate(Position::new(PI, 0.0), false);
    assert!(!viewer.marker_projection("door").unwrap().visible);
    assert_eq!(viewer.marker_at(400.0, 400.0), None);

    viewer.hide_marker("door", true).unwrap();
    viewer.rotate(Position::new(0.0, 0.0), false);
    assert!(!viewer.marker_projection("door").unwrap().visible);

    let changes: Vec<_> = events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            ViewerEvent::MarkerVisibilityChanged { visible, .. } => Some(*visible),
            _ => None,
        })
        .collect();
    assert_eq!(changes, vec![true, false]);
}

#[test]
fn marker_registry_errors_leave_markers_untouched() {
    let mut viewer = viewer_with(quiet_config());
    viewer.add_marker(html_marker("door", 0.0, 0.0), false).unwrap();

    assert_eq!(
        viewer.add_marker(html_marker("door", 1.0, 0.0), false),
        Err(ViewerError::DuplicateMarker("door".into()))
    );
    assert_eq!(
        viewer.remove_marker("window", false),
        Err(ViewerError::UnknownMarker("window".into()))
    );
    assert_eq!(viewer.markers().count(), 1);

    viewer.clear_markers(false);
    assert_eq!(viewer.markers().count(), 0);
}

#[test]
fn texture_markers_need_a_panorama() {
    let mut viewer = viewer_with(quiet_config());
    let marker = MarkerConfig::new(
        "sign",
        MarkerKind::Html {
            html: "Sign".into(),
            position: Some(Placement::Texture(TexturePoint::new(2000.0, 1000.0))),
        },
    );
    assert_eq!(
        viewer.add_marker(marker.clone(), true),
        Err(ViewerError::NoPanorama)
    );

    viewer.set_panorama(equirectangular(), PanoramaOptions::default());
    viewer.add_marker(marker, true).unwrap();
    let position = viewer.get_marker("sign").unwrap().positions()[0];
    assert!(position.angle_to(&Position::new(0.0, 0.0)) < 1e-9);

    let center = viewer.spherical_to_viewer_coords(position).unwrap();
    assert!((center.x - 400.0).abs() < 1e-6 && (center.y - 400.0).abs() < 1e-6);
    assert_eq!(viewer.spherical_to_viewer_coords(Position::new(PI, 0.0)), None);
}

#[test]
fn idle_viewer_starts_autorotate() {
    let mut viewer = viewer_with(ViewerConfig {
        time_anim: Some(1000),
        ..Default::default()
    });
    let events = record(&mut viewer);

    viewer.set_panorama(equirectangular(), PanoramaOptions::default());
    viewer.tick(500.0);
    assert!(!viewer.is_autorotating());
    viewer.tick(1000.0);
    assert!(viewer.is_autorotating());

    // a click is an interaction too
    viewer.start_drag(1100.0, 10.0, 10.0);
    assert!(!viewer.is_autorotating());
    viewer.end_drag(1200.0, 10.0, 10.0);

    viewer.tick(2100.0);
    assert!(!viewer.is_autorotating());
    viewer.tick(2300.0);
    assert!(viewer.is_autorotating());

    let toggles: Vec<_> = events
        .borrow()
        .iter()
        .filter_map(|e| match e {
            ViewerEvent::AutorotateChanged(on) => Some(*on),
            _ => None,
        })
        .collect();
    assert_eq!(toggles, vec![true, false, true]);
}

#[test]
fn second_panorama_cross_fades() {
    let mut viewer = viewer_with(quiet_config());

    let first = viewer.set_panorama(equirectangular(), PanoramaOptions::default());
    assert_eq!(first.state(), TaskState::Resolved);
    assert_eq!(viewer.render_state().crossfade, 1.0);

    let options = PanoramaOptions {
        position: Some(Position::new(1.0, 0.0)),
        ..Default::default()
    };
    let handle = viewer.set_panorama(equirectangular(), options);
    assert_eq!(viewer.active_driver(), Some(DriverKind::Transition));
    assert_eq!(viewer.render_state().crossfade, 0.0);

    viewer.tick(100.0);
    viewer.tick(850.0);
    let fade = viewer.render_state().crossfade;
    assert!(fade > 0.0 && fade < 1.0);

    viewer.tick(1700.0);
    assert_eq!(handle.state(), TaskState::Resolved);
    assert_eq!(viewer.render_state().crossfade, 1.0);
    assert!((viewer.position().longitude - 1.0).abs() < 1e-9);
}

#[test]
fn interrupted_transition_shows_the_new_panorama() {
    let mut viewer = viewer_with(quiet_config());
    viewer.set_panorama(equirectangular(), PanoramaOptions::default());
    let handle = viewer.set_panorama(equirectangular(), PanoramaOptions::default());
    viewer.tick(10.0);

    viewer.start_drag(20.0, 100.0, 100.0);
    assert_eq!(handle.state(), TaskState::Cancelled);
    assert_eq!(viewer.render_state().crossfade, 1.0);
}

#[test]
fn load_failure_keeps_the_current_view() {
    let mut viewer = viewer_with(quiet_config());
    viewer.rotate(Position::new(1.0, 0.5), false);
    let events = record(&mut viewer);

    viewer.panorama_load_failed("truncated file");

    assert_eq!(viewer.position(), Position::new(1.0, 0.5));
    assert!(viewer.panorama().is_none());
    assert_eq!(
        *events.borrow(),
        vec![ViewerEvent::PanoramaLoadFailed("truncated file".into())]
    );
}

#[test]
fn invalid_configuration_is_rejected() {
    let inverted = ViewerConfig {
        min_fov: 120.0,
        max_fov: 60.0,
        ..Default::default()
    };
    assert_eq!(
        Viewer::new(inverted, SystemContext::default(), 800.0, 600.0).err(),
        Some(ViewerError::InvalidFovRange { min: 120.0, max: 60.0 })
    );

    let config = ViewerConfig::from_json_str(
        r#"{ "markers": [ { "id": "roof", "type": "polygon", "points": [
            { "longitude": 0.1, "latitude": 0.3 }, { "longitude": 0.4, "latitude": 0.3 }
        ] } ] }"#,
    )
    .unwrap();
    assert_eq!(
        Viewer::new(config, SystemContext::default(), 800.0, 600.0).err(),
        Some(ViewerError::MissingMarkerPosition("roof".into()))
    );
}

#[test]
fn configured_markers_are_available_immediately() {
    let config = ViewerConfig {
        markers: vec![html_marker("door", 0.0, 0.0)],
        ..quiet_config()
    };
    let mut viewer = viewer_with(config);
    assert!(viewer.get_marker("door").is_ok());

    viewer.render_markers();
    assert!(viewer.marker_projection("door").is_some_and(|p| p.visible));
}

#[test]
fn bad_speed_is_rejected_before_moving() {
    let mut viewer = viewer_with(quiet_config());
    viewer.start_autorotate();

    let result = viewer.animate(AnimateTarget::position(Position::new(1.0, 0.0)), "3 laps");
    assert_eq!(result.err(), Some(ViewerError::UnknownSpeedUnit("laps".into())));
    assert!(viewer.is_autorotating());
    assert_eq!(viewer.position(), Position::new(0.0, 0.0));
}

#[test]
fn go_to_marker_animates_to_it() {
    let mut viewer = viewer_with(quiet_config());
    viewer.add_marker(html_marker("door", 1.0, 0.2), true).unwrap();

    assert_eq!(
        viewer.go_to_marker("window", 1000.0).err(),
        Some(ViewerError::UnknownMarker("window".into()))
    );

    let handle = viewer.go_to_marker("door", 1000.0).unwrap();
    viewer.tick(0.0);
    viewer.tick(1001.0);
    assert_eq!(handle.state(), TaskState::Resolved);
    assert!(viewer.position().angle_to(&Position::new(1.0, 0.2)) < 1e-9);
    assert!(viewer.marker_projection("door").is_some_and(|p| p.visible));
}

#[test]
fn wheel_and_keys_zoom_in_steps() {
    let mut viewer = viewer_with(quiet_config());
    assert_eq!(viewer.zoom_level(), 50.0);

    viewer.wheel(0.0, 3.0);
    assert_eq!(viewer.zoom_level(), 48.0);
    viewer.key_nav(10.0, panosphere::KeyNav::ZoomIn);
    assert_eq!(viewer.zoom_level(), 50.0);

    viewer.pinch(20.0, 100.0);
    assert_eq!(viewer.zoom_level(), 60.0);

    let mut locked = viewer_with(ViewerConfig {
        mousewheel: false,
        ..quiet_config()
    });
    locked.wheel(0.0, 1.0);
    assert_eq!(locked.zoom_level(), 50.0);
}

#[test]
fn gyroscope_requires_device_orientation() {
    let mut viewer = viewer_with(quiet_config());
    assert_eq!(viewer.start_gyroscope(), Err(ViewerError::GyroscopeUnavailable));

    let mut viewer = Viewer::new(
        quiet_config(),
        SystemContext::new(2.0).with_device_orientation(true),
        800.0,
        800.0,
    )
    .unwrap();
    viewer.start_gyroscope().unwrap();
    assert!(viewer.is_gyroscoping());

    // dragging does not stop the gyroscope
    viewer.start_drag(0.0, 10.0, 10.0);
    assert!(viewer.is_gyroscoping());
    viewer.stop_gyroscope();
    assert!(!viewer.is_gyroscoping());
}

#[test]
fn drag_re_aims_the_gyroscope() {
    let mut viewer = Viewer::new(
        quiet_config(),
        SystemContext::default().with_device_orientation(true),
        800.0,
        800.0,
    )
    .unwrap();
    let hfov = viewer.viewport().hfov;
    viewer.start_gyroscope().unwrap();
    viewer.update_orientation(DeviceOrientation::new(0.0, 90.0, 0.0));
    viewer.tick(0.0);
    assert!(viewer.position().angle_to(&Position::new(0.0, 0.0)) < 1e-6);

    viewer.start_drag(10.0, 400.0, 400.0);
    viewer.drag(20.0, 450.0, 430.0);
    let dragged = Position::new(-50.0 / 800.0 * hfov, 0.0);
    assert!(viewer.position().angle_to(&dragged) < 1e-6);

    // the device has not moved, so the next sample keeps the dragged heading
    viewer.tick(32.0);
    assert!(viewer.position().angle_to(&dragged) < 1e-6);

    viewer.end_drag(40.0, 450.0, 430.0);
    assert!(viewer.is_gyroscoping());
    assert_eq!(viewer.active_driver(), Some(DriverKind::Gyroscope));

    viewer.tick(48.0);
    assert!(viewer.position().angle_to(&dragged) < 1e-6);
}

#[test]
fn rotate_can_ignore_the_ranges() {
    let mut viewer = viewer_with(ViewerConfig {
        latitude_range: Some([AngleValue::Text("-60deg".into()), AngleValue::Text("60deg".into())]),
        ..quiet_config()
    });
    // vertical FOV is 60° at the default zoom, so the centre stays within ±30°
    let sides = viewer.rotate(Position::new(0.0, 1.0), false);
    assert!(sides.top && !sides.bottom);
    assert!((viewer.position().latitude - 30f64.to_radians()).abs() < 1e-9);

    let sides = viewer.rotate(Position::new(0.0, 1.0), true);
    assert!(!sides.any());
    assert!((viewer.position().latitude - 1.0).abs() < 1e-12);
}

#[test]
fn programmatic_moves_delay_the_idle_autorotate() {
    let mut viewer = viewer_with(ViewerConfig {
        time_anim: Some(1000),
        ..Default::default()
    });
    viewer.set_panorama(equirectangular(), PanoramaOptions::default());
    viewer.tick(900.0);

    let handle = viewer
        .animate(AnimateTarget::position(Position::new(1.0, 0.0)), 500.0)
        .unwrap();
    viewer.tick(900.0);
    viewer.tick(1400.0);
    assert_eq!(handle.state(), TaskState::Resolved);

    viewer.tick(1500.0);
    assert!(!viewer.is_autorotating());
    viewer.tick(1900.0);
    assert!(viewer.is_autorotating());
}
