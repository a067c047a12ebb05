// main.rs — demo host: window, background loading, input mapping and the egui overlay

#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod renderer;

use renderer::{prepare_panorama, Renderer};

use panosphere::{
    EventKind, KeyNav, MarkerKind, PanoData, PanoramaKind, PanoramaOptions, SystemContext, Viewer,
    ViewerConfig, ViewerEvent,
};

use winit::{
    dpi::{LogicalSize, PhysicalPosition},
    event::*,
    event_loop::{ControlFlow, EventLoop},
    window::{Fullscreen, Window, WindowBuilder},
};

use image::io::Reader as ImageReader;
use image::RgbaImage;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::rc::Rc;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread;
use std::time::Instant;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];
/// Milliseconds for the reset / go-to animations.
const NAVIGATION_SPEED: f64 = 1000.0;

#[derive(Debug, Default)]
struct Args {
    config: Option<PathBuf>,
    image: Option<PathBuf>,
}

fn parse_args(mut it: impl Iterator<Item = String>) -> Args {
    let mut args = Args::default();
    while let Some(arg) = it.next() {
        if arg == "--config" || arg == "-c" {
            args.config = it.next().map(PathBuf::from);
        } else if let Some(path) = arg.strip_prefix("--config=") {
            args.config = Some(PathBuf::from(path));
        } else {
            args.image = Some(PathBuf::from(arg));
        }
    }
    args
}

struct LoadedPanorama {
    path: PathBuf,
    image: RgbaImage,
    data: PanoData,
}

type LoadResult = Result<LoadedPanorama, String>;

#[derive(Default)]
struct UiState {
    is_loading: bool,
    load_error: Option<String>,
    is_fullscreen: bool,
    show_fps: bool,
    fps: f32,
    next_image: Option<PathBuf>,
    hovered_marker: Option<String>,
}

/// Milliseconds since the host started; the viewer's clock.
fn millis(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

fn main() {
    env_logger::init();
    if let Err(err) = run() {
        log::error!("{}", err);
        std::process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let args = parse_args(std::env::args().skip(1));
    let config = match &args.config {
        Some(path) => ViewerConfig::load(path)?,
        None => ViewerConfig::default(),
    };

    let event_loop = EventLoop::new();
    let window = Arc::new(
        WindowBuilder::new()
            .with_title("panosphere")
            .with_inner_size(LogicalSize::new(1280, 720))
            .build(&event_loop)?,
    );

    let mut renderer = pollster::block_on(Renderer::new(window.clone(), config.ui_font.as_deref()))?;
    let size = window.inner_size();
    let system = SystemContext::new(window.scale_factor())
        .with_max_texture_size(renderer.max_texture_size());
    let mut viewer = Viewer::new(config, system, size.width as f64, size.height as f64)?;

    let selected: Rc<RefCell<Option<String>>> = Rc::default();
    {
        let selected = selected.clone();
        viewer.on(EventKind::MarkerSelected, move |event| {
            if let ViewerEvent::MarkerSelected(id) = event {
                *selected.borrow_mut() = Some(id.clone());
            }
        });
    }
    viewer.on_any(|event| match event {
        ViewerEvent::PositionUpdated(_) | ViewerEvent::ZoomUpdated(_) => {}
        other => log::debug!("{:?}", other),
    });

    let start = Instant::now();
    let mut ui = UiState::default();

    let mut mouse_pressed = false;
    let mut cursor: PhysicalPosition<f64> = PhysicalPosition::new(0.0, 0.0);
    let mut touches: HashMap<u64, PhysicalPosition<f64>> = HashMap::new();

    let mut last_frame_time = Instant::now();
    let mut frame_count = 0;

    let (tx, rx): (Sender<LoadResult>, Receiver<LoadResult>) = channel();
    let max_texture = viewer.system().max_texture_size;
    if let Some(path) = args.image {
        ui.is_loading = true;
        start_load_image(path, max_texture, tx.clone());
    }

    event_loop.run(move |event, _, control_flow| {
        *control_flow = ControlFlow::Poll;

        while let Ok(loaded) = rx.try_recv() {
            ui.is_loading = false;
            match loaded {
                Ok(panorama) => {
                    renderer.load_panorama(&panorama.image);
                    viewer.set_panorama(
                        PanoramaKind::Equirectangular(panorama.data),
                        PanoramaOptions::default(),
                    );
                    ui.load_error = None;
                    if let Some(name) = panorama.path.file_name() {
                        window.set_title(&format!("panosphere - {}", name.to_string_lossy()));
                    }
                }
                Err(message) => {
                    viewer.panorama_load_failed(message.clone());
                    ui.load_error = Some(message);
                }
            }
        }

        match event {
            Event::WindowEvent { event, .. } => {
                let response = renderer.egui_state.on_event(&renderer.egui_ctx, &event);
                if response.consumed {
                    return;
                }
                let now = millis(start);

                match event {
                    WindowEvent::CloseRequested => {
                        *control_flow = ControlFlow::Exit;
                    }

                    WindowEvent::Resized(new_size) => {
                        renderer.resize(new_size);
                        if new_size.width > 0 && new_size.height > 0 {
                            viewer.resize(new_size.width as f64, new_size.height as f64);
                        }
                    }

                    WindowEvent::KeyboardInput { input, .. } => {
                        if input.state != ElementState::Pressed {
                            return;
                        }
                        let nav = match input.virtual_keycode {
                            Some(VirtualKeyCode::Left) => Some(KeyNav::Left),
                            Some(VirtualKeyCode::Right) => Some(KeyNav::Right),
                            Some(VirtualKeyCode::Up) => Some(KeyNav::Up),
                            Some(VirtualKeyCode::Down) => Some(KeyNav::Down),
                            Some(VirtualKeyCode::Equals | VirtualKeyCode::Plus | VirtualKeyCode::NumpadAdd) => {
                                Some(KeyNav::ZoomIn)
                            }
                            Some(VirtualKeyCode::Minus | VirtualKeyCode::NumpadSubtract) => {
                                Some(KeyNav::ZoomOut)
                            }
                            _ => None,
                        };
                        if let Some(nav) = nav {
                            viewer.key_nav(now, nav);
                            return;
                        }

                        match input.virtual_keycode {
                            Some(VirtualKeyCode::O) => ui.next_image = pick_image(),
                            Some(VirtualKeyCode::F11) => toggle_fullscreen(&window, &mut ui),
                            Some(VirtualKeyCode::Space) => viewer.toggle_autorotate(),
                            _ => {}
                        }
                    }

                    WindowEvent::MouseInput { state, button: MouseButton::Left, .. } => {
                        mouse_pressed = state == ElementState::Pressed;
                        if mouse_pressed {
                            viewer.start_drag(now, cursor.x, cursor.y);
                        } else {
                            viewer.end_drag(now, cursor.x, cursor.y);
                        }
                    }

                    WindowEvent::CursorMoved { position, .. } => {
                        cursor = position;
                        if mouse_pressed {
                            viewer.drag(now, position.x, position.y);
                        } else {
                            ui.hovered_marker = viewer.marker_at(position.x, position.y);
                        }
                    }

                    WindowEvent::MouseWheel { delta, .. } => {
                        // positive delta zooms out
                        let scroll = match delta {
                            MouseScrollDelta::LineDelta(_, y) => -y as f64,
                            MouseScrollDelta::PixelDelta(pos) => -pos.y / 50.0,
                        };
                        viewer.wheel(now, scroll);
                    }

                    WindowEvent::Touch(touch) => {
                        handle_touch(&mut viewer, &mut touches, now, touch);
                    }

                    WindowEvent::DroppedFile(path) => {
                        ui.next_image = Some(path);
                    }

                    _ => {}
                }
            }

            Event::RedrawRequested(_) => {
                frame_count += 1;
                let frame_now = Instant::now();
                let elapsed = frame_now.duration_since(last_frame_time).as_secs_f32();
                if elapsed >= 1.0 {
                    ui.fps = frame_count as f32 / elapsed;
                    frame_count = 0;
                    last_frame_time = frame_now;
                }

                viewer.tick(millis(start));
                renderer.update_camera(&viewer.render_state());

                let selected_marker = selected.borrow().clone();
                let render_result = renderer.render_with_ui(&window, |ctx| {
                    draw_markers(ctx, &viewer, &ui);
                    draw_ui(ctx, &mut viewer, &mut ui, selected_marker.as_deref(), &window);
                });

                if let Some(path) = ui.next_image.take() {
                    ui.is_loading = true;
                    start_load_image(path, max_texture, tx.clone());
                }

                match render_result {
                    Ok(_) => {}
                    Err(wgpu::SurfaceError::Lost) => renderer.resize(renderer.size),
                    Err(wgpu::SurfaceError::OutOfMemory) => *control_flow = ControlFlow::Exit,
                    Err(e) => log::warn!("render error: {:?}", e),
                }
            }

            Event::MainEventsCleared => {
                window.request_redraw();
            }

            _ => {}
        }
    })
}

// one finger drags, two fingers pinch
fn handle_touch(
    viewer: &mut Viewer,
    touches: &mut HashMap<u64, PhysicalPosition<f64>>,
    now: f64,
    touch: Touch,
) {
    let spread = |touches: &HashMap<u64, PhysicalPosition<f64>>| {
        let mut points = touches.values();
        match (points.next(), points.next()) {
            (Some(a), Some(b)) => Some(((a.x - b.x).powi(2) + (a.y - b.y).powi(2)).sqrt()),
            _ => None,
        }
    };
    let p = touch.location;

    match touch.phase {
        TouchPhase::Started => {
            touches.insert(touch.id, p);
            if touches.len() == 1 {
                viewer.start_drag(now, p.x, p.y);
            } else {
                // a second finger turns the drag into a pinch
                viewer.stop_all();
            }
        }
        TouchPhase::Moved => {
            let before = spread(touches);
            touches.insert(touch.id, p);
            match (touches.len(), before, spread(touches)) {
                (1, _, _) => viewer.drag(now, p.x, p.y),
                (_, Some(before), Some(after)) => viewer.pinch(now, after - before),
                _ => {}
            }
        }
        TouchPhase::Ended | TouchPhase::Cancelled => {
            let was_single = touches.len() == 1;
            touches.remove(&touch.id);
            if was_single {
                viewer.end_drag(now, p.x, p.y);
            }
        }
    }
}

fn pick_image() -> Option<PathBuf> {
    rfd::FileDialog::new()
        .add_filter("Images", &IMAGE_EXTENSIONS)
        .pick_file()
}

fn toggle_fullscreen(window: &Window, ui: &mut UiState) {
    ui.is_fullscreen = !ui.is_fullscreen;
    if ui.is_fullscreen {
        window.set_fullscreen(Some(Fullscreen::Borderless(None)));
    } else {
        window.set_fullscreen(None);
    }
}

fn decode_image(path: &PathBuf, max_texture: u32) -> LoadResult {
    let file = File::open(path).map_err(|e| format!("cannot open {}: {}", path.display(), e))?;
    let img = ImageReader::new(BufReader::new(file))
        .with_guessed_format()
        .map_err(image::ImageError::IoError)
        .and_then(|mut r| {
            r.no_limits();
            r.decode()
        })
        .map_err(|e| format!("cannot decode {}: {}", path.display(), e))?;

    log::info!("{} decoded: {}x{}", path.display(), img.width(), img.height());
    let (image, data) = prepare_panorama(img.to_rgba8(), max_texture);
    Ok(LoadedPanorama {
        path: path.clone(),
        image,
        data,
    })
}

fn start_load_image(path: PathBuf, max_texture: u32, tx: Sender<LoadResult>) {
    thread::spawn(move || {
        log::info!("loading {} in background", path.display());
        if tx.send(decode_image(&path, max_texture)).is_err() {
            log::warn!("viewer closed before {} finished loading", path.display());
        }
    });
}

fn marker_label(kind: &MarkerKind) -> Option<String> {
    match kind {
        MarkerKind::Html { html, .. } => Some(html.clone()),
        MarkerKind::Image { image, .. } | MarkerKind::Layer { image, .. } => Some(
            std::path::Path::new(image)
                .file_stem()
                .map_or_else(|| image.clone(), |s| s.to_string_lossy().into_owned()),
        ),
        MarkerKind::Polygon { .. } | MarkerKind::Polyline { .. } => None,
    }
}

/// Paint the projected markers below the egui panels.
fn draw_markers(ctx: &egui::Context, viewer: &Viewer, ui: &UiState) {
    let painter = ctx.layer_painter(egui::LayerId::new(
        egui::Order::Background,
        egui::Id::new("markers"),
    ));
    // viewer coordinates are physical pixels
    let ppp = ctx.pixels_per_point();
    let to_pos = |p: glam::DVec2| egui::pos2(p.x as f32 / ppp, p.y as f32 / ppp);

    let fill = egui::Color32::from_rgba_unmultiplied(30, 30, 30, 180);
    let highlight = egui::Color32::from_rgb(255, 200, 60);

    for marker in viewer.markers() {
        let Some(projection) = viewer.marker_projection(marker.id()) else {
            continue;
        };
        if !projection.visible {
            continue;
        }
        let hovered = ui.hovered_marker.as_deref() == Some(marker.id());
        let color = if hovered { highlight } else { egui::Color32::WHITE };

        if marker.is_poly() {
            let points: Vec<egui::Pos2> = projection.outline.iter().copied().map(to_pos).collect();
            let stroke = egui::Stroke::new(2.0, color);
            if marker.is_polygon() {
                painter.add(egui::Shape::closed_line(points, stroke));
            } else {
                painter.add(egui::Shape::line(points, stroke));
            }
            continue;
        }

        let Some(size) = projection.size else {
            continue;
        };
        let rect = egui::Rect::from_min_size(
            to_pos(projection.position_2d),
            egui::vec2(size.width as f32 / ppp, size.height as f32 / ppp),
        );
        painter.rect(rect, 4.0, fill, egui::Stroke::new(1.0, color));
        if let Some(label) = marker_label(marker.kind()) {
            painter.text(
                rect.center(),
                egui::Align2::CENTER_CENTER,
                label,
                egui::FontId::proportional(13.0),
                color,
            );
        }
    }

    let tooltip = ui
        .hovered_marker
        .as_deref()
        .and_then(|id| viewer.get_marker(id).ok())
        .and_then(|marker| marker.config().tooltip.clone());
    if let Some(text) = tooltip {
        egui::show_tooltip_at_pointer(ctx, egui::Id::new("marker_tooltip"), |ui| {
            ui.label(text);
        });
    }
}

fn draw_ui(
    ctx: &egui::Context,
    viewer: &mut Viewer,
    ui_state: &mut UiState,
    selected_marker: Option<&str>,
    window: &Window,
) {
    let lang = viewer.config().lang.clone();

    egui::TopBottomPanel::top("menu_bar").show(ctx, |ui| {
        egui::menu::bar(ui, |ui| {
            if ui.button(&lang.open_image).clicked() {
                ui_state.next_image = pick_image();
            }
            ui.separator();

            if ui
                .selectable_label(viewer.is_autorotating(), &lang.autorotate)
                .clicked()
            {
                viewer.toggle_autorotate();
            }

            ui.menu_button(&lang.zoom, |ui| {
                if ui.button(&lang.zoom_in).clicked() {
                    viewer.zoom_in();
                }
                if ui.button(&lang.zoom_out).clicked() {
                    viewer.zoom_out();
                }
                let mut level = viewer.zoom_level();
                if ui.add(egui::Slider::new(&mut level, 0.0..=100.0)).changed() {
                    viewer.zoom(level);
                }
            });

            if ui.button(&lang.reset).clicked() {
                if let Err(err) = viewer.reset_view(NAVIGATION_SPEED) {
                    log::warn!("reset failed: {}", err);
                }
            }

            let gyroscope = ui.add_enabled(
                viewer.system().device_orientation_supported,
                egui::SelectableLabel::new(viewer.is_gyroscoping(), &lang.gyroscope),
            );
            if gyroscope.clicked() {
                if viewer.is_gyroscoping() {
                    viewer.stop_gyroscope();
                } else if let Err(err) = viewer.start_gyroscope() {
                    log::warn!("{}", err);
                }
            }

            if ui
                .selectable_label(ui_state.is_fullscreen, &lang.fullscreen)
                .clicked()
            {
                toggle_fullscreen(window, ui_state);
            }

            let ids: Vec<(String, bool)> = viewer
                .markers()
                .map(|m| (m.id().to_string(), m.config().visible))
                .collect();
            ui.add_enabled_ui(!ids.is_empty(), |ui| {
                ui.menu_button(&lang.markers, |ui| {
                    for (id, visible) in ids {
                        ui.horizontal(|ui| {
                            if ui.button(&id).clicked() {
                                if let Err(err) = viewer.go_to_marker(&id, NAVIGATION_SPEED) {
                                    log::warn!("{}", err);
                                }
                                ui.close_menu();
                            }
                            let mut shown = visible;
                            if ui.checkbox(&mut shown, "").changed() {
                                if let Err(err) = viewer.toggle_marker(&id, true) {
                                    log::warn!("{}", err);
                                }
                            }
                        });
                    }
                });
            });

            ui.separator();
            ui.checkbox(&mut ui_state.show_fps, "FPS");
        });
    });

    egui::TopBottomPanel::bottom("status_bar").show(ctx, |ui| {
        ui.horizontal(|ui| {
            if ui_state.is_loading {
                ui.label(egui::RichText::new(&lang.loading).color(egui::Color32::YELLOW));
                ui.label("|");
            }
            if let Some(err) = &ui_state.load_error {
                ui.label(egui::RichText::new(&lang.load_error).color(egui::Color32::RED))
                    .on_hover_text(err);
                ui.label("|");
            }

            let position = viewer.position();
            let viewport = viewer.viewport();
            ui.label(format!(
                "{:.1}° / {:.1}°",
                position.longitude.to_degrees(),
                position.latitude.to_degrees()
            ));
            ui.label("|");
            ui.label(format!("{} {:.0}", lang.zoom, viewer.zoom_level()));
            ui.label("|");
            ui.label(format!(
                "FOV {:.1}° x {:.1}°",
                viewport.hfov_degrees(),
                viewport.vfov_degrees()
            ));

            if let Some(id) = selected_marker {
                ui.label("|");
                ui.label(format!("{}: {}", lang.markers, id));
            }

            if ui_state.show_fps {
                ui.label("|");
                ui.label(
                    egui::RichText::new(format!("FPS: {:.1}", ui_state.fps))
                        .color(egui::Color32::GREEN),
                );
            }
        });
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(list: &[&str]) -> Args {
        parse_args(list.iter().map(|s| s.to_string()))
    }

    #[test]
    fn parses_config_and_image() {
        let parsed = args(&["--config", "viewer.json", "room.jpg"]);
        assert_eq!(parsed.config, Some(PathBuf::from("viewer.json")));
        assert_eq!(parsed.image, Some(PathBuf::from("room.jpg")));

        let parsed = args(&["--config=other.json"]);
        assert_eq!(parsed.config, Some(PathBuf::from("other.json")));
        assert_eq!(parsed.image, None);
    }

    #[test]
    fn labels_point_markers_only() {
        let image = MarkerKind::Image {
            image: "icons/pin.png".into(),
            position: None,
        };
        assert_eq!(marker_label(&image).as_deref(), Some("pin"));
        assert_eq!(marker_label(&MarkerKind::Polyline { points: vec![] }), None);
    }

    #[test]
    fn missing_file_reports_an_error() {
        let result = decode_image(&PathBuf::from("/nonexistent/pano.jpg"), 4096);
        assert!(matches!(result, Err(message) if message.contains("cannot open")));
    }
}
