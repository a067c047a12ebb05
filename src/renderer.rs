// renderer.rs — wgpu ray-cast of the equirectangular texture plus the egui overlay

use std::path::Path;

use image::{GenericImage, Rgba, RgbaImage};
use panosphere::{PanoData, RenderState};
use wgpu::util::DeviceExt;
use winit::window::Window;

#[derive(Debug, thiserror::Error)]
pub enum RenderError {
    #[error("no compatible GPU adapter")]
    NoAdapter,
    #[error(transparent)]
    Surface(#[from] wgpu::CreateSurfaceError),
    #[error(transparent)]
    Device(#[from] wgpu::RequestDeviceError),
}

/// Install a user font for the UI; egui's bundled fonts stay as fallback.
fn setup_egui_ui_font(ctx: &egui::Context, path: &Path) {
    let bytes = match std::fs::read(path) {
        Ok(bytes) => bytes,
        Err(err) => {
            log::warn!("cannot read UI font {}: {}", path.display(), err);
            return;
        }
    };
    // egui panics on fonts it cannot parse, check with ab_glyph first
    if ab_glyph::FontArc::try_from_vec(bytes.clone()).is_err() {
        log::warn!("{} is not a usable font", path.display());
        return;
    }
    log::info!("UI font: {}", path.display());

    let mut fonts = egui::FontDefinitions::default();
    fonts
        .font_data
        .insert("ui".to_owned(), egui::FontData::from_owned(bytes));
    for family in [egui::FontFamily::Proportional, egui::FontFamily::Monospace] {
        if let Some(list) = fonts.families.get_mut(&family) {
            list.insert(0, "ui".to_owned());
        }
    }
    ctx.set_fonts(fonts);
}

/// Fit a decoded image into the GPU limit and pad partial panoramas to 2:1.
///
/// The image is centred vertically on the full sphere height, matching
/// [`PanoData::centered`].
pub fn prepare_panorama(img: RgbaImage, max_dimension: u32) -> (RgbaImage, PanoData) {
    let (src_w, src_h) = img.dimensions();

    let img = if src_w > max_dimension || src_h > max_dimension {
        let scale = (max_dimension as f32 / src_w.max(src_h) as f32).min(1.0);
        let new_w = ((src_w as f32 * scale) as u32).max(1);
        let new_h = ((src_h as f32 * scale) as u32).max(1);
        log::warn!(
            "{}x{} exceeds the {}px texture limit, scaled to {}x{}",
            src_w,
            src_h,
            max_dimension,
            new_w,
            new_h
        );
        image::DynamicImage::ImageRgba8(img)
            .resize_exact(new_w, new_h, image::imageops::FilterType::Lanczos3)
            .to_rgba8()
    } else {
        img
    };

    let (width, height) = img.dimensions();
    let data = PanoData::centered(width as f64, height as f64);
    let full_height = data.full_height as u32;
    if full_height <= height {
        return (img, data);
    }

    let mut canvas = RgbaImage::from_pixel(width, full_height, Rgba([0, 0, 0, 255]));
    // fits by construction: cropped_y + height <= full_height
    if let Err(err) = canvas.copy_from(&img, 0, data.cropped_y as u32) {
        log::error!("padding failed: {}", err);
        return (img, PanoData::full(width as f64, height as f64));
    }
    (canvas, data)
}

#[repr(C)]
#[derive(Debug, Copy, Clone, bytemuck::Pod, bytemuck::Zeroable)]
struct CameraUniform {
    /// xyz forward, w = tan(vfov / 2)
    direction: [f32; 4],
    /// xyz, w = aspect
    right: [f32; 4],
    /// xyz, w = crossfade
    up: [f32; 4],
}

impl CameraUniform {
    fn from_state(state: &RenderState) -> Self {
        let right = state.direction.cross(state.up).normalize_or_zero();
        Self {
            direction: [
                state.direction.x as f32,
                state.direction.y as f32,
                state.direction.z as f32,
                (state.vfov / 2.0).tan() as f32,
            ],
            right: [right.x as f32, right.y as f32, right.z as f32, state.aspect as f32],
            up: [
                state.up.x as f32,
                state.up.y as f32,
                state.up.z as f32,
                state.crossfade.clamp(0.0, 1.0) as f32,
            ],
        }
    }
}

fn create_panorama_texture(
    device: &wgpu::Device,
    queue: &wgpu::Queue,
    width: u32,
    height: u32,
    pixels: &[u8],
) -> wgpu::Texture {
    let size = wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: 1,
    };
    let texture = device.create_texture(&wgpu::TextureDescriptor {
        size,
        mip_level_count: 1,
        sample_count: 1,
        dimension: wgpu::TextureDimension::D2,
        format: wgpu::TextureFormat::Rgba8UnormSrgb,
        usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
        label: Some("panorama_texture"),
        view_formats: &[],
    });
    queue.write_texture(
        wgpu::ImageCopyTexture {
            texture: &texture,
            mip_level: 0,
            origin: wgpu::Origin3d::ZERO,
            aspect: wgpu::TextureAspect::All,
        },
        pixels,
        wgpu::ImageDataLayout {
            offset: 0,
            bytes_per_row: Some(4 * width),
            rows_per_image: Some(height),
        },
        size,
    );
    texture
}

pub struct Renderer {
    surface: wgpu::Surface,
    device: wgpu::Device,
    queue: wgpu::Queue,
    config: wgpu::SurfaceConfiguration,
    pub size: winit::dpi::PhysicalSize<u32>,
    render_pipeline: wgpu::RenderPipeline,

    // the previous panorama stays bound for the cross-fade
    bind_group_layout: wgpu::BindGroupLayout,
    bind_group: wgpu::BindGroup,
    current: wgpu::Texture,
    previous: wgpu::Texture,
    sampler: wgpu::Sampler,

    camera_uniform: CameraUniform,
    camera_buffer: wgpu::Buffer,

    pub egui_ctx: egui::Context,
    pub egui_state: egui_winit::State,
    egui_renderer: egui_wgpu::Renderer,
}

impl Renderer {
    pub async fn new(
        window: std::sync::Arc<Window>,
        ui_font: Option<&Path>,
    ) -> Result<Self, RenderError> {
        let size = window.inner_size();
        let instance = wgpu::Instance::new(wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        });

        let surface = unsafe { instance.create_surface(window.as_ref()) }?;
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface: Some(&surface),
                force_fallback_adapter: false,
            })
            .await
            .ok_or(RenderError::NoAdapter)?;
        log::info!("adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &wgpu::DeviceDescriptor {
                    features: wgpu::Features::empty(),
                    limits: wgpu::Limits::default().using_resolution(adapter.limits()),
                    label: None,
                },
                None,
            )
            .await?;

        let surface_caps = surface.get_capabilities(&adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .or_else(|| surface_caps.formats.first().copied())
            .unwrap_or(wgpu::TextureFormat::Bgra8UnormSrgb);
        let alpha_mode = surface_caps
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: wgpu::PresentMode::Fifo,
            alpha_mode,
            view_formats: vec![],
        };
        surface.configure(&device, &config);

        // dark placeholder until the first panorama arrives
        let placeholder = [24u8, 24, 24, 255].repeat(4);
        let current = create_panorama_texture(&device, &queue, 2, 2, &placeholder);
        let previous = create_panorama_texture(&device, &queue, 2, 2, &placeholder);

        let sampler = device.create_sampler(&wgpu::SamplerDescriptor {
            address_mode_u: wgpu::AddressMode::Repeat,
            address_mode_v: wgpu::AddressMode::ClampToEdge,
            address_mode_w: wgpu::AddressMode::ClampToEdge,
            mag_filter: wgpu::FilterMode::Linear,
            min_filter: wgpu::FilterMode::Linear,
            mipmap_filter: wgpu::FilterMode::Nearest,
            ..Default::default()
        });

        let camera_uniform = CameraUniform {
            direction: [0.0, 0.0, 1.0, 1.0],
            right: [-1.0, 0.0, 0.0, size.width as f32 / size.height.max(1) as f32],
            up: [0.0, 1.0, 0.0, 1.0],
        };
        let camera_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Camera Buffer"),
            contents: bytemuck::cast_slice(&[camera_uniform]),
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
        });

        let texture_entry = |binding| wgpu::BindGroupLayoutEntry {
            binding,
            visibility: wgpu::ShaderStages::FRAGMENT,
            ty: wgpu::BindingType::Texture {
                multisampled: false,
                view_dimension: wgpu::TextureViewDimension::D2,
                sample_type: wgpu::TextureSampleType::Float { filterable: true },
            },
            count: None,
        };
        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            entries: &[
                wgpu::BindGroupLayoutEntry {
                    binding: 0,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Buffer {
                        ty: wgpu::BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                texture_entry(1),
                texture_entry(2),
                wgpu::BindGroupLayoutEntry {
                    binding: 3,
                    visibility: wgpu::ShaderStages::FRAGMENT,
                    ty: wgpu::BindingType::Sampler(wgpu::SamplerBindingType::Filtering),
                    count: None,
                },
            ],
            label: Some("panorama_bind_group_layout"),
        });

        let bind_group = Self::create_bind_group(
            &device,
            &bind_group_layout,
            &camera_buffer,
            &current,
            &previous,
            &sampler,
        );

        let shader = device.create_shader_module(wgpu::include_wgsl!("panorama.wgsl"));
        let render_pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Render Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Render Pipeline"),
            layout: Some(&render_pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: "vs_main",
                buffers: &[],
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: "fs_main",
                targets: &[Some(wgpu::ColorTargetState {
                    format: config.format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                // one oversized triangle covers the screen
                cull_mode: None,
                polygon_mode: wgpu::PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState {
                count: 1,
                mask: !0,
                alpha_to_coverage_enabled: false,
            },
            multiview: None,
        });

        let egui_ctx = egui::Context::default();
        if let Some(path) = ui_font {
            setup_egui_ui_font(&egui_ctx, path);
        }
        let mut egui_state = egui_winit::State::new(window.as_ref());
        egui_state.set_pixels_per_point(window.scale_factor() as f32);
        let egui_renderer = egui_wgpu::Renderer::new(&device, config.format, None, 1);

        Ok(Self {
            surface,
            device,
            queue,
            config,
            size,
            render_pipeline,
            bind_group_layout,
            bind_group,
            current,
            previous,
            sampler,
            camera_uniform,
            camera_buffer,
            egui_ctx,
            egui_state,
            egui_renderer,
        })
    }

    fn create_bind_group(
        device: &wgpu::Device,
        layout: &wgpu::BindGroupLayout,
        camera_buffer: &wgpu::Buffer,
        current: &wgpu::Texture,
        previous: &wgpu::Texture,
        sampler: &wgpu::Sampler,
    ) -> wgpu::BindGroup {
        let current_view = current.create_view(&wgpu::TextureViewDescriptor::default());
        let previous_view = previous.create_view(&wgpu::TextureViewDescriptor::default());
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: camera_buffer.as_entire_binding(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: wgpu::BindingResource::TextureView(&current_view),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: wgpu::BindingResource::TextureView(&previous_view),
                },
                wgpu::BindGroupEntry {
                    binding: 3,
                    resource: wgpu::BindingResource::Sampler(sampler),
                },
            ],
            label: Some("panorama_bind_group"),
        })
    }

    pub fn max_texture_size(&self) -> u32 {
        self.device.limits().max_texture_dimension_2d
    }

    pub fn resize(&mut self, new_size: winit::dpi::PhysicalSize<u32>) {
        if new_size.width > 0 && new_size.height > 0 {
            self.size = new_size;
            self.config.width = new_size.width;
            self.config.height = new_size.height;
            self.surface.configure(&self.device, &self.config);
        }
    }

    pub fn update_camera(&mut self, state: &RenderState) {
        self.camera_uniform = CameraUniform::from_state(state);
        self.queue
            .write_buffer(&self.camera_buffer, 0, bytemuck::cast_slice(&[self.camera_uniform]));
    }

    /// Upload an image prepared by [`prepare_panorama`]; the displayed one becomes the
    /// cross-fade source.
    pub fn load_panorama(&mut self, img: &RgbaImage) {
        let (width, height) = img.dimensions();
        let texture = create_panorama_texture(&self.device, &self.queue, width, height, img);
        self.previous = std::mem::replace(&mut self.current, texture);
        self.bind_group = Self::create_bind_group(
            &self.device,
            &self.bind_group_layout,
            &self.camera_buffer,
            &self.current,
            &self.previous,
            &self.sampler,
        );
        log::debug!("panorama texture {}x{} uploaded", width, height);
    }

    pub fn render_with_ui(
        &mut self,
        window: &Window,
        run_ui: impl FnOnce(&egui::Context),
    ) -> Result<(), wgpu::SurfaceError> {
        let output = self.surface.get_current_texture()?;
        let view = output
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder = self
            .device
            .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                label: Some("Render Encoder"),
            });

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });

            render_pass.set_pipeline(&self.render_pipeline);
            render_pass.set_bind_group(0, &self.bind_group, &[]);
            render_pass.draw(0..3, 0..1);
        }

        let raw_input = self.egui_state.take_egui_input(window);
        let full_output = self.egui_ctx.run(raw_input, run_ui);

        self.egui_state
            .handle_platform_output(window, &self.egui_ctx, full_output.platform_output);
        let clipped_primitives = self.egui_ctx.tessellate(full_output.shapes);

        let screen_descriptor = egui_wgpu::renderer::ScreenDescriptor {
            size_in_pixels: [self.config.width, self.config.height],
            pixels_per_point: window.scale_factor() as f32,
        };

        for (id, delta) in &full_output.textures_delta.set {
            self.egui_renderer
                .update_texture(&self.device, &self.queue, *id, delta);
        }

        self.egui_renderer.update_buffers(
            &self.device,
            &self.queue,
            &mut encoder,
            &clipped_primitives,
            &screen_descriptor,
        );

        {
            let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some("Egui Render Pass"),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: &view,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: true,
                    },
                })],
                depth_stencil_attachment: None,
            });
            self.egui_renderer
                .render(&mut render_pass, &clipped_primitives, &screen_descriptor);
        }

        for id in &full_output.textures_delta.free {
            self.egui_renderer.free_texture(id);
        }

        self.queue.submit(std::iter::once(encoder.finish()));
        output.present();

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_partial_panorama_around_the_horizon() {
        let img = RgbaImage::from_pixel(400, 100, Rgba([255, 255, 255, 255]));
        let (padded, data) = prepare_panorama(img, 8192);

        assert_eq!(padded.dimensions(), (400, 200));
        assert_eq!(data.cropped_y, 50.0);
        assert_eq!(padded.get_pixel(0, 49), &Rgba([0, 0, 0, 255]));
        assert_eq!(padded.get_pixel(0, 50), &Rgba([255, 255, 255, 255]));
        assert_eq!(padded.get_pixel(0, 149), &Rgba([255, 255, 255, 255]));
        assert_eq!(padded.get_pixel(0, 150), &Rgba([0, 0, 0, 255]));
    }

    #[test]
    fn full_panorama_is_untouched() {
        let img = RgbaImage::new(200, 100);
        let (out, data) = prepare_panorama(img, 8192);
        assert_eq!(out.dimensions(), (200, 100));
        assert_eq!(data, PanoData::full(200.0, 100.0));
    }

    #[test]
    fn oversized_image_is_scaled_to_the_limit() {
        let img = RgbaImage::new(400, 200);
        let (out, data) = prepare_panorama(img, 100);
        assert_eq!(out.dimensions(), (100, 50));
        assert_eq!(data.full_width, 100.0);
    }

    #[test]
    fn uniform_carries_camera_basis() {
        let state = RenderState {
            direction: glam::DVec3::Z,
            up: glam::DVec3::Y,
            vfov: std::f64::consts::FRAC_PI_2,
            aspect: 2.0,
            crossfade: 0.25,
        };
        let uniform = CameraUniform::from_state(&state);
        // longitude grows to the right: screen right is -x when looking down +z
        assert_eq!(uniform.right[..3], [-1.0, 0.0, 0.0]);
        assert!((uniform.direction[3] - 1.0).abs() < 1e-6);
        assert_eq!(uniform.right[3], 2.0);
        assert_eq!(uniform.up[3], 0.25);
    }
}
