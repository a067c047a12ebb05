// system.rs — host capabilities, detected once and handed to the viewer

/// What the host platform can do. Built by the host before the viewer and never
/// changed afterwards.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SystemContext {
    /// Physical pixels per logical pixel.
    pub pixel_ratio: f64,
    pub touch_enabled: bool,
    pub device_orientation_supported: bool,
    /// Largest texture edge the renderer accepts.
    pub max_texture_size: u32,
}

impl Default for SystemContext {
    fn default() -> Self {
        Self {
            pixel_ratio: 1.0,
            touch_enabled: false,
            device_orientation_supported: false,
            max_texture_size: 8192,
        }
    }
}

impl SystemContext {
    pub fn new(pixel_ratio: f64) -> Self {
        Self {
            pixel_ratio: if pixel_ratio > 0.0 { pixel_ratio } else { 1.0 },
            ..Default::default()
        }
    }

    pub fn with_max_texture_size(mut self, size: u32) -> Self {
        self.max_texture_size = size;
        self
    }

    pub fn with_touch(mut self, enabled: bool) -> Self {
        self.touch_enabled = enabled;
        self
    }

    pub fn with_device_orientation(mut self, supported: bool) -> Self {
        self.device_orientation_supported = supported;
        self
    }
}
