//! Navigation, projection and animation core of a spherical panorama viewer.
//!
//! The host owns the window and the GPU; it feeds input primitives and frame ticks
//! into a [`Viewer`] and reads back a [`RenderState`] plus marker projections.

pub mod animation;
pub mod camera;
pub mod config;
pub mod coords;
pub mod easing;
pub mod error;
pub mod events;
pub mod inertia;
pub mod markers;
pub mod mesh;
pub mod system;
pub mod units;
pub mod viewer;
pub mod viewport;

pub use animation::{AnimationOptions, AnimationTask, DriverKind, TaskHandle, TaskState};
pub use config::ViewerConfig;
pub use coords::{PanoData, PanoramaKind, Position, TexturePoint};
pub use easing::Easing;
pub use error::{Result, ViewerError};
pub use events::{EventKind, ViewerEvent};
pub use markers::{MarkerConfig, MarkerKind};
pub use system::SystemContext;
pub use viewer::{KeyNav, PanoramaOptions, RenderState, Viewer};
pub use viewport::{AnimateTarget, AnimationSpeed, DeviceOrientation, Sides};
