// markers — marker definitions, the registry, and per-frame visibility
//
// Markers come in two families: point markers (image, html, layer) anchored at one
// position with a pixel size, and poly markers (polygon, polyline) given as a list of
// positions whose outline is clipped against the visible hemisphere.

pub mod visibility;

use std::fmt;
use std::mem::discriminant;
use std::str::FromStr;

use glam::DVec3;
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::coords::{spherical_to_vector3, texture_to_spherical, PanoramaKind, Position, TexturePoint};
use crate::error::{Result, ViewerError};

/// Where a marker point sits: spherical radians or a pixel on the source image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Placement {
    Spherical(Position),
    Texture(TexturePoint),
}

impl Placement {
    fn resolve(&self, panorama: Option<&PanoramaKind>) -> Result<Position> {
        match self {
            Placement::Spherical(p) => Ok(p.normalized()),
            Placement::Texture(t) => {
                let panorama = panorama.ok_or(ViewerError::NoPanorama)?;
                texture_to_spherical(panorama, *t)
            }
        }
    }

    fn is_texture(&self) -> bool {
        matches!(self, Placement::Texture(_))
    }
}

impl From<Position> for Placement {
    fn from(p: Position) -> Self {
        Placement::Spherical(p)
    }
}

impl From<TexturePoint> for Placement {
    fn from(t: TexturePoint) -> Self {
        Placement::Texture(t)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    pub fn scaled(self, factor: f64) -> Self {
        Self::new(self.width * factor, self.height * factor)
    }
}

/// Which point of a marker's box sits on its position, as fractions of the box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Anchor {
    pub x: f64,
    pub y: f64,
}

impl Anchor {
    pub const CENTER: Anchor = Anchor { x: 0.5, y: 0.5 };

    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl Default for Anchor {
    fn default() -> Self {
        Anchor::CENTER
    }
}

fn parse_percent(token: &str) -> Option<f64> {
    let value: f64 = token.strip_suffix('%')?.parse().ok()?;
    value.is_finite().then_some(value / 100.0)
}

impl FromStr for Anchor {
    type Err = ViewerError;

    /// Accepts CSS-like keywords (`"bottom center"`, `"left"`) or percentages (`"25% 75%"`).
    fn from_str(s: &str) -> Result<Self> {
        let invalid = || ViewerError::InvalidAnchor(s.to_string());
        let text = s.trim().to_lowercase();
        let tokens: Vec<&str> = text.split_whitespace().collect();
        if tokens.is_empty() || tokens.len() > 2 {
            return Err(invalid());
        }

        if tokens.iter().all(|t| t.ends_with('%')) {
            let x = parse_percent(tokens[0]).ok_or_else(invalid)?;
            let y = match tokens.get(1) {
                Some(t) => parse_percent(t).ok_or_else(invalid)?,
                None => 0.5,
            };
            return Ok(Anchor { x, y });
        }

        let mut x = None;
        let mut y = None;
        for token in &tokens {
            let (slot, value) = match *token {
                "left" => (&mut x, 0.0),
                "right" => (&mut x, 1.0),
                "top" => (&mut y, 0.0),
                "bottom" => (&mut y, 1.0),
                "center" => continue,
                _ => return Err(invalid()),
            };
            if slot.replace(value).is_some() {
                return Err(invalid());
            }
        }
        Ok(Anchor {
            x: x.unwrap_or(0.5),
            y: y.unwrap_or(0.5),
        })
    }
}

impl TryFrom<String> for Anchor {
    type Error = ViewerError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl fmt::Display for Anchor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}% {}%", self.x * 100.0, self.y * 100.0)
    }
}

impl From<Anchor> for String {
    fn from(anchor: Anchor) -> Self {
        anchor.to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum MarkerKind {
    Image {
        image: String,
        #[serde(default)]
        position: Option<Placement>,
    },
    Html {
        html: String,
        #[serde(default)]
        position: Option<Placement>,
    },
    /// Flat textured quad drawn in the scene.
    Layer {
        image: String,
        #[serde(default)]
        position: Option<Placement>,
    },
    Polygon {
        #[serde(default)]
        points: Vec<Placement>,
    },
    Polyline {
        #[serde(default)]
        points: Vec<Placement>,
    },
}

impl MarkerKind {
    pub fn name(&self) -> &'static str {
        match self {
            MarkerKind::Image { .. } => "image",
            MarkerKind::Html { .. } => "html",
            MarkerKind::Layer { .. } => "layer",
            MarkerKind::Polygon { .. } => "polygon",
            MarkerKind::Polyline { .. } => "polyline",
        }
    }

    fn placements(&self) -> Vec<Placement> {
        match self {
            MarkerKind::Image { position, .. }
            | MarkerKind::Html { position, .. }
            | MarkerKind::Layer { position, .. } => position.iter().copied().collect(),
            MarkerKind::Polygon { points } | MarkerKind::Polyline { points } => points.clone(),
        }
    }

    fn min_points(&self) -> usize {
        match self {
            MarkerKind::Polygon { .. } => 3,
            MarkerKind::Polyline { .. } => 2,
            _ => 1,
        }
    }
}

fn visible_by_default() -> bool {
    true
}

/// A marker as declared by the host or a configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkerConfig {
    pub id: String,
    #[serde(flatten)]
    pub kind: MarkerKind,
    #[serde(default)]
    pub anchor: Anchor,
    #[serde(default)]
    pub width: Option<f64>,
    #[serde(default)]
    pub height: Option<f64>,
    #[serde(default = "visible_by_default")]
    pub visible: bool,
    #[serde(default)]
    pub tooltip: Option<String>,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
}

impl MarkerConfig {
    pub fn new(id: impl Into<String>, kind: MarkerKind) -> Self {
        Self {
            id: id.into(),
            kind,
            anchor: Anchor::default(),
            width: None,
            height: None,
            visible: true,
            tooltip: None,
            data: None,
        }
    }

    pub fn with_size(mut self, width: f64, height: f64) -> Self {
        self.width = Some(width);
        self.height = Some(height);
        self
    }

    pub fn with_anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn with_tooltip(mut self, tooltip: impl Into<String>) -> Self {
        self.tooltip = Some(tooltip.into());
        self
    }

    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }
}

/// Partial update for [`MarkerRegistry::update`]. Unset fields keep their value.
#[derive(Debug, Clone, Default)]
pub struct MarkerUpdate {
    pub kind: Option<MarkerKind>,
    pub anchor: Option<Anchor>,
    pub size: Option<Size>,
    pub visible: Option<bool>,
    pub tooltip: Option<Option<String>>,
    pub data: Option<serde_json::Value>,
}

impl MarkerUpdate {
    pub fn kind(mut self, kind: MarkerKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn anchor(mut self, anchor: Anchor) -> Self {
        self.anchor = Some(anchor);
        self
    }

    pub fn size(mut self, width: f64, height: f64) -> Self {
        self.size = Some(Size::new(width, height));
        self
    }

    pub fn visible(mut self, visible: bool) -> Self {
        self.visible = Some(visible);
        self
    }

    pub fn tooltip(mut self, tooltip: Option<String>) -> Self {
        self.tooltip = Some(tooltip);
        self
    }

    pub fn data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    fn apply(self, config: &MarkerConfig) -> Result<MarkerConfig> {
        let mut next = config.clone();
        if let Some(kind) = self.kind {
            if discriminant(&kind) != discriminant(&config.kind) {
                return Err(ViewerError::MarkerTypeChange(config.id.clone()));
            }
            next.kind = kind;
        }
        if let Some(anchor) = self.anchor {
            next.anchor = anchor;
        }
        if let Some(size) = self.size {
            next.width = Some(size.width);
            next.height = Some(size.height);
        }
        if let Some(visible) = self.visible {
            next.visible = visible;
        }
        if let Some(tooltip) = self.tooltip {
            next.tooltip = tooltip;
        }
        if let Some(data) = self.data {
            next.data = Some(data);
        }
        Ok(next)
    }
}

pub trait Hideable {
    fn is_visible(&self) -> bool;
    fn set_visible(&mut self, visible: bool);

    fn show(&mut self) {
        self.set_visible(true);
    }

    fn hide(&mut self) {
        self.set_visible(false);
    }

    fn toggle(&mut self) {
        let visible = self.is_visible();
        self.set_visible(!visible);
    }
}

pub trait TooltipOwner {
    fn tooltip(&self) -> Option<&str>;
    fn set_tooltip(&mut self, tooltip: Option<String>);
}

/// Measures markers without an explicit size (html content).
pub trait MarkerMeasure {
    /// Size in logical pixels.
    fn measure(&self, marker: &Marker) -> Size;
}

impl<F: Fn(&Marker) -> Size> MarkerMeasure for F {
    fn measure(&self, marker: &Marker) -> Size {
        self(marker)
    }
}

/// Rough monospace estimate of html marker content, used when the host has no
/// better measure.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextMeasure {
    pub char_width: f64,
    pub line_height: f64,
    pub padding: f64,
}

impl Default for TextMeasure {
    fn default() -> Self {
        Self {
            char_width: 8.0,
            line_height: 16.0,
            padding: 8.0,
        }
    }
}

impl MarkerMeasure for TextMeasure {
    fn measure(&self, marker: &Marker) -> Size {
        let text = match &marker.config.kind {
            MarkerKind::Html { html, .. } => html.as_str(),
            _ => "",
        };
        let lines = text.lines().count().max(1);
        let longest = text.lines().map(|l| l.chars().count()).max().unwrap_or(0);
        Size::new(
            longest as f64 * self.char_width + 2.0 * self.padding,
            lines as f64 * self.line_height + 2.0 * self.padding,
        )
    }
}

/// A validated marker with its resolved positions.
#[derive(Debug)]
pub struct Marker {
    config: MarkerConfig,
    positions: Vec<Position>,
    positions_3d: Vec<DVec3>,
    measured: OnceCell<Size>,
}

impl Marker {
    /// Validate `config` and resolve its placements against the current panorama.
    pub fn new(config: MarkerConfig, panorama: Option<&PanoramaKind>) -> Result<Self> {
        let placements = config.kind.placements();
        if placements.len() < config.kind.min_points() {
            return Err(ViewerError::MissingMarkerPosition(config.id.clone()));
        }
        if matches!(config.kind, MarkerKind::Image { .. } | MarkerKind::Layer { .. })
            && (config.width.is_none() || config.height.is_none())
        {
            return Err(ViewerError::MissingMarkerSize(config.id.clone()));
        }

        let positions = placements
            .iter()
            .map(|p| p.resolve(panorama))
            .collect::<Result<Vec<_>>>()?;
        let positions_3d = positions.iter().copied().map(spherical_to_vector3).collect();

        Ok(Self {
            config,
            positions,
            positions_3d,
            measured: OnceCell::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    pub fn config(&self) -> &MarkerConfig {
        &self.config
    }

    pub fn kind(&self) -> &MarkerKind {
        &self.config.kind
    }

    pub fn positions(&self) -> &[Position] {
        &self.positions
    }

    /// Scene-space points, one per position.
    pub fn positions_3d(&self) -> &[DVec3] {
        &self.positions_3d
    }

    pub fn is_poly(&self) -> bool {
        matches!(
            self.config.kind,
            MarkerKind::Polygon { .. } | MarkerKind::Polyline { .. }
        )
    }

    pub fn is_polygon(&self) -> bool {
        matches!(self.config.kind, MarkerKind::Polygon { .. })
    }

    pub fn anchor(&self) -> Anchor {
        self.config.anchor
    }

    /// Pixel size of a point marker: the configured one, or the measured one cached on
    /// first use. Poly markers have no size.
    pub fn size(&self, measure: &dyn MarkerMeasure, pixel_ratio: f64) -> Option<Size> {
        if self.is_poly() {
            return None;
        }
        let base = match (self.config.width, self.config.height) {
            (Some(width), Some(height)) => Size::new(width, height),
            _ => *self.measured.get_or_init(|| {
                let size = measure.measure(self);
                log::debug!("measured marker {}: {}x{}", self.config.id, size.width, size.height);
                size
            }),
        };
        Some(base.scaled(pixel_ratio))
    }

    fn uses_texture_coords(&self) -> bool {
        self.config.kind.placements().iter().any(Placement::is_texture)
    }
}

impl Hideable for Marker {
    fn is_visible(&self) -> bool {
        self.config.visible
    }

    fn set_visible(&mut self, visible: bool) {
        self.config.visible = visible;
    }
}

impl TooltipOwner for Marker {
    fn tooltip(&self) -> Option<&str> {
        self.config.tooltip.as_deref()
    }

    fn set_tooltip(&mut self, tooltip: Option<String>) {
        self.config.tooltip = tooltip;
    }
}

/// Markers in insertion order.
#[derive(Debug, Default)]
pub struct MarkerRegistry {
    markers: Vec<Marker>,
}

impl MarkerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn index_of(&self, id: &str) -> Result<usize> {
        self.markers
            .iter()
            .position(|m| m.id() == id)
            .ok_or_else(|| ViewerError::UnknownMarker(id.to_string()))
    }

    pub fn add(&mut self, config: MarkerConfig, panorama: Option<&PanoramaKind>) -> Result<&Marker> {
        if self.index_of(&config.id).is_ok() {
            return Err(ViewerError::DuplicateMarker(config.id));
        }
        let marker = Marker::new(config, panorama)?;
        log::debug!("marker {} added ({})", marker.id(), marker.kind().name());
        self.markers.push(marker);
        Ok(&self.markers[self.markers.len() - 1])
    }

    pub fn remove(&mut self, id: &str) -> Result<Marker> {
        let index = self.index_of(id)?;
        log::debug!("marker {} removed", id);
        Ok(self.markers.remove(index))
    }

    /// Apply `update`; the marker is rebuilt, so a dynamic size is measured again.
    pub fn update(
        &mut self,
        id: &str,
        update: MarkerUpdate,
        panorama: Option<&PanoramaKind>,
    ) -> Result<&Marker> {
        let index = self.index_of(id)?;
        let config = update.apply(&self.markers[index].config)?;
        self.markers[index] = Marker::new(config, panorama)?;
        Ok(&self.markers[index])
    }

    pub fn get(&self, id: &str) -> Result<&Marker> {
        self.index_of(id).map(|i| &self.markers[i])
    }

    pub fn get_mut(&mut self, id: &str) -> Result<&mut Marker> {
        let index = self.index_of(id)?;
        Ok(&mut self.markers[index])
    }

    /// Drop every marker, returning the removed ids.
    pub fn clear(&mut self) -> Vec<String> {
        self.markers.drain(..).map(|m| m.config.id).collect()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = &Marker> {
        self.markers.iter()
    }

    pub fn len(&self) -> usize {
        self.markers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.markers.is_empty()
    }

    /// Re-resolve texture placements after the panorama changed.
    pub fn relocate(&mut self, panorama: Option<&PanoramaKind>) {
        for marker in self.markers.iter_mut().filter(|m| m.uses_texture_coords()) {
            match Marker::new(marker.config.clone(), panorama) {
                Ok(relocated) => *marker = relocated,
                Err(err) => log::warn!("marker {} kept its previous position: {}", marker.id(), err),
            }
        }
    }
}
