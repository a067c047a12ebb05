// events.rs — typed viewer events and the listener registry

use glam::DVec2;

use crate::coords::{Position, TexturePoint};
use crate::viewport::Sides;

/// Data attached to a click on the panorama.
#[derive(Debug, Clone, PartialEq)]
pub struct ClickData {
    /// Viewer pixel.
    pub point: DVec2,
    pub position: Option<Position>,
    /// Only for equirectangular panoramas.
    pub texture: Option<TexturePoint>,
    pub marker: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ViewerEvent {
    PositionUpdated(Position),
    ZoomUpdated(f64),
    SidesReached(Sides),
    SizeUpdated { width: f64, height: f64 },
    AutorotateChanged(bool),
    GyroscopeChanged(bool),
    PanoramaLoaded,
    PanoramaLoadFailed(String),
    Click(ClickData),
    MarkerSelected(String),
    MarkerVisibilityChanged { id: String, visible: bool },
    MarkerAdded(String),
    MarkerRemoved(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    PositionUpdated,
    ZoomUpdated,
    SidesReached,
    SizeUpdated,
    AutorotateChanged,
    GyroscopeChanged,
    PanoramaLoaded,
    PanoramaLoadFailed,
    Click,
    MarkerSelected,
    MarkerVisibilityChanged,
    MarkerAdded,
    MarkerRemoved,
}

impl ViewerEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            ViewerEvent::PositionUpdated(_) => EventKind::PositionUpdated,
            ViewerEvent::ZoomUpdated(_) => EventKind::ZoomUpdated,
            ViewerEvent::SidesReached(_) => EventKind::SidesReached,
            ViewerEvent::SizeUpdated { .. } => EventKind::SizeUpdated,
            ViewerEvent::AutorotateChanged(_) => EventKind::AutorotateChanged,
            ViewerEvent::GyroscopeChanged(_) => EventKind::GyroscopeChanged,
            ViewerEvent::PanoramaLoaded => EventKind::PanoramaLoaded,
            ViewerEvent::PanoramaLoadFailed(_) => EventKind::PanoramaLoadFailed,
            ViewerEvent::Click(_) => EventKind::Click,
            ViewerEvent::MarkerSelected(_) => EventKind::MarkerSelected,
            ViewerEvent::MarkerVisibilityChanged { .. } => EventKind::MarkerVisibilityChanged,
            ViewerEvent::MarkerAdded(_) => EventKind::MarkerAdded,
            ViewerEvent::MarkerRemoved(_) => EventKind::MarkerRemoved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Box<dyn FnMut(&ViewerEvent)>;

/// Ordered listener registry. Listeners run in registration order.
#[derive(Default)]
pub struct EventBus {
    next_id: u64,
    listeners: Vec<(ListenerId, Option<EventKind>, Listener)>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Listen to one kind of event.
    pub fn on(&mut self, kind: EventKind, listener: impl FnMut(&ViewerEvent) + 'static) -> ListenerId {
        self.register(Some(kind), Box::new(listener))
    }

    /// Listen to every event.
    pub fn on_any(&mut self, listener: impl FnMut(&ViewerEvent) + 'static) -> ListenerId {
        self.register(None, Box::new(listener))
    }

    fn register(&mut self, kind: Option<EventKind>, listener: Listener) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);
        self.listeners.push((id, kind, listener));
        id
    }

    pub fn off(&mut self, id: ListenerId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(lid, _, _)| *lid != id);
        self.listeners.len() != before
    }

    pub fn dispatch(&mut self, event: &ViewerEvent) {
        let kind = event.kind();
        for (_, filter, listener) in self.listeners.iter_mut() {
            if filter.map_or(true, |k| k == kind) {
                listener(event);
            }
        }
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }
}
