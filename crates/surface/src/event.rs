use foundation::FeatureId;

use crate::feature::RenderedFeature;

/// Screen position in CSS pixels.
#[derive(Debug, Copy, Clone, Default, PartialEq)]
pub struct ScreenPoint {
    pub x: f64,
    pub y: f64,
}

impl ScreenPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// Event kinds a subscription can be registered for.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EventKind {
    StyleLoaded,
    SourceData,
    MouseMove,
    MouseLeave,
    Click,
    MoveEnd,
}

/// Events the host forwards from the surface into the engine.
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceEvent {
    StyleLoaded,
    SourceData {
        source_id: String,
        is_source_loaded: bool,
    },
    /// Pointer moved over `layer_id`; features are topmost first.
    MouseMove {
        layer_id: String,
        features: Vec<RenderedFeature>,
    },
    MouseLeave {
        layer_id: String,
    },
    Click {
        point: ScreenPoint,
    },
    MoveEnd,
    /// The surface was destroyed by its owner.
    Removed,
}

impl SurfaceEvent {
    /// Id of the first feature under the pointer, for move events.
    pub fn first_feature_id(&self) -> Option<FeatureId> {
        match self {
            SurfaceEvent::MouseMove { features, .. } => features.first()?.feature.id,
            _ => None,
        }
    }
}
