use foundation::{HandlerId, LngLat, LngLatBounds};
use serde_json::Value;

use crate::error::SurfaceError;
use crate::event::{EventKind, ScreenPoint};
use crate::feature::{FeatureRef, FeatureState, QueriedFeature, RenderedFeature};
use crate::style::{SourceSpec, StyleLayer, StyleLayerInfo};

/// Imperative map engine the reconciler drives.
///
/// Layer and source mutations are rejected with [`SurfaceError::StyleNotLoaded`]
/// until [`is_style_loaded`](RenderSurface::is_style_loaded) reports true.
pub trait RenderSurface {
    fn is_style_loaded(&self) -> bool;

    fn add_source(&mut self, source: &SourceSpec) -> Result<(), SurfaceError>;
    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError>;
    fn has_source(&self, id: &str) -> bool;

    /// Inserts `layer` directly below `before`, or on top when `None`.
    fn add_layer(&mut self, layer: &StyleLayer, before: Option<&str>) -> Result<(), SurfaceError>;
    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError>;
    fn get_layer(&self, id: &str) -> Option<StyleLayerInfo>;
    /// Every layer in the current style, bottom to top.
    fn style_layers(&self) -> Vec<StyleLayerInfo>;

    fn set_filter(&mut self, layer: &str, filter: Option<&Value>) -> Result<(), SurfaceError>;
    fn set_paint_property(&mut self, layer: &str, name: &str, value: &Value) -> Result<(), SurfaceError>;
    fn set_layout_property(&mut self, layer: &str, name: &str, value: &Value) -> Result<(), SurfaceError>;
    fn set_feature_state(&mut self, feature: &FeatureRef, state: FeatureState) -> Result<(), SurfaceError>;

    /// Features of `source_layer` currently loaded in `source`, in any tile.
    fn query_source_features(&self, source: &str, source_layer: &str) -> Vec<QueriedFeature>;
    /// Features rendered under `point`, topmost first.
    fn query_rendered_features(&self, point: ScreenPoint) -> Vec<RenderedFeature>;

    /// Asks the surface to forward `kind` events, optionally scoped to a layer.
    fn on(&mut self, kind: EventKind, layer: Option<&str>) -> HandlerId;
    fn off(&mut self, handler: HandlerId);

    fn zoom(&self) -> f64;
    fn center(&self) -> LngLat;
    fn bounds(&self) -> LngLatBounds;
}
