use std::cell::Cell;
use std::collections::{BTreeMap, VecDeque};

use foundation::{FeatureId, HandlerId, LngLat, LngLatBounds};
use serde_json::Value;

use crate::error::SurfaceError;
use crate::event::{EventKind, ScreenPoint};
use crate::feature::{FeatureRef, FeatureState, QueriedFeature, RenderedFeature};
use crate::style::{PropertyMap, SourceSpec, StyleLayer, StyleLayerInfo};
use crate::surface::RenderSurface;

/// One recorded mutation against a [`HeadlessSurface`].
#[derive(Debug, Clone, PartialEq)]
pub enum SurfaceCall {
    AddSource(String),
    RemoveSource(String),
    AddLayer { id: String, before: Option<String> },
    RemoveLayer(String),
    SetFilter { layer: String, filter: Option<Value> },
    SetPaint { layer: String, name: String, value: Value },
    SetLayout { layer: String, name: String, value: Value },
    SetFeatureState { feature: FeatureRef, state: FeatureState },
    On { kind: EventKind, layer: Option<String> },
    Off(HandlerId),
}

#[derive(Debug, Clone)]
struct LayerEntry {
    info: StyleLayerInfo,
    basemap: bool,
    source: Option<String>,
    filter: Option<Value>,
    paint: PropertyMap,
    layout: PropertyMap,
}

type StateKey = (String, String, FeatureId);

/// In-memory [`RenderSurface`] that records every call it receives.
///
/// Basemap layers are supplied up front. Tests flip the style-loaded flag,
/// load source features and stage pointer hits to drive the engine.
#[derive(Debug)]
pub struct HeadlessSurface {
    style_loaded: bool,
    layers: Vec<LayerEntry>,
    sources: BTreeMap<String, SourceSpec>,
    features: BTreeMap<(String, String), Vec<QueriedFeature>>,
    states: BTreeMap<StateKey, FeatureState>,
    handlers: BTreeMap<HandlerId, (EventKind, Option<String>)>,
    next_handler: u64,
    rendered: Vec<RenderedFeature>,
    source_queries: Cell<u32>,
    failures: VecDeque<(String, SurfaceError)>,
    zoom: f64,
    center: LngLat,
    bounds: LngLatBounds,
    calls: Vec<SurfaceCall>,
}

impl Default for HeadlessSurface {
    fn default() -> Self {
        Self::new()
    }
}

impl HeadlessSurface {
    /// A loaded surface with an empty basemap.
    pub fn new() -> Self {
        Self {
            style_loaded: true,
            layers: Vec::new(),
            sources: BTreeMap::new(),
            features: BTreeMap::new(),
            states: BTreeMap::new(),
            handlers: BTreeMap::new(),
            next_handler: 1,
            rendered: Vec::new(),
            source_queries: Cell::new(0),
            failures: VecDeque::new(),
            zoom: 12.0,
            center: LngLat::default(),
            bounds: LngLatBounds::new(LngLat::default(), LngLat::default()),
            calls: Vec::new(),
        }
    }

    /// Appends basemap layers, bottom to top.
    pub fn with_basemap(mut self, layers: impl IntoIterator<Item = StyleLayerInfo>) -> Self {
        for info in layers {
            self.layers.push(LayerEntry {
                info,
                basemap: true,
                source: None,
                filter: None,
                paint: PropertyMap::new(),
                layout: PropertyMap::new(),
            });
        }
        self
    }

    pub fn set_style_loaded(&mut self, loaded: bool) {
        self.style_loaded = loaded;
    }

    pub fn set_camera(&mut self, center: LngLat, zoom: f64, bounds: LngLatBounds) {
        self.center = center;
        self.zoom = zoom;
        self.bounds = bounds;
    }

    /// Makes `features` queryable from `source`/`source_layer`.
    pub fn load_features(
        &mut self,
        source: impl Into<String>,
        source_layer: impl Into<String>,
        features: Vec<QueriedFeature>,
    ) {
        self.features
            .insert((source.into(), source_layer.into()), features);
    }

    /// Features the next `query_rendered_features` call returns.
    pub fn set_rendered(&mut self, features: Vec<RenderedFeature>) {
        self.rendered = features;
    }

    /// The next `add_layer` for `layer_id` fails with `error`.
    pub fn fail_add_layer(&mut self, layer_id: impl Into<String>, error: SurfaceError) {
        self.failures.push_back((layer_id.into(), error));
    }

    pub fn calls(&self) -> &[SurfaceCall] {
        &self.calls
    }

    pub fn take_calls(&mut self) -> Vec<SurfaceCall> {
        std::mem::take(&mut self.calls)
    }

    /// Every layer id, bottom to top.
    pub fn layer_ids(&self) -> Vec<String> {
        self.layers.iter().map(|l| l.info.id.clone()).collect()
    }

    /// Ids of layers added through [`RenderSurface::add_layer`], bottom to top.
    pub fn app_layer_ids(&self) -> Vec<String> {
        self.layers
            .iter()
            .filter(|l| !l.basemap)
            .map(|l| l.info.id.clone())
            .collect()
    }

    /// Number of `query_source_features` calls so far.
    pub fn source_query_count(&self) -> u32 {
        self.source_queries.get()
    }

    pub fn source_ids(&self) -> Vec<String> {
        self.sources.keys().cloned().collect()
    }

    pub fn paint(&self, layer: &str, name: &str) -> Option<&Value> {
        self.entry(layer)?.paint.get(name)
    }

    pub fn layout(&self, layer: &str, name: &str) -> Option<&Value> {
        self.entry(layer)?.layout.get(name)
    }

    pub fn filter(&self, layer: &str) -> Option<&Value> {
        self.entry(layer)?.filter.as_ref()
    }

    pub fn feature_state(&self, feature: &FeatureRef) -> FeatureState {
        self.states
            .get(&state_key(feature))
            .copied()
            .unwrap_or_default()
    }

    /// Features whose `hover` state is currently true.
    pub fn hovered(&self) -> Vec<(String, FeatureId)> {
        self.flagged(|s| s.hover == Some(true))
    }

    /// Features whose `click` state is currently true.
    pub fn clicked(&self) -> Vec<(String, FeatureId)> {
        self.flagged(|s| s.click == Some(true))
    }

    pub fn active_handlers(&self) -> Vec<(EventKind, Option<String>)> {
        self.handlers.values().cloned().collect()
    }

    fn flagged(&self, pred: impl Fn(&FeatureState) -> bool) -> Vec<(String, FeatureId)> {
        self.states
            .iter()
            .filter(|(_, s)| pred(s))
            .map(|((source, _, id), _)| (source.clone(), *id))
            .collect()
    }

    fn entry(&self, id: &str) -> Option<&LayerEntry> {
        self.layers.iter().find(|l| l.info.id == id)
    }

    fn entry_mut(&mut self, id: &str) -> Result<&mut LayerEntry, SurfaceError> {
        self.layers
            .iter_mut()
            .find(|l| l.info.id == id)
            .ok_or_else(|| SurfaceError::UnknownLayer(id.to_string()))
    }

    fn ensure_loaded(&self) -> Result<(), SurfaceError> {
        if self.style_loaded {
            Ok(())
        } else {
            Err(SurfaceError::StyleNotLoaded)
        }
    }
}

fn state_key(feature: &FeatureRef) -> StateKey {
    (
        feature.layer_id.clone(),
        feature.source_layer.clone(),
        feature.feature_id,
    )
}

impl RenderSurface for HeadlessSurface {
    fn is_style_loaded(&self) -> bool {
        self.style_loaded
    }

    fn add_source(&mut self, source: &SourceSpec) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::AddSource(source.id.clone()));
        self.ensure_loaded()?;
        if self.sources.contains_key(&source.id) {
            return Err(SurfaceError::DuplicateSource(source.id.clone()));
        }
        self.sources.insert(source.id.clone(), source.clone());
        Ok(())
    }

    fn remove_source(&mut self, id: &str) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::RemoveSource(id.to_string()));
        self.ensure_loaded()?;
        if self
            .layers
            .iter()
            .any(|l| l.source.as_deref() == Some(id))
        {
            return Err(SurfaceError::Engine(format!(
                "source {id} is still used by a layer"
            )));
        }
        if self.sources.remove(id).is_none() {
            return Err(SurfaceError::UnknownSource(id.to_string()));
        }
        // Feature ids are only valid while their source is attached.
        self.states.retain(|(source, _, _), _| source != id);
        Ok(())
    }

    fn has_source(&self, id: &str) -> bool {
        self.sources.contains_key(id)
    }

    fn add_layer(&mut self, layer: &StyleLayer, before: Option<&str>) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::AddLayer {
            id: layer.id.clone(),
            before: before.map(str::to_string),
        });
        if let Some(pos) = self.failures.iter().position(|(id, _)| *id == layer.id)
            && let Some((_, err)) = self.failures.remove(pos)
        {
            return Err(err);
        }
        self.ensure_loaded()?;
        if self.entry(&layer.id).is_some() {
            return Err(SurfaceError::DuplicateLayer(layer.id.clone()));
        }
        if !self.sources.contains_key(&layer.source) {
            return Err(SurfaceError::UnknownSource(layer.source.clone()));
        }
        let index = match before {
            Some(anchor) => self
                .layers
                .iter()
                .position(|l| l.info.id == anchor)
                .ok_or_else(|| SurfaceError::UnknownLayer(anchor.to_string()))?,
            None => self.layers.len(),
        };
        self.layers.insert(
            index,
            LayerEntry {
                info: StyleLayerInfo::new(layer.id.clone(), layer.kind),
                basemap: false,
                source: Some(layer.source.clone()),
                filter: None,
                paint: layer.paint.clone(),
                layout: layer.layout.clone(),
            },
        );
        Ok(())
    }

    fn remove_layer(&mut self, id: &str) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::RemoveLayer(id.to_string()));
        self.ensure_loaded()?;
        let pos = self
            .layers
            .iter()
            .position(|l| l.info.id == id)
            .ok_or_else(|| SurfaceError::UnknownLayer(id.to_string()))?;
        self.layers.remove(pos);
        Ok(())
    }

    fn get_layer(&self, id: &str) -> Option<StyleLayerInfo> {
        self.entry(id).map(|l| l.info.clone())
    }

    fn style_layers(&self) -> Vec<StyleLayerInfo> {
        self.layers.iter().map(|l| l.info.clone()).collect()
    }

    fn set_filter(&mut self, layer: &str, filter: Option<&Value>) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::SetFilter {
            layer: layer.to_string(),
            filter: filter.cloned(),
        });
        self.entry_mut(layer)?.filter = filter.cloned();
        Ok(())
    }

    fn set_paint_property(&mut self, layer: &str, name: &str, value: &Value) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::SetPaint {
            layer: layer.to_string(),
            name: name.to_string(),
            value: value.clone(),
        });
        self.entry_mut(layer)?
            .paint
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    fn set_layout_property(&mut self, layer: &str, name: &str, value: &Value) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::SetLayout {
            layer: layer.to_string(),
            name: name.to_string(),
            value: value.clone(),
        });
        self.entry_mut(layer)?
            .layout
            .insert(name.to_string(), value.clone());
        Ok(())
    }

    fn set_feature_state(&mut self, feature: &FeatureRef, state: FeatureState) -> Result<(), SurfaceError> {
        self.calls.push(SurfaceCall::SetFeatureState {
            feature: feature.clone(),
            state,
        });
        if !self.sources.contains_key(&feature.layer_id) {
            return Err(SurfaceError::UnknownSource(feature.layer_id.clone()));
        }
        let slot = self.states.entry(state_key(feature)).or_default();
        *slot = slot.merged(state);
        Ok(())
    }

    fn query_source_features(&self, source: &str, source_layer: &str) -> Vec<QueriedFeature> {
        self.source_queries.set(self.source_queries.get() + 1);
        if !self.sources.contains_key(source) {
            return Vec::new();
        }
        self.features
            .get(&(source.to_string(), source_layer.to_string()))
            .cloned()
            .unwrap_or_default()
    }

    fn query_rendered_features(&self, _point: ScreenPoint) -> Vec<RenderedFeature> {
        self.rendered
            .iter()
            .filter(|f| self.entry(&f.layer.id).is_some())
            .cloned()
            .collect()
    }

    fn on(&mut self, kind: EventKind, layer: Option<&str>) -> HandlerId {
        self.calls.push(SurfaceCall::On {
            kind,
            layer: layer.map(str::to_string),
        });
        let id = HandlerId(self.next_handler);
        self.next_handler += 1;
        self.handlers.insert(id, (kind, layer.map(str::to_string)));
        id
    }

    fn off(&mut self, handler: HandlerId) {
        self.calls.push(SurfaceCall::Off(handler));
        self.handlers.remove(&handler);
    }

    fn zoom(&self) -> f64 {
        self.zoom
    }

    fn center(&self) -> LngLat {
        self.center
    }

    fn bounds(&self) -> LngLatBounds {
        self.bounds
    }
}
