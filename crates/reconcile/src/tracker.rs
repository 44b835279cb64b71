use foundation::{FeatureId, Generation};
use layers::GroupKind;
use runtime::{BoundedRetry, RetryStep, TimerId};
use surface::{FeatureRef, FeatureState, RenderSurface, RenderedLayer, ScreenPoint};
use tracing::{debug, warn};

use crate::context::{Continuation, MapContext};
use crate::events::HostEvent;
use crate::layer_set::LayerSet;
use crate::options::EngineOptions;

/// Programmatic selection still looking for its feature.
#[derive(Debug)]
struct PendingSelect {
    generation: Generation,
    retry: BoundedRetry,
    timer: Option<TimerId>,
}

/// Owns per-feature hover and click state on the surface.
///
/// At most one feature is hovered across all groups. Feature refs never
/// outlive the layer set they were resolved against; the host-facing
/// `selected_id` does, and is re-resolved after every rebuild.
#[derive(Debug, Default)]
pub struct SelectionTracker {
    hover: Option<(GroupKind, FeatureRef)>,
    selection: Option<(GroupKind, FeatureRef)>,
    selected_id: Option<String>,
    /// `selected_id` came from configuration and the host has not been told
    /// it was found yet.
    unreported: bool,
    pending: Option<PendingSelect>,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn hovered(&self) -> Option<&FeatureRef> {
        self.hover.as_ref().map(|(_, f)| f)
    }

    pub fn selection(&self) -> Option<&FeatureRef> {
        self.selection.as_ref().map(|(_, f)| f)
    }

    pub fn selected_id(&self) -> Option<&str> {
        self.selected_id.as_deref()
    }

    /// Whether a programmatic selection is still being resolved.
    pub fn is_resolving(&self) -> bool {
        self.pending.as_ref().is_some_and(|p| p.timer.is_some())
    }

    pub fn on_mouse_move<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        group: GroupKind,
        layers: &LayerSet,
        layer_id: &str,
        feature_id: FeatureId,
    ) {
        if !layers.all_loaded() || !layers.is_pickable(layer_id) {
            return;
        }
        let Some(spec) = layers.get(layer_id) else {
            return;
        };
        let next = FeatureRef::new(spec.id.clone(), spec.source_layer.clone(), feature_id);
        if self.hovered() == Some(&next) {
            return;
        }
        if let Some((_, prev)) = self.hover.take() {
            set_state(ctx, &prev, FeatureState::hover(false));
        }
        set_state(ctx, &next, FeatureState::hover(true));
        self.hover = Some((group, next));
    }

    pub fn on_mouse_leave<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>, layer_id: &str) {
        if self
            .hover
            .as_ref()
            .is_some_and(|(_, f)| f.layer_id == layer_id)
            && let Some((_, prev)) = self.hover.take()
        {
            set_state(ctx, &prev, FeatureState::hover(false));
        }
    }

    /// Resolves the topmost non-basemap feature under `point` and toggles the
    /// selection.
    pub fn on_click<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        point: ScreenPoint,
        groups: &[(GroupKind, &LayerSet)],
    ) {
        let hits = ctx.surface.query_rendered_features(point);
        let Some(hit) = hits
            .into_iter()
            .find(|h| !is_basemap(&h.layer, &ctx.options))
        else {
            if self.selected_id.is_some() {
                self.deselect(ctx);
            }
            return;
        };
        let Some(external) = hit.feature.property_str(&ctx.options.id_property) else {
            debug!(layer = %hit.layer.id, "clicked feature has no id property");
            return;
        };
        if self.selected_id.as_deref() == Some(external.as_str()) {
            self.deselect(ctx);
            return;
        }

        self.clear_click(ctx);
        self.cancel_pending(ctx);
        let owner = groups.iter().find_map(|(group, set)| {
            if !set.all_loaded() {
                return None;
            }
            let spec = set.owner_of(&hit.layer.id)?;
            set.is_pickable(&spec.id).then_some((*group, spec))
        });
        if let Some((group, spec)) = owner
            && let Some(id) = hit.feature.id
        {
            let clicked = FeatureRef::new(spec.id.clone(), spec.source_layer.clone(), id);
            set_state(ctx, &clicked, FeatureState::click(true));
            self.selection = Some((group, clicked));
        }
        self.selected_id = Some(external.clone());
        self.unreported = false;
        ctx.emit(HostEvent::Selection {
            feature_id: Some(external),
            source_layer: hit.layer.source_layer.clone(),
        });
    }

    /// Selects the feature whose id property equals `id` once it can be found
    /// in the choropleth layer set, and reports it to the host when it is.
    pub fn select_external<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        id: String,
        generation: Generation,
        layers: &LayerSet,
    ) {
        if self.selected_id.as_deref() == Some(id.as_str())
            && (self.selection.is_some() || self.pending.is_some())
        {
            return;
        }
        self.clear_click(ctx);
        self.cancel_pending(ctx);
        self.selected_id = Some(id);
        self.unreported = true;
        self.start_resolve(ctx, generation, layers);
    }

    /// Drops the programmatic selection without notifying the host.
    pub fn clear_external<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) {
        self.clear_click(ctx);
        self.cancel_pending(ctx);
        self.selected_id = None;
        self.unreported = false;
    }

    /// A retry timer fired.
    pub fn on_retry<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        generation: Generation,
        layers: &LayerSet,
    ) {
        let Some(pending) = self.pending.as_mut() else {
            return;
        };
        if generation.is_stale(pending.generation) {
            debug!(%generation, "stale selection retry ignored");
            return;
        }
        pending.timer = None;
        self.attempt(ctx, layers);
    }

    /// A source finished loading tiles; try again if it can hold the feature.
    pub fn on_source_data<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        source_id: &str,
        generation: Generation,
        layers: &LayerSet,
    ) {
        let Some(pending) = &self.pending else {
            return;
        };
        if pending.generation != generation || layers.get(source_id).is_none() {
            return;
        }
        let Some(id) = self.selected_id.as_deref() else {
            return;
        };
        if let Some(found) = find_feature(&ctx.surface, layers, &ctx.options.id_property, id) {
            self.resolve(ctx, found);
        }
    }

    /// A new choropleth layer set is ready; re-resolve the retained id.
    pub fn on_layers_ready<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        generation: Generation,
        layers: &LayerSet,
    ) {
        if self.selection.is_none() && self.selected_id.is_some() {
            self.cancel_pending(ctx);
            self.start_resolve(ctx, generation, layers);
        }
    }

    /// Drops refs into `group`'s layers, which were just torn down along with
    /// their feature state.
    pub fn forget_group<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>, group: GroupKind) {
        if self.hover.as_ref().is_some_and(|(g, _)| *g == group) {
            self.hover = None;
        }
        if self.selection.as_ref().is_some_and(|(g, _)| *g == group) {
            self.selection = None;
        }
        if group == GroupKind::Choropleth {
            self.cancel_pending(ctx);
        }
    }

    /// Forgets everything without touching the surface.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn start_resolve<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        generation: Generation,
        layers: &LayerSet,
    ) {
        if !layers.is_ready() {
            return;
        }
        self.pending = Some(PendingSelect {
            generation,
            retry: BoundedRetry::new(ctx.options.select_retry_policy()),
            timer: None,
        });
        self.attempt(ctx, layers);
    }

    fn attempt<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>, layers: &LayerSet) {
        let (Some(pending), Some(id)) = (self.pending.as_mut(), self.selected_id.as_deref()) else {
            return;
        };
        let surface = &ctx.surface;
        let property = ctx.options.id_property.as_str();
        match pending
            .retry
            .attempt(|| find_feature(surface, layers, property, id))
        {
            RetryStep::Done(found) => self.resolve(ctx, found),
            RetryStep::RetryAfter(delay) => {
                let generation = pending.generation;
                pending.timer = Some(ctx.schedule(delay, Continuation::SelectRetry { generation }));
            }
            RetryStep::Exhausted => {
                debug!(
                    id,
                    attempts = pending.retry.attempts(),
                    "selected feature not found; giving up"
                );
            }
        }
    }

    fn resolve<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>, found: FeatureRef) {
        self.cancel_pending(ctx);
        set_state(ctx, &found, FeatureState::click(true));
        debug!(layer = %found.layer_id, "programmatic selection resolved");
        if std::mem::take(&mut self.unreported) {
            ctx.emit(HostEvent::Selection {
                feature_id: self.selected_id.clone(),
                source_layer: Some(found.source_layer.clone()),
            });
        }
        self.selection = Some((GroupKind::Choropleth, found));
    }

    fn deselect<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) {
        self.clear_click(ctx);
        self.cancel_pending(ctx);
        self.selected_id = None;
        self.unreported = false;
        ctx.emit(HostEvent::deselection());
    }

    fn clear_click<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) {
        if let Some((_, prev)) = self.selection.take() {
            set_state(ctx, &prev, FeatureState::click(false));
        }
    }

    fn cancel_pending<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) {
        if let Some(pending) = self.pending.take()
            && let Some(timer) = pending.timer
        {
            ctx.timers.cancel(timer);
        }
    }
}

fn is_basemap(layer: &RenderedLayer, options: &EngineOptions) -> bool {
    let namespaced = layer.metadata.as_ref().is_some_and(|meta| {
        meta.keys()
            .any(|k| k.starts_with(options.basemap_metadata_prefix.as_str()))
    });
    namespaced || layer.id == options.basemap_fallback_layer
}

/// Searches only the sources of `layers`.
fn find_feature<S: RenderSurface>(
    surface: &S,
    layers: &LayerSet,
    property: &str,
    id: &str,
) -> Option<FeatureRef> {
    layers.specs().find_map(|spec| {
        surface
            .query_source_features(&spec.id, &spec.source_layer)
            .into_iter()
            .filter(|f| f.property_str(property).as_deref() == Some(id))
            .find_map(|f| f.id)
            .map(|fid| FeatureRef::new(spec.id.clone(), spec.source_layer.clone(), fid))
    })
}

fn set_state<S: RenderSurface>(ctx: &mut MapContext<S>, feature: &FeatureRef, state: FeatureState) {
    if let Err(err) = ctx.surface.set_feature_state(feature, state) {
        warn!(layer = %feature.layer_id, %err, "failed to set feature state");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use catalog::{TilesetCatalog, VectorLayerInfo};
    use config::FeatureStyle;
    use foundation::Time;
    use layers::{LayerSpec, derive_layer_specs};
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::sync::Arc;
    use surface::{HeadlessSurface, LayerKind, QueriedFeature, RenderedFeature, StyleLayerInfo};

    use crate::cycle::ReconcileCycle;

    fn built(names: &[&str], pickable: bool) -> (MapContext<HeadlessSurface>, ReconcileCycle) {
        let surface = HeadlessSurface::new().with_basemap([
            StyleLayerInfo::new("water", LayerKind::Other),
            StyleLayerInfo::new("building", LayerKind::Fill),
        ]);
        let mut ctx = MapContext::new(surface, EngineOptions::default());
        let catalog = TilesetCatalog::new(
            "mapbox://city.t",
            names.iter().map(|n| VectorLayerInfo::new(*n, 0.0, 22.0)).collect(),
        );
        let specs: Arc<[LayerSpec]> =
            derive_layer_specs(GroupKind::Choropleth, &catalog, &FeatureStyle::default()).into();
        let mut cycle = ReconcileCycle::new(GroupKind::Choropleth);
        cycle.request(&mut ctx, specs, pickable);
        (ctx, cycle)
    }

    fn feature(id: u64, external: &str) -> QueriedFeature {
        QueriedFeature {
            id: Some(FeatureId(id)),
            properties: json!({ "ID": external }).as_object().cloned().unwrap(),
        }
    }

    fn hit(layer: &str, id: u64, external: &str) -> RenderedFeature {
        RenderedFeature {
            feature: feature(id, external),
            layer: RenderedLayer {
                id: layer.into(),
                source: layer.into(),
                source_layer: Some(layer.into()),
                metadata: None,
            },
        }
    }

    #[test]
    fn hover_moves_between_features() {
        let (mut ctx, cycle) = built(&["a", "b"], true);
        let mut tracker = SelectionTracker::new();
        let g = GroupKind::Choropleth;
        tracker.on_mouse_move(&mut ctx, g, cycle.layers(), "a", FeatureId(1));
        tracker.on_mouse_move(&mut ctx, g, cycle.layers(), "b", FeatureId(2));
        assert_eq!(ctx.surface.hovered(), vec![("b".to_string(), FeatureId(2))]);

        tracker.on_mouse_leave(&mut ctx, "a");
        assert_eq!(ctx.surface.hovered().len(), 1);
        tracker.on_mouse_leave(&mut ctx, "b");
        assert!(ctx.surface.hovered().is_empty());
        assert_eq!(tracker.hovered(), None);
    }

    #[test]
    fn hover_ignored_on_unpickable_layers() {
        let (mut ctx, cycle) = built(&["a"], false);
        let mut tracker = SelectionTracker::new();
        tracker.on_mouse_move(&mut ctx, GroupKind::Choropleth, cycle.layers(), "a", FeatureId(1));
        assert!(ctx.surface.hovered().is_empty());
    }

    #[test]
    fn basemap_hits_are_skipped() {
        let (mut ctx, cycle) = built(&["a"], true);
        let mut basemap = hit("water", 9, "w");
        basemap.layer.metadata = json!({"mapbox:group": "x"}).as_object().cloned();
        ctx.surface.set_rendered(vec![basemap, hit("a", 1, "A1")]);
        let mut tracker = SelectionTracker::new();
        tracker.on_click(
            &mut ctx,
            ScreenPoint::default(),
            &[(GroupKind::Choropleth, cycle.layers())],
        );
        assert_eq!(tracker.selected_id(), Some("A1"));
        assert_eq!(ctx.surface.clicked(), vec![("a".to_string(), FeatureId(1))]);
    }

    #[test]
    fn external_id_resolves_after_retries() {
        let (mut ctx, cycle) = built(&["a"], true);
        let mut tracker = SelectionTracker::new();
        tracker.select_external(&mut ctx, "42".into(), cycle.generation(), cycle.layers());
        assert!(tracker.is_resolving());
        assert_eq!(ctx.surface.source_query_count(), 1);

        ctx.surface.load_features("a", "a", vec![feature(7, "42")]);
        ctx.set_now(Time::from_millis(250));
        let (_, due) = ctx.timers.pop_due(ctx.now()).unwrap();
        tracker.on_retry(&mut ctx, due.generation(), cycle.layers());

        assert_eq!(tracker.selection().map(|f| f.feature_id), Some(FeatureId(7)));
        assert!(!tracker.is_resolving());
        assert!(ctx.timers.is_empty());
    }

    #[test]
    fn source_data_short_circuits_the_retry() {
        let (mut ctx, cycle) = built(&["a"], true);
        let mut tracker = SelectionTracker::new();
        tracker.select_external(&mut ctx, "42".into(), cycle.generation(), cycle.layers());
        ctx.surface.load_features("a", "a", vec![feature(7, "42")]);
        tracker.on_source_data(&mut ctx, "a", cycle.generation(), cycle.layers());
        assert!(tracker.selection().is_some());
        assert!(ctx.timers.is_empty());
    }

    #[test]
    fn clearing_external_selection_resets_click_state() {
        let (mut ctx, cycle) = built(&["a"], true);
        ctx.surface.load_features("a", "a", vec![feature(7, "42")]);
        let mut tracker = SelectionTracker::new();
        tracker.select_external(&mut ctx, "42".into(), cycle.generation(), cycle.layers());
        assert_eq!(ctx.surface.clicked().len(), 1);
        tracker.clear_external(&mut ctx);
        assert!(ctx.surface.clicked().is_empty());
        assert_eq!(tracker.selected_id(), None);
        // Only the resolve was reported.
        assert_eq!(ctx.events.events().len(), 1);
    }

    #[test]
    fn resolved_external_id_is_reported_once() {
        let (mut ctx, cycle) = built(&["a"], true);
        ctx.surface.load_features("a", "a", vec![feature(7, "42")]);
        let mut tracker = SelectionTracker::new();
        tracker.select_external(&mut ctx, "42".into(), cycle.generation(), cycle.layers());
        assert_eq!(
            ctx.events.events().last().map(|e| e.event.clone()),
            Some(HostEvent::Selection {
                feature_id: Some("42".to_string()),
                source_layer: Some("a".to_string()),
            })
        );

        tracker.forget_group(&mut ctx, GroupKind::Choropleth);
        tracker.on_layers_ready(&mut ctx, cycle.generation(), cycle.layers());
        assert!(tracker.selection().is_some());
        assert_eq!(ctx.events.events().len(), 1);
    }
}
