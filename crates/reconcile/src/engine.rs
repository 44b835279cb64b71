use catalog::{CatalogSource, TilesetCatalog, TilesetRef};
use config::{ConfigSnapshot, FeatureStyle};
use foundation::{Generation, Time};
use layers::{GroupKind, SpecDeriver, stories_catalog};
use runtime::Emitted;
use serde_json::Value;
use surface::{RenderSurface, SurfaceEvent};
use tracing::{debug, info, warn};

use crate::appliers::StyleAppliers;
use crate::context::{Continuation, MapContext};
use crate::cycle::{CycleStep, ReconcileCycle};
use crate::events::{HostEvent, round_to};
use crate::layer_set::LayerSet;
use crate::options::EngineOptions;
use crate::tracker::SelectionTracker;

#[derive(Debug)]
struct LayerGroup {
    cycle: ReconcileCycle,
    deriver: SpecDeriver,
    tileset: Option<TilesetRef>,
    catalog: Option<TilesetCatalog>,
    awaiting_catalog: bool,
}

impl LayerGroup {
    fn new(kind: GroupKind) -> Self {
        Self {
            cycle: ReconcileCycle::new(kind),
            deriver: SpecDeriver::new(),
            tileset: None,
            catalog: None,
            awaiting_catalog: false,
        }
    }
}

#[derive(Debug)]
struct Groups {
    choropleth: LayerGroup,
    heatmap: LayerGroup,
    stories: LayerGroup,
}

impl Groups {
    fn get(&self, kind: GroupKind) -> &LayerGroup {
        match kind {
            GroupKind::Choropleth => &self.choropleth,
            GroupKind::Heatmap => &self.heatmap,
            GroupKind::Stories => &self.stories,
        }
    }

    fn get_mut(&mut self, kind: GroupKind) -> &mut LayerGroup {
        match kind {
            GroupKind::Choropleth => &mut self.choropleth,
            GroupKind::Heatmap => &mut self.heatmap,
            GroupKind::Stories => &mut self.stories,
        }
    }
}

/// Reconciles the host configuration against a render surface.
#[derive(Debug)]
pub struct Engine<S> {
    ctx: MapContext<S>,
    config: ConfigSnapshot,
    groups: Groups,
    tracker: SelectionTracker,
    appliers: StyleAppliers,
}

impl<S: RenderSurface> Engine<S> {
    pub fn new(surface: S, options: EngineOptions) -> Self {
        let mut ctx = MapContext::new(surface, options);
        ctx.attach();
        Self {
            ctx,
            config: ConfigSnapshot::new(),
            groups: Groups {
                choropleth: LayerGroup::new(GroupKind::Choropleth),
                heatmap: LayerGroup::new(GroupKind::Heatmap),
                stories: LayerGroup::new(GroupKind::Stories),
            },
            tracker: SelectionTracker::new(),
            appliers: StyleAppliers::new(),
        }
    }

    pub fn surface(&self) -> &S {
        &self.ctx.surface
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.ctx.surface
    }

    pub fn context(&self) -> &MapContext<S> {
        &self.ctx
    }

    pub fn config(&self) -> &ConfigSnapshot {
        &self.config
    }

    pub fn cycle(&self, group: GroupKind) -> &ReconcileCycle {
        &self.groups.get(group).cycle
    }

    pub fn layer_set(&self, group: GroupKind) -> &LayerSet {
        self.groups.get(group).cycle.layers()
    }

    pub fn tracker(&self) -> &SelectionTracker {
        &self.tracker
    }

    pub fn now(&self) -> Time {
        self.ctx.now()
    }

    pub fn events(&self) -> &[Emitted<HostEvent>] {
        self.ctx.events.events()
    }

    pub fn drain_events(&mut self) -> Vec<Emitted<HostEvent>> {
        self.ctx.events.drain()
    }

    /// Merges a raw configuration push and reconciles every group it touches.
    pub fn push_configuration(&mut self, raw: &Value) {
        if self.ctx.is_removed() {
            debug!("surface removed; configuration ignored");
            return;
        }
        let next = self.config.merged(raw);
        let prev = std::mem::replace(&mut self.config, next);

        for group in GroupKind::ALL {
            self.sync_tileset(group);
        }
        for group in GroupKind::ALL {
            self.reconcile_group(group);
            self.apply_styles(group);
        }
        self.sync_selection(&prev);
    }

    /// Hands over the catalog for `tileset`. Returns `false` when the group
    /// has since moved to another tileset and the catalog was dropped.
    pub fn set_catalog(
        &mut self,
        group: GroupKind,
        tileset: &TilesetRef,
        catalog: TilesetCatalog,
    ) -> bool {
        if self.ctx.is_removed() {
            return false;
        }
        let state = self.groups.get_mut(group);
        if state.tileset.as_ref() != Some(tileset) {
            debug!(%group, tileset = %tileset.tileset, "dropping catalog for stale tileset");
            return false;
        }
        state.catalog = Some(catalog);
        state.awaiting_catalog = false;
        self.reconcile_group(group);
        self.apply_styles(group);
        true
    }

    /// Resolves every outstanding catalog request against `source`.
    pub fn fulfil_catalog_requests(&mut self, source: &impl CatalogSource) -> usize {
        let pending: Vec<(GroupKind, TilesetRef)> = GroupKind::ALL
            .into_iter()
            .filter_map(|group| {
                let state = self.groups.get(group);
                if !state.awaiting_catalog {
                    return None;
                }
                state.tileset.clone().map(|t| (group, t))
            })
            .collect();

        let mut resolved = 0;
        for (group, tileset) in pending {
            match source.resolve(&tileset) {
                Ok(catalog) => {
                    if self.set_catalog(group, &tileset, catalog) {
                        resolved += 1;
                    }
                }
                Err(err) => {
                    warn!(%group, tileset = %tileset.tileset, %err, "tileset catalog unavailable");
                }
            }
        }
        resolved
    }

    pub fn handle_event(&mut self, event: SurfaceEvent) {
        if self.ctx.is_removed() {
            debug!(?event, "surface removed; event ignored");
            return;
        }
        let first_feature = event.first_feature_id();
        match event {
            SurfaceEvent::StyleLoaded => {
                for group in GroupKind::ALL {
                    let state = self.groups.get_mut(group);
                    let before = state.cycle.generation();
                    let step = state.cycle.on_style_loaded(&mut self.ctx);
                    self.after_step(group, before, step);
                }
            }
            SurfaceEvent::SourceData {
                source_id,
                is_source_loaded,
            } => {
                if is_source_loaded {
                    let cycle = &self.groups.choropleth.cycle;
                    self.tracker.on_source_data(
                        &mut self.ctx,
                        &source_id,
                        cycle.generation(),
                        cycle.layers(),
                    );
                }
            }
            SurfaceEvent::MouseMove { layer_id, .. } => {
                let Some(feature_id) = first_feature else {
                    return;
                };
                for group in GroupKind::ALL {
                    let layers = self.groups.get(group).cycle.layers();
                    if layers.get(&layer_id).is_some() {
                        self.tracker
                            .on_mouse_move(&mut self.ctx, group, layers, &layer_id, feature_id);
                        break;
                    }
                }
            }
            SurfaceEvent::MouseLeave { layer_id } => {
                self.tracker.on_mouse_leave(&mut self.ctx, &layer_id);
            }
            SurfaceEvent::Click { point } => {
                let sets = [
                    (GroupKind::Choropleth, self.groups.choropleth.cycle.layers()),
                    (GroupKind::Heatmap, self.groups.heatmap.cycle.layers()),
                    (GroupKind::Stories, self.groups.stories.cycle.layers()),
                ];
                self.tracker.on_click(&mut self.ctx, point, &sets);
            }
            SurfaceEvent::MoveEnd => {
                self.appliers
                    .apply_building_visibility(&mut self.ctx, self.groups.choropleth.cycle.layers());
                self.emit_view_state();
            }
            SurfaceEvent::Removed => self.on_removed(),
        }
    }

    /// Fires every timer due at or before `now`, each at its own due time.
    pub fn advance_to(&mut self, now: Time) {
        while let Some(due) = self.ctx.timers.next_due()
            && due <= now
        {
            self.ctx.set_now(due);
            let Some((_, continuation)) = self.ctx.timers.pop_due(due) else {
                break;
            };
            self.dispatch(continuation);
        }
        self.ctx.set_now(now);
    }

    /// Tears down and rebuilds `group` from its current layer list.
    pub fn redraw(&mut self, group: GroupKind) {
        let state = self.groups.get_mut(group);
        let before = state.cycle.generation();
        let step = state.cycle.redraw(&mut self.ctx);
        self.after_step(group, before, step);
    }

    fn dispatch(&mut self, continuation: Continuation) {
        match continuation {
            Continuation::ReadinessPoll { group, generation } => {
                let state = self.groups.get_mut(group);
                let before = state.cycle.generation();
                let step = state.cycle.on_poll(&mut self.ctx, generation);
                self.after_step(group, before, step);
            }
            Continuation::SelectRetry { generation } => {
                let cycle = &self.groups.choropleth.cycle;
                if generation.is_stale(cycle.generation()) {
                    debug!(%generation, "stale selection retry ignored");
                    return;
                }
                self.tracker
                    .on_retry(&mut self.ctx, generation, cycle.layers());
            }
        }
    }

    fn wanted_tileset(&self, group: GroupKind) -> Option<TilesetRef> {
        let username = self.config.username()?;
        let name = match group {
            GroupKind::Choropleth => self.config.choropleth()?.tileset,
            GroupKind::Heatmap => self.config.heatmap()?.tileset,
            GroupKind::Stories => self.config.stories().map(str::to_string),
        }?;
        (!name.is_empty()).then(|| TilesetRef::new(username, name))
    }

    fn sync_tileset(&mut self, group: GroupKind) {
        let wanted = self.wanted_tileset(group);
        let token = self.config.token().unwrap_or_default().to_string();
        let state = self.groups.get_mut(group);
        if state.tileset == wanted {
            return;
        }
        state.tileset = wanted.clone();
        state.awaiting_catalog = false;

        match wanted {
            None => state.catalog = Some(TilesetCatalog::default()),
            Some(tileset) if group == GroupKind::Stories => {
                state.catalog = Some(stories_catalog(&tileset.username, &tileset.tileset));
            }
            Some(tileset) => {
                // Current layers stay up until the new catalog arrives.
                state.awaiting_catalog = true;
                info!(%group, tileset = %tileset.tileset, "requesting tileset metadata");
                self.ctx.emit(HostEvent::CatalogRequest {
                    group,
                    metadata_url: tileset.metadata_url(&token),
                    tileset: tileset.tileset,
                });
            }
        }
    }

    fn group_style(&self, group: GroupKind) -> (FeatureStyle, bool) {
        match group {
            GroupKind::Choropleth => self
                .config
                .choropleth()
                .map(|c| (c.style, c.pickable))
                .unwrap_or_default(),
            GroupKind::Heatmap => (
                FeatureStyle::default(),
                self.config.heatmap().is_some_and(|c| c.pickable),
            ),
            GroupKind::Stories => (FeatureStyle::default(), true),
        }
    }

    fn reconcile_group(&mut self, group: GroupKind) {
        let (style, pickable) = self.group_style(group);
        let state = self.groups.get_mut(group);
        let Some(catalog) = &state.catalog else {
            return;
        };
        let specs = state.deriver.derive(group, catalog, &style);
        let before = state.cycle.generation();
        let step = state.cycle.request(&mut self.ctx, specs, pickable);
        self.after_step(group, before, step);
    }

    fn after_step(&mut self, group: GroupKind, before: Generation, step: CycleStep) {
        if self.groups.get(group).cycle.generation() != before {
            self.tracker.forget_group(&mut self.ctx, group);
            if group == GroupKind::Choropleth {
                self.appliers.restore_building(&mut self.ctx);
            }
        }
        if step == CycleStep::Ready {
            self.on_group_ready(group);
        }
    }

    fn on_group_ready(&mut self, group: GroupKind) {
        self.apply_styles(group);
        if group == GroupKind::Choropleth {
            let cycle = &self.groups.choropleth.cycle;
            self.appliers
                .apply_building_visibility(&mut self.ctx, cycle.layers());
            self.tracker
                .on_layers_ready(&mut self.ctx, cycle.generation(), cycle.layers());
        }
    }

    fn apply_styles(&mut self, group: GroupKind) {
        let cycle = &self.groups.get(group).cycle;
        let (generation, layers) = (cycle.generation(), cycle.layers());
        match group {
            GroupKind::Choropleth => {
                let cfg = self.config.choropleth().unwrap_or_default();
                self.appliers.apply_fill_colour(
                    &mut self.ctx,
                    generation,
                    layers,
                    cfg.fill_colour.as_ref(),
                );
                self.appliers
                    .apply_filter(&mut self.ctx, group, generation, layers, cfg.filter.as_ref());
            }
            GroupKind::Heatmap => {
                let cfg = self.config.heatmap().unwrap_or_default();
                self.appliers
                    .apply_filter(&mut self.ctx, group, generation, layers, cfg.filter.as_ref());
                self.appliers
                    .apply_radius(&mut self.ctx, generation, layers, cfg.radius.as_ref());
            }
            GroupKind::Stories => {}
        }
    }

    fn sync_selection(&mut self, prev: &ConfigSnapshot) {
        let next = self.config.choropleth_select_id();
        if next == prev.choropleth_select_id() {
            return;
        }
        let cycle = &self.groups.choropleth.cycle;
        match next {
            Some(Some(id)) => {
                self.tracker
                    .select_external(&mut self.ctx, id, cycle.generation(), cycle.layers());
            }
            Some(None) => self.tracker.clear_external(&mut self.ctx),
            None => {}
        }
    }

    fn emit_view_state(&mut self) {
        let center = self.ctx.surface.center();
        let zoom = self.ctx.surface.zoom();
        let bounds = self.ctx.surface.bounds().to_array();
        self.ctx.emit(HostEvent::ViewState {
            longitude: round_to(center.lng, 4),
            latitude: round_to(center.lat, 4),
            zoom: round_to(zoom, 2),
            bounds,
        });
    }

    fn on_removed(&mut self) {
        info!("render surface removed; abandoning reconciliation");
        self.ctx.detach();
        self.ctx.mark_removed();
        for group in GroupKind::ALL {
            self.groups.get_mut(group).cycle.on_removed();
        }
        self.tracker.reset();
    }
}
