use std::sync::Arc;

use foundation::{Generation, HandlerId};
use layers::{GroupKind, LayerSpec};
use surface::{EventKind, RenderSurface, StyleLayerInfo, SurfaceError};
use tracing::{debug, info, warn};

use crate::context::MapContext;
use crate::gate::{GateStatus, ReadinessGate};
use crate::layer_set::{LayerSet, MaterializedLayer};

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CycleState {
    Idle,
    TearingDown,
    AwaitingReady,
    Materializing,
    Ready,
    /// The surface was removed; nothing else will happen.
    Abandoned,
}

/// What a call into the cycle achieved.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CycleStep {
    /// Nothing to do; the surface is already heading to the requested state.
    Unchanged,
    /// Waiting for the style to load.
    Pending,
    /// The layer set is loaded.
    Ready,
    Abandoned,
}

/// Drives one layer group's surface layers towards its derived layer list.
///
/// Every run bumps the generation, tears down what the previous run built,
/// waits for the style and then materializes the specs in order. A new
/// request cancels whatever run is in flight and starts over.
#[derive(Debug)]
pub struct ReconcileCycle {
    group: GroupKind,
    generation: Generation,
    state: CycleState,
    target: Option<Arc<[LayerSpec]>>,
    pickable: bool,
    layers: LayerSet,
    /// Specs a teardown could not remove, retried before the next build.
    leftovers: Vec<LayerSpec>,
    gate: ReadinessGate,
}

impl ReconcileCycle {
    pub fn new(group: GroupKind) -> Self {
        Self {
            group,
            generation: Generation::ZERO,
            state: CycleState::Idle,
            target: None,
            pickable: false,
            layers: LayerSet::new(),
            leftovers: Vec::new(),
            gate: ReadinessGate::new(),
        }
    }

    pub fn group(&self) -> GroupKind {
        self.group
    }

    pub fn generation(&self) -> Generation {
        self.generation
    }

    pub fn state(&self) -> CycleState {
        self.state
    }

    pub fn layers(&self) -> &LayerSet {
        &self.layers
    }

    pub fn target(&self) -> Option<&Arc<[LayerSpec]>> {
        self.target.as_ref()
    }

    /// Reconciles towards `specs`. Only a different `Arc` (or a pickability
    /// change) starts a new run.
    pub fn request<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        specs: Arc<[LayerSpec]>,
        pickable: bool,
    ) -> CycleStep {
        if self.state == CycleState::Abandoned {
            return CycleStep::Abandoned;
        }
        if let Some(current) = &self.target
            && Arc::ptr_eq(current, &specs)
            && self.pickable == pickable
        {
            return CycleStep::Unchanged;
        }
        self.target = Some(specs);
        self.pickable = pickable;
        self.restart(ctx)
    }

    /// Rebuilds the current target from scratch.
    pub fn redraw<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) -> CycleStep {
        match self.state {
            CycleState::Abandoned => CycleStep::Abandoned,
            _ if self.target.is_none() => CycleStep::Unchanged,
            _ => self.restart(ctx),
        }
    }

    pub fn on_style_loaded<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) -> CycleStep {
        if self.state != CycleState::AwaitingReady {
            return CycleStep::Unchanged;
        }
        match self.gate.on_style_loaded(ctx) {
            Some(generation) if generation == self.generation => self.materialize(ctx),
            Some(generation) => {
                debug!(group = %self.group, %generation, "stale readiness signal ignored");
                CycleStep::Unchanged
            }
            None => CycleStep::Unchanged,
        }
    }

    pub fn on_poll<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        generation: Generation,
    ) -> CycleStep {
        if generation.is_stale(self.generation) || self.state != CycleState::AwaitingReady {
            debug!(group = %self.group, %generation, "stale readiness poll ignored");
            return CycleStep::Unchanged;
        }
        match self.gate.on_poll(ctx, self.group, generation) {
            GateStatus::Ready => self.materialize(ctx),
            GateStatus::Pending => CycleStep::Pending,
            GateStatus::Abandoned => self.abandon(),
        }
    }

    /// The surface is gone; forget everything without calling into it.
    pub fn on_removed(&mut self) {
        self.gate.reset();
        self.layers.take();
        self.leftovers.clear();
        self.abandon();
    }

    fn restart<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) -> CycleStep {
        self.generation = self.generation.next();
        let group = self.group;
        let cancelled = ctx.timers.cancel_where(|c| c.group() == group);
        debug!(%group, generation = %self.generation, cancelled, "reconciliation started");

        self.state = CycleState::TearingDown;
        self.teardown(ctx);

        self.state = CycleState::AwaitingReady;
        match self.gate.await_ready(ctx, group, self.generation) {
            GateStatus::Ready => self.materialize(ctx),
            GateStatus::Pending => CycleStep::Pending,
            GateStatus::Abandoned => self.abandon(),
        }
    }

    fn teardown<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) {
        let removed = self.layers.take();
        if removed.is_empty() {
            return;
        }
        debug!(group = %self.group, layers = removed.len(), "tearing down layer set");
        for entry in removed.into_iter().rev() {
            for hook in entry.hooks {
                ctx.surface.off(hook);
            }
            if !remove_spec(&mut ctx.surface, &entry.spec) {
                self.leftovers.push(entry.spec);
            }
        }
    }

    /// Retries removal of whatever earlier teardowns left behind. Returns
    /// false while any of it is still on the surface.
    fn sweep_leftovers<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) -> bool {
        if self.leftovers.is_empty() {
            return true;
        }
        let before = self.leftovers.len();
        self.leftovers.retain(|spec| !remove_spec(&mut ctx.surface, spec));
        debug!(
            group = %self.group,
            removed = before - self.leftovers.len(),
            remaining = self.leftovers.len(),
            "swept leftover layers"
        );
        self.leftovers.is_empty()
    }

    fn materialize<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) -> CycleStep {
        self.state = CycleState::Materializing;
        if !self.sweep_leftovers(ctx) {
            if !ctx.surface.is_style_loaded() {
                self.state = CycleState::AwaitingReady;
                return match self.gate.wait(ctx, self.group, self.generation) {
                    GateStatus::Abandoned => self.abandon(),
                    _ => CycleStep::Pending,
                };
            }
            warn!(
                group = %self.group,
                remaining = self.leftovers.len(),
                "leftover layers could not be removed"
            );
        }
        let specs = self
            .target
            .clone()
            .unwrap_or_else(|| Arc::<[LayerSpec]>::from(Vec::new()));
        let style = ctx.surface.style_layers();

        for spec in specs.iter() {
            match materialize_spec(ctx, spec, &style, self.pickable) {
                Ok(hooks) => self.layers.push(MaterializedLayer {
                    spec: spec.clone(),
                    hooks,
                }),
                Err(SurfaceError::StyleNotLoaded) => {
                    debug!(
                        group = %self.group,
                        generation = %self.generation,
                        layer = %spec.id,
                        "style unloaded mid-build; waiting again"
                    );
                    if !remove_spec(&mut ctx.surface, spec) {
                        self.leftovers.push(spec.clone());
                    }
                    self.teardown(ctx);
                    self.state = CycleState::AwaitingReady;
                    return match self.gate.wait(ctx, self.group, self.generation) {
                        GateStatus::Abandoned => self.abandon(),
                        _ => CycleStep::Pending,
                    };
                }
                Err(SurfaceError::Removed) => return self.abandon(),
                Err(err) => {
                    warn!(group = %self.group, layer = %spec.id, %err, "skipping layer");
                    if !remove_spec(&mut ctx.surface, spec) {
                        self.leftovers.push(spec.clone());
                    }
                }
            }
        }

        self.layers.mark_loaded();
        self.state = CycleState::Ready;
        info!(
            group = %self.group,
            generation = %self.generation,
            layers = self.layers.len(),
            "layer set ready"
        );
        CycleStep::Ready
    }

    fn abandon(&mut self) -> CycleStep {
        if self.state != CycleState::Abandoned {
            debug!(group = %self.group, "surface removed; reconciliation abandoned");
        }
        self.state = CycleState::Abandoned;
        CycleStep::Abandoned
    }
}

fn materialize_spec<S: RenderSurface>(
    ctx: &mut MapContext<S>,
    spec: &LayerSpec,
    style: &[StyleLayerInfo],
    pickable: bool,
) -> Result<Vec<HandlerId>, SurfaceError> {
    // Leftovers of a build interrupted by a style reload share our ids.
    remove_spec(&mut ctx.surface, spec);

    ctx.surface.add_source(&spec.source())?;
    let before = spec.anchor.resolve(style);
    ctx.surface.add_layer(&spec.base_layer(), before.as_deref())?;
    for companion in &spec.companions {
        let before = companion.anchor.resolve(style);
        ctx.surface
            .add_layer(&spec.companion_layer(companion), before.as_deref())?;
    }

    let mut hooks = Vec::new();
    if pickable {
        hooks.push(ctx.surface.on(EventKind::MouseMove, Some(&spec.id)));
        hooks.push(ctx.surface.on(EventKind::MouseLeave, Some(&spec.id)));
    }
    Ok(hooks)
}

/// Removes a spec's companions, base layer and source. Absent parts are
/// skipped. Returns false if the surface refused any removal.
fn remove_spec<S: RenderSurface>(surface: &mut S, spec: &LayerSpec) -> bool {
    let mut clean = true;
    for companion in spec.companions.iter().rev() {
        clean &= remove_layer(surface, &spec.companion_id(companion.role));
    }
    clean &= remove_layer(surface, &spec.id);
    if surface.has_source(&spec.id)
        && let Err(err) = surface.remove_source(&spec.id)
    {
        warn!(source = %spec.id, %err, "failed to remove source");
        clean = false;
    }
    clean
}

fn remove_layer<S: RenderSurface>(surface: &mut S, id: &str) -> bool {
    if surface.get_layer(id).is_some()
        && let Err(err) = surface.remove_layer(id)
    {
        warn!(layer = id, %err, "failed to remove layer");
        return false;
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::options::EngineOptions;
    use catalog::{TilesetCatalog, VectorLayerInfo};
    use config::FeatureStyle;
    use layers::derive_layer_specs;
    use pretty_assertions::assert_eq;
    use surface::{HeadlessSurface, LayerKind, SurfaceCall};

    fn specs(names: &[&str]) -> Arc<[LayerSpec]> {
        let catalog = TilesetCatalog::new(
            "mapbox://city.parcels",
            names
                .iter()
                .map(|n| VectorLayerInfo::new(*n, 0.0, 22.0))
                .collect(),
        );
        derive_layer_specs(GroupKind::Choropleth, &catalog, &FeatureStyle::default()).into()
    }

    fn ctx() -> MapContext<HeadlessSurface> {
        let surface = HeadlessSurface::new()
            .with_basemap([StyleLayerInfo::new("building", LayerKind::Fill)]);
        MapContext::new(surface, EngineOptions::default())
    }

    #[test]
    fn materializes_below_building_with_companions() {
        let mut ctx = ctx();
        let mut cycle = ReconcileCycle::new(GroupKind::Choropleth);
        let step = cycle.request(&mut ctx, specs(&["parcels"]), true);
        assert_eq!(step, CycleStep::Ready);
        assert_eq!(cycle.state(), CycleState::Ready);
        assert_eq!(cycle.layers().layer_ids(), vec!["parcels"]);
        assert!(cycle.layers().all_loaded());
        assert_eq!(
            ctx.surface.layer_ids(),
            vec!["parcels", "building", "parcels-outline", "parcels-selected"]
        );
        assert_eq!(ctx.surface.active_handlers().len(), 2);
    }

    #[test]
    fn same_arc_does_not_rebuild() {
        let mut ctx = ctx();
        let mut cycle = ReconcileCycle::new(GroupKind::Choropleth);
        let list = specs(&["parcels"]);
        cycle.request(&mut ctx, Arc::clone(&list), false);
        ctx.surface.take_calls();
        assert_eq!(cycle.request(&mut ctx, list, false), CycleStep::Unchanged);
        assert!(ctx.surface.calls().is_empty());
        assert_eq!(cycle.generation(), Generation(1));
    }

    #[test]
    fn rebuild_tears_down_in_reverse_order() {
        let mut ctx = ctx();
        let mut cycle = ReconcileCycle::new(GroupKind::Choropleth);
        cycle.request(&mut ctx, specs(&["a", "b"]), false);
        ctx.surface.take_calls();
        cycle.request(&mut ctx, specs(&["c"]), false);

        let removals: Vec<_> = ctx
            .surface
            .calls()
            .iter()
            .filter_map(|c| match c {
                SurfaceCall::RemoveLayer(id) | SurfaceCall::RemoveSource(id) => Some(id.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(
            removals,
            vec![
                "b-selected", "b-outline", "b", "b", "a-selected", "a-outline", "a", "a"
            ]
        );
        assert_eq!(
            ctx.surface.app_layer_ids(),
            vec!["c", "c-outline", "c-selected"]
        );
    }

    #[test]
    fn waits_for_style_then_builds() {
        let mut ctx = ctx();
        ctx.surface.set_style_loaded(false);
        let mut cycle = ReconcileCycle::new(GroupKind::Choropleth);
        assert_eq!(
            cycle.request(&mut ctx, specs(&["parcels"]), false),
            CycleStep::Pending
        );
        assert_eq!(cycle.state(), CycleState::AwaitingReady);
        assert!(!cycle.layers().all_loaded());

        ctx.surface.set_style_loaded(true);
        assert_eq!(cycle.on_style_loaded(&mut ctx), CycleStep::Ready);
        assert_eq!(cycle.layers().layer_ids(), vec!["parcels"]);
    }

    #[test]
    fn style_unload_mid_build_restarts_same_generation() {
        let mut ctx = ctx();
        ctx.surface.fail_add_layer("b", SurfaceError::StyleNotLoaded);
        let mut cycle = ReconcileCycle::new(GroupKind::Choropleth);
        assert_eq!(
            cycle.request(&mut ctx, specs(&["a", "b"]), false),
            CycleStep::Pending
        );
        assert!(ctx.surface.app_layer_ids().is_empty());
        assert!(ctx.surface.source_ids().is_empty());
        assert_eq!(cycle.generation(), Generation(1));

        assert_eq!(cycle.on_style_loaded(&mut ctx), CycleStep::Ready);
        assert_eq!(cycle.generation(), Generation(1));
        assert_eq!(cycle.layers().layer_ids(), vec!["a", "b"]);
    }

    #[test]
    fn teardown_refused_during_reload_finishes_before_rebuild() {
        let mut ctx = ctx();
        let mut cycle = ReconcileCycle::new(GroupKind::Choropleth);
        cycle.request(&mut ctx, specs(&["a"]), false);
        ctx.surface.set_style_loaded(false);

        assert_eq!(
            cycle.request(&mut ctx, specs(&["b"]), false),
            CycleStep::Pending
        );
        assert!(cycle.layers().is_empty());
        assert_eq!(ctx.surface.source_ids(), vec!["a"]);

        ctx.surface.set_style_loaded(true);
        assert_eq!(cycle.on_style_loaded(&mut ctx), CycleStep::Ready);
        assert_eq!(
            ctx.surface.app_layer_ids(),
            vec!["b", "b-outline", "b-selected"]
        );
        assert_eq!(ctx.surface.source_ids(), vec!["b"]);
    }

    #[test]
    fn other_errors_skip_only_that_spec() {
        let mut ctx = ctx();
        ctx.surface
            .fail_add_layer("a-outline", SurfaceError::Engine("bad paint".into()));
        let mut cycle = ReconcileCycle::new(GroupKind::Choropleth);
        assert_eq!(
            cycle.request(&mut ctx, specs(&["a", "b"]), false),
            CycleStep::Ready
        );
        assert_eq!(cycle.layers().layer_ids(), vec!["b"]);
        assert_eq!(ctx.surface.source_ids(), vec!["b"]);
    }

    #[test]
    fn removed_surface_is_terminal() {
        let mut ctx = ctx();
        let mut cycle = ReconcileCycle::new(GroupKind::Choropleth);
        cycle.request(&mut ctx, specs(&["a"]), false);
        ctx.mark_removed();
        cycle.on_removed();
        assert_eq!(cycle.state(), CycleState::Abandoned);
        assert!(cycle.layers().is_empty());
        assert_eq!(
            cycle.request(&mut ctx, specs(&["b"]), false),
            CycleStep::Abandoned
        );
    }
}
