use std::collections::BTreeMap;

use config::FillColour;
use foundation::Generation;
use layers::GroupKind;
use layers::symbology::fill_colour_expression;
use serde_json::{Value, json};
use surface::{LayerKind, RenderSurface};
use tracing::{debug, warn};

use crate::context::MapContext;
use crate::layer_set::LayerSet;

/// Last value pushed to a layer set, keyed by the generation that built it.
#[derive(Debug, Clone, PartialEq)]
struct Applied {
    generation: Generation,
    value: Option<Value>,
}

impl Applied {
    fn matches(slot: &Option<Applied>, generation: Generation, value: &Option<Value>) -> bool {
        slot.as_ref()
            .is_some_and(|a| a.generation == generation && a.value == *value)
    }
}

/// Pushes configuration-driven style properties onto loaded layer sets.
///
/// Each applier no-ops unless its layer set is loaded and non-empty, and
/// skips values it already applied to the same generation.
#[derive(Debug, Default)]
pub struct StyleAppliers {
    fill: Option<Applied>,
    filters: BTreeMap<GroupKind, Applied>,
    radius: Option<Applied>,
    building_hidden: Option<bool>,
}

impl StyleAppliers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets `fill-color` and `fill-outline-color` on every choropleth base
    /// layer. Returns whether anything was applied.
    pub fn apply_fill_colour<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        generation: Generation,
        layers: &LayerSet,
        fill: Option<&FillColour>,
    ) -> bool {
        if !layers.is_ready() {
            return false;
        }
        let expr = fill_colour_expression(fill);
        if Applied::matches(&self.fill, generation, &Some(expr.clone())) {
            return false;
        }
        for spec in layers.specs() {
            set_paint(ctx, &spec.id, "fill-color", &expr);
            set_paint(ctx, &spec.id, "fill-outline-color", &expr);
        }
        self.fill = Some(Applied {
            generation,
            value: Some(expr),
        });
        true
    }

    /// Sets the filter on every base and companion layer; `None` clears it.
    pub fn apply_filter<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        group: GroupKind,
        generation: Generation,
        layers: &LayerSet,
        filter: Option<&Value>,
    ) -> bool {
        if !layers.is_ready() {
            return false;
        }
        let value = filter.cloned();
        let slot = self.filters.get(&group).cloned();
        if Applied::matches(&slot, generation, &value) {
            return false;
        }
        for id in layers.surface_layer_ids() {
            if let Err(err) = ctx.surface.set_filter(&id, value.as_ref()) {
                warn!(layer = %id, %err, "failed to set filter");
            }
        }
        self.filters.insert(group, Applied { generation, value });
        true
    }

    /// Sets `heatmap-radius` on every heatmap base layer. A missing radius
    /// leaves the layers alone.
    pub fn apply_radius<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        generation: Generation,
        layers: &LayerSet,
        radius: Option<&Value>,
    ) -> bool {
        if !layers.is_ready() {
            return false;
        }
        let Some(radius) = radius else {
            return false;
        };
        let value = Some(radius.clone());
        if Applied::matches(&self.radius, generation, &value) {
            return false;
        }
        for spec in layers.specs() {
            set_paint(ctx, &spec.id, "heatmap-radius", radius);
        }
        self.radius = Some(Applied { generation, value });
        true
    }

    /// Hides the basemap building layer while a building choropleth covers
    /// the rounded zoom, and shows it otherwise.
    pub fn apply_building_visibility<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        layers: &LayerSet,
    ) -> bool {
        let building = ctx.options.building_layer_id.clone();
        let Some(info) = ctx.surface.get_layer(&building) else {
            return false;
        };
        if info.kind != LayerKind::Fill {
            return false;
        }
        let zoom = ctx.surface.zoom().round();
        let hide = layers.all_loaded()
            && layers
                .specs()
                .any(|s| s.source_layer.contains("building") && s.covers_zoom(zoom));
        if self.building_hidden == Some(hide) {
            return false;
        }
        debug!(zoom, hide, "building layer visibility");
        self.set_building_visibility(ctx, &building, hide);
        true
    }

    /// Shows the building layer again if this applier hid it.
    pub fn restore_building<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) {
        if self.building_hidden == Some(true) {
            let building = ctx.options.building_layer_id.clone();
            self.set_building_visibility(ctx, &building, false);
        }
    }

    fn set_building_visibility<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        building: &str,
        hide: bool,
    ) {
        let visibility = if hide { json!("none") } else { json!("visible") };
        match ctx
            .surface
            .set_layout_property(building, "visibility", &visibility)
        {
            Ok(()) => self.building_hidden = Some(hide),
            Err(err) => warn!(layer = building, %err, "failed to set building visibility"),
        }
    }
}

fn set_paint<S: RenderSurface>(ctx: &mut MapContext<S>, layer: &str, name: &str, value: &Value) {
    if let Err(err) = ctx.surface.set_paint_property(layer, name, value) {
        warn!(layer, property = name, %err, "failed to set paint property");
    }
}
