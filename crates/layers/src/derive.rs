//! Derives the desired layer list for one layer group.

use std::collections::HashSet;
use std::sync::Arc;

use catalog::{TilesetCatalog, TilesetRef, VectorLayerInfo};
use config::FeatureStyle;
use serde::{Deserialize, Serialize};
use serde_json::json;
use surface::{LayerKind, PropertyMap};

use crate::layer::{Anchor, Companion, CompanionRole, LayerSpec};
use crate::symbology::{FALLBACK_COLOUR, click_case, heatmap_paint, hover_case, point_paint};

/// Independently reconciled layer groups.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GroupKind {
    Choropleth,
    Heatmap,
    Stories,
}

impl GroupKind {
    pub const ALL: [GroupKind; 3] = [GroupKind::Choropleth, GroupKind::Heatmap, GroupKind::Stories];

    pub fn as_str(self) -> &'static str {
        match self {
            GroupKind::Choropleth => "choropleth",
            GroupKind::Heatmap => "heatmap",
            GroupKind::Stories => "stories",
        }
    }
}

impl std::fmt::Display for GroupKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

const HEATMAP_SUFFIX: &str = "-heatmap";
const POINT_MINZOOM: f64 = 13.0;
const POINT_ANCHOR: &str = "road-label-simple";
const STORIES_MINZOOM: f64 = 13.0;
const STORIES_MAXZOOM: f64 = 22.0;
const STORIES_ICON: &str = "urban_life";

/// Catalog for the stories group; its single source layer is named after the
/// tileset, so no metadata fetch is needed.
pub fn stories_catalog(username: &str, tileset: &str) -> TilesetCatalog {
    let tileset_ref = TilesetRef::new(username, tileset);
    TilesetCatalog::new(
        tileset_ref.source_url(),
        vec![VectorLayerInfo::new(tileset, STORIES_MINZOOM, STORIES_MAXZOOM)],
    )
}

/// Ordered layer specs for `kind`. Deterministic in its inputs.
///
/// Source layers that repeat a name already seen are skipped so ids stay
/// unique.
pub fn derive_layer_specs(
    kind: GroupKind,
    catalog: &TilesetCatalog,
    style: &FeatureStyle,
) -> Vec<LayerSpec> {
    let mut seen = HashSet::new();
    let mut specs = Vec::with_capacity(catalog.vector_layers.len());
    for layer in &catalog.vector_layers {
        if !seen.insert(layer.id.as_str()) {
            tracing::warn!(group = %kind, layer = %layer.id, "duplicate source layer skipped");
            continue;
        }
        let spec = match kind {
            GroupKind::Choropleth => choropleth_spec(layer, &catalog.url, style),
            GroupKind::Heatmap => heatmap_spec(layer, &catalog.url),
            GroupKind::Stories => stories_spec(layer, &catalog.url),
        };
        specs.push(spec);
    }
    specs
}

fn choropleth_spec(layer: &VectorLayerInfo, url: &str, style: &FeatureStyle) -> LayerSpec {
    let mut paint = PropertyMap::new();
    paint.insert("fill-color".into(), json!(FALLBACK_COLOUR));
    paint.insert("fill-outline-color".into(), json!(FALLBACK_COLOUR));
    paint.insert(
        "fill-opacity".into(),
        hover_case(json!(style.hover_opacity), json!(1)),
    );

    let outline_colour = match &style.outline_colour {
        Some(colour) => colour.clone(),
        None if layer.id.contains("building") => "lightgrey".to_string(),
        None => FALLBACK_COLOUR.to_string(),
    };
    let mut outline = PropertyMap::new();
    outline.insert("line-color".into(), json!(outline_colour));
    outline.insert("line-width".into(), json!(style.outline_width));

    let mut selected = PropertyMap::new();
    selected.insert("line-color".into(), json!(style.select_colour));
    selected.insert("line-width".into(), json!(style.select_width));
    selected.insert("line-opacity".into(), click_case(json!(1), json!(0)));

    LayerSpec {
        id: layer.id.clone(),
        source_url: url.to_string(),
        source_layer: layer.id.clone(),
        kind: LayerKind::Fill,
        minzoom: layer.minzoom,
        maxzoom: layer.maxzoom,
        paint,
        layout: PropertyMap::new(),
        anchor: Anchor::first_matching(LayerKind::Fill, "building"),
        companions: vec![
            line_companion(CompanionRole::Outline, layer, outline),
            line_companion(CompanionRole::Selection, layer, selected),
        ],
    }
}

fn line_companion(role: CompanionRole, layer: &VectorLayerInfo, paint: PropertyMap) -> Companion {
    Companion {
        role,
        kind: LayerKind::Line,
        minzoom: layer.minzoom,
        maxzoom: layer.maxzoom,
        paint,
        layout: PropertyMap::new(),
        anchor: Anchor::Top,
    }
}

fn heatmap_spec(layer: &VectorLayerInfo, url: &str) -> LayerSpec {
    LayerSpec {
        id: format!("{}{HEATMAP_SUFFIX}", layer.id),
        source_url: url.to_string(),
        source_layer: layer.id.clone(),
        kind: LayerKind::Heatmap,
        minzoom: layer.minzoom,
        maxzoom: layer.maxzoom,
        paint: heatmap_paint(),
        layout: PropertyMap::new(),
        anchor: Anchor::first_matching(LayerKind::Symbol, "label"),
        companions: vec![Companion {
            role: CompanionRole::Point,
            kind: LayerKind::Circle,
            minzoom: POINT_MINZOOM,
            maxzoom: layer.maxzoom,
            paint: point_paint(),
            layout: PropertyMap::new(),
            anchor: Anchor::layer(POINT_ANCHOR),
        }],
    }
}

fn stories_spec(layer: &VectorLayerInfo, url: &str) -> LayerSpec {
    let mut layout = PropertyMap::new();
    layout.insert("icon-image".into(), json!(STORIES_ICON));
    let mut paint = PropertyMap::new();
    paint.insert("icon-opacity".into(), hover_case(json!(1), json!(0.75)));

    LayerSpec {
        id: layer.id.clone(),
        source_url: url.to_string(),
        source_layer: layer.id.clone(),
        kind: LayerKind::Symbol,
        minzoom: layer.minzoom,
        maxzoom: layer.maxzoom,
        paint,
        layout,
        anchor: Anchor::Top,
        companions: Vec::new(),
    }
}

#[derive(Debug, Clone, PartialEq)]
struct DeriveInput {
    kind: GroupKind,
    catalog: TilesetCatalog,
    style: FeatureStyle,
}

/// Memoizing front of [`derive_layer_specs`].
///
/// Hands out the same `Arc` for as long as its inputs compare equal, so
/// callers can detect a changed layer list with `Arc::ptr_eq`.
#[derive(Debug, Default)]
pub struct SpecDeriver {
    last: Option<(DeriveInput, Arc<[LayerSpec]>)>,
}

impl SpecDeriver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn derive(
        &mut self,
        kind: GroupKind,
        catalog: &TilesetCatalog,
        style: &FeatureStyle,
    ) -> Arc<[LayerSpec]> {
        if let Some((input, specs)) = &self.last
            && input.kind == kind
            && input.catalog == *catalog
            && input.style == *style
        {
            return Arc::clone(specs);
        }
        let specs: Arc<[LayerSpec]> = derive_layer_specs(kind, catalog, style).into();
        self.last = Some((
            DeriveInput {
                kind,
                catalog: catalog.clone(),
                style: style.clone(),
            },
            Arc::clone(&specs),
        ));
        specs
    }
}
