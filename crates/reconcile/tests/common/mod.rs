#![allow(dead_code)]

use catalog::{InMemoryCatalogSource, TilesetCatalog, TilesetRef, VectorLayerInfo};
use foundation::FeatureId;
use reconcile::{Engine, EngineOptions, HostEvent};
use serde_json::{Map, Value, json};
use surface::{
    HeadlessSurface, LayerKind, QueriedFeature, RenderedFeature, RenderedLayer, StyleLayerInfo,
};
use tracing_subscriber::EnvFilter;

pub const USER: &str = "acme";
pub const TOKEN: &str = "pk.test";

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Water (namespaced metadata), the building fill and a label layer on top.
pub fn basemap_surface() -> HeadlessSurface {
    let mut meta = Map::new();
    meta.insert("mapbox:group".to_string(), json!("water"));
    HeadlessSurface::new().with_basemap([
        StyleLayerInfo::new("water", LayerKind::Fill).with_metadata(meta),
        StyleLayerInfo::new("building", LayerKind::Fill),
        StyleLayerInfo::new("road-label", LayerKind::Symbol),
    ])
}

pub fn engine() -> Engine<HeadlessSurface> {
    init_tracing();
    Engine::new(basemap_surface(), EngineOptions::default())
}

pub fn tileset(name: &str) -> TilesetRef {
    TilesetRef::new(USER, name)
}

pub fn catalogs() -> InMemoryCatalogSource {
    let mut source = InMemoryCatalogSource::new();
    for (name, layers) in [
        ("parcels", vec![VectorLayerInfo::new("parcels", 10.0, 16.0)]),
        (
            "buildings",
            vec![VectorLayerInfo::new("city_buildings", 14.0, 18.0)],
        ),
        ("trees", vec![VectorLayerInfo::new("trees", 0.0, 22.0)]),
        (
            "zones",
            vec![
                VectorLayerInfo::new("zones", 8.0, 14.0),
                VectorLayerInfo::new("wards", 10.0, 16.0),
            ],
        ),
    ] {
        let t = tileset(name);
        let url = t.source_url();
        source.insert(t, TilesetCatalog::new(url, layers));
    }
    source
}

/// Pushes `raw` with credentials and answers any catalog request it causes.
pub fn configure(engine: &mut Engine<HeadlessSurface>, raw: Value) {
    let mut push = json!({ "username": USER, "token": TOKEN });
    if let (Some(base), Some(extra)) = (push.as_object_mut(), raw.as_object()) {
        base.extend(extra.clone());
    }
    engine.push_configuration(&push);
    engine.fulfil_catalog_requests(&catalogs());
}

pub fn feature(id: u64, external: &str) -> QueriedFeature {
    let mut properties = Map::new();
    properties.insert("ID".to_string(), json!(external));
    QueriedFeature {
        id: Some(FeatureId(id)),
        properties,
    }
}

pub fn hit(layer: &str, source_layer: &str, id: u64, external: &str) -> RenderedFeature {
    RenderedFeature {
        feature: feature(id, external),
        layer: RenderedLayer {
            id: layer.to_string(),
            source: layer.to_string(),
            source_layer: Some(source_layer.to_string()),
            metadata: None,
        },
    }
}

pub fn selections(engine: &Engine<HeadlessSurface>) -> Vec<Option<String>> {
    engine
        .events()
        .iter()
        .filter_map(|e| match &e.event {
            HostEvent::Selection { feature_id, .. } => Some(feature_id.clone()),
            _ => None,
        })
        .collect()
}
