use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LayerKind {
    Fill,
    Line,
    Heatmap,
    Circle,
    Symbol,
    /// Basemap layer kinds the engine never creates (background, raster, ...).
    #[serde(other)]
    Other,
}

/// Paint or layout properties keyed by style-spec property name.
pub type PropertyMap = BTreeMap<String, Value>;

/// A vector tile source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub id: String,
    pub url: String,
}

impl SourceSpec {
    pub fn vector(id: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            url: url.into(),
        }
    }
}

/// One engine layer, ready to be handed to `add_layer`.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleLayer {
    pub id: String,
    pub kind: LayerKind,
    pub source: String,
    pub source_layer: String,
    pub minzoom: f64,
    pub maxzoom: f64,
    pub paint: PropertyMap,
    pub layout: PropertyMap,
}

/// What the surface reports about a layer already in its style.
#[derive(Debug, Clone, PartialEq)]
pub struct StyleLayerInfo {
    pub id: String,
    pub kind: LayerKind,
    /// Layer metadata; basemap layers carry vendor-namespaced keys.
    pub metadata: Option<Map<String, Value>>,
}

impl StyleLayerInfo {
    pub fn new(id: impl Into<String>, kind: LayerKind) -> Self {
        Self {
            id: id.into(),
            kind,
            metadata: None,
        }
    }

    pub fn with_metadata(mut self, metadata: Map<String, Value>) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn unknown_basemap_kinds_parse_as_other() {
        let k: LayerKind = serde_json::from_value(json!("background")).unwrap();
        assert_eq!(k, LayerKind::Other);
        let k: LayerKind = serde_json::from_value(json!("symbol")).unwrap();
        assert_eq!(k, LayerKind::Symbol);
    }
}
