use serde::Deserialize;
use serde_json::{Map, Value};

use crate::de::{field, lenient_f64, opaque_id, string_key, truthy};

/// One palette entry: features whose colour key equals `key` are drawn in
/// `fill`.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaletteEntry {
    #[serde(rename = "ID_color", alias = "key", deserialize_with = "string_key")]
    pub key: String,
    #[serde(alias = "color")]
    pub fill: String,
}

impl PaletteEntry {
    pub fn new(key: impl Into<String>, fill: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            fill: fill.into(),
        }
    }
}

/// How the host describes fill colours.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(untagged)]
pub enum FillColour {
    Palette(Vec<PaletteEntry>),
    Single(PaletteEntry),
    /// A ready-made paint expression, passed through as-is.
    Expression(Value),
}

impl FillColour {
    /// Palette entries in host order, or `None` for a raw expression.
    pub fn entries(&self) -> Option<&[PaletteEntry]> {
        match self {
            FillColour::Palette(entries) => Some(entries),
            FillColour::Single(entry) => Some(std::slice::from_ref(entry)),
            FillColour::Expression(_) => None,
        }
    }
}

/// Styling constants for hover and selection feedback.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureStyle {
    pub outline_colour: Option<String>,
    pub outline_width: f64,
    pub select_colour: String,
    pub select_width: f64,
    pub hover_opacity: f64,
}

impl Default for FeatureStyle {
    fn default() -> Self {
        Self {
            outline_colour: None,
            outline_width: 1.0,
            select_colour: "#000000".to_string(),
            select_width: 3.0,
            hover_opacity: 0.5,
        }
    }
}

impl FeatureStyle {
    /// Reads the styling keys of `group`. Each missing or malformed value
    /// keeps its default.
    pub fn from_group(group: &str, map: &Map<String, Value>) -> Self {
        let defaults = Self::default();
        Self {
            outline_colour: field(map, group, "outline_colour", String::deserialize),
            outline_width: field(map, group, "outline_width", lenient_f64)
                .unwrap_or(defaults.outline_width),
            select_colour: field(map, group, "select_colour", String::deserialize)
                .unwrap_or(defaults.select_colour),
            select_width: field(map, group, "select_width", lenient_f64)
                .unwrap_or(defaults.select_width),
            hover_opacity: field(map, group, "hover_opacity", lenient_f64)
                .unwrap_or(defaults.hover_opacity),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChoroplethConfig {
    pub tileset: Option<String>,
    pub fill_colour: Option<FillColour>,
    pub filter: Option<Value>,
    pub pickable: bool,
    pub select_id: Option<String>,
    pub style: FeatureStyle,
}

impl ChoroplethConfig {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        const GROUP: &str = "choropleth";
        Self {
            tileset: field(map, GROUP, "tileset", opaque_id).flatten(),
            fill_colour: field(map, GROUP, "fill_colour", FillColour::deserialize),
            filter: field(map, GROUP, "filter", Value::deserialize),
            pickable: field(map, GROUP, "pickable", truthy).unwrap_or_default(),
            select_id: field(map, GROUP, "select_id", opaque_id).flatten(),
            style: FeatureStyle::from_group(GROUP, map),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct HeatmapConfig {
    pub tileset: Option<String>,
    pub filter: Option<Value>,
    pub pickable: bool,
    /// Heatmap radius: a number or a paint expression.
    pub radius: Option<Value>,
}

impl HeatmapConfig {
    pub fn from_map(map: &Map<String, Value>) -> Self {
        const GROUP: &str = "heatmap";
        Self {
            tileset: field(map, GROUP, "tileset", opaque_id).flatten(),
            filter: field(map, GROUP, "filter", Value::deserialize),
            pickable: field(map, GROUP, "pickable", truthy).unwrap_or_default(),
            radius: field(map, GROUP, "radius", Value::deserialize),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn palette_accepts_list_single_and_expression() {
        let list: FillColour =
            serde_json::from_value(json!([{"ID_color": 1, "fill": "#f00"}])).unwrap();
        assert_eq!(list.entries().unwrap(), &[PaletteEntry::new("1", "#f00")]);

        let single: FillColour =
            serde_json::from_value(json!({"key": "A", "color": "#ff0000"})).unwrap();
        assert_eq!(single.entries().unwrap(), &[PaletteEntry::new("A", "#ff0000")]);

        let expr: FillColour =
            serde_json::from_value(json!(["match", ["get", "k"], "a", "#000", "#fff"])).unwrap();
        assert!(expr.entries().is_none());

        let empty: FillColour = serde_json::from_value(json!([])).unwrap();
        assert_eq!(empty.entries().unwrap().len(), 0);
    }

    fn choropleth(v: Value) -> ChoroplethConfig {
        ChoroplethConfig::from_map(v.as_object().unwrap())
    }

    #[test]
    fn choropleth_defaults_and_style_keys() {
        let cfg = choropleth(json!({
            "tileset": "parcels",
            "pickable": "TRUE",
            "select_id": 42,
            "select_colour": "#ffcc00",
            "outline_width": "2"
        }));
        assert_eq!(cfg.tileset.as_deref(), Some("parcels"));
        assert!(cfg.pickable);
        assert_eq!(cfg.select_id.as_deref(), Some("42"));
        assert_eq!(cfg.style.select_colour, "#ffcc00");
        assert_eq!(cfg.style.outline_width, 2.0);
        assert_eq!(cfg.style.select_width, 3.0);
        assert_eq!(cfg.style.hover_opacity, 0.5);
    }

    #[test]
    fn bad_field_keeps_the_rest_of_the_group() {
        let cfg = choropleth(json!({
            "tileset": "parcels",
            "pickable": true,
            "fill_colour": [{ "key": "A", "color": "#ff0000" }],
            "outline_width": "wide",
            "select_colour": 7
        }));
        assert_eq!(cfg.tileset.as_deref(), Some("parcels"));
        assert!(cfg.pickable);
        assert_eq!(
            cfg.fill_colour.as_ref().and_then(FillColour::entries),
            Some(&[PaletteEntry::new("A", "#ff0000")][..])
        );
        assert_eq!(cfg.style, FeatureStyle::default());
    }

    #[test]
    fn numeric_tileset_names_are_kept() {
        let cfg = choropleth(json!({ "tileset": 2021, "pickable": true }));
        assert_eq!(cfg.tileset.as_deref(), Some("2021"));
        assert!(cfg.pickable);

        let heat = HeatmapConfig::from_map(json!({ "tileset": "" }).as_object().unwrap());
        assert_eq!(heat.tileset, None);
    }
}
