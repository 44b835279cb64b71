//! Paint expressions shared by the derived layers and the fill applier.

use config::{FillColour, PaletteEntry};
use serde_json::{Value, json};
use surface::PropertyMap;

/// Colour for features whose key is not in the palette.
pub const FALLBACK_COLOUR: &str = "transparent";

/// Feature property the palette is keyed on.
pub const COLOUR_KEY_PROPERTY: &str = "ID_color";

/// `["match", ["get", "ID_color"], k1, c1, ..., "transparent"]`.
///
/// A key listed twice keeps its first position and takes the last colour.
/// An empty palette has no arms, so it collapses to the fallback colour.
pub fn palette_expression(entries: &[PaletteEntry]) -> Value {
    let mut arms: Vec<(&str, &str)> = Vec::with_capacity(entries.len());
    for entry in entries {
        match arms.iter_mut().find(|(k, _)| *k == entry.key) {
            Some(arm) => arm.1 = entry.fill.as_str(),
            None => arms.push((entry.key.as_str(), entry.fill.as_str())),
        }
    }
    if arms.is_empty() {
        return json!(FALLBACK_COLOUR);
    }

    let mut expr = vec![json!("match"), json!(["get", COLOUR_KEY_PROPERTY])];
    for (key, fill) in arms {
        expr.push(json!(key));
        expr.push(json!(fill));
    }
    expr.push(json!(FALLBACK_COLOUR));
    Value::Array(expr)
}

/// Paint value for `fill-color`; absent configuration paints nothing.
pub fn fill_colour_expression(fill: Option<&FillColour>) -> Value {
    match fill {
        None => json!(FALLBACK_COLOUR),
        Some(FillColour::Expression(expr)) => expr.clone(),
        Some(other) => palette_expression(other.entries().unwrap_or_default()),
    }
}

/// `on` while the feature-state flag `state` is set, `off` otherwise.
pub fn state_case(state: &str, on: Value, off: Value) -> Value {
    json!(["case", ["boolean", ["feature-state", state], false], on, off])
}

pub fn hover_case(on: Value, off: Value) -> Value {
    state_case("hover", on, off)
}

pub fn click_case(on: Value, off: Value) -> Value {
    state_case("click", on, off)
}

/// Linear interpolation over zoom between `(zoom, value)` stops.
pub fn zoom_ramp(stops: &[(f64, f64)]) -> Value {
    let mut expr = vec![json!("interpolate"), json!(["linear"]), json!(["zoom"])];
    for (zoom, value) in stops {
        expr.push(json!(zoom));
        expr.push(json!(value));
    }
    Value::Array(expr)
}

pub fn heatmap_paint() -> PropertyMap {
    let mut paint = PropertyMap::new();
    // Density 0 is fully transparent so sparse areas blur out.
    paint.insert(
        "heatmap-color".into(),
        json!([
            "interpolate",
            ["linear"],
            ["heatmap-density"],
            0,
            "rgba(33,102,172,0)",
            0.25,
            "rgb(203,194,255)",
            0.5,
            "rgb(251,213,98)",
            0.75,
            "rgb(238,128,93)",
            1,
            "rgb(219,106,140)"
        ]),
    );
    paint.insert(
        "heatmap-opacity".into(),
        zoom_ramp(&[(15.0, 1.0), (16.0, 0.0)]),
    );
    paint
}

pub fn point_paint() -> PropertyMap {
    let mut paint = PropertyMap::new();
    paint.insert(
        "circle-radius".into(),
        zoom_ramp(&[(10.0, 0.0), (12.0, 1.0), (22.0, 15.0)]),
    );
    paint.insert(
        "circle-color".into(),
        hover_case(json!("rgba(219,106,140,1)"), json!("rgba(219,106,140,0.5)")),
    );
    paint.insert("circle-stroke-color".into(), json!("white"));
    paint.insert("circle-stroke-width".into(), json!(1));
    paint.insert(
        "circle-opacity".into(),
        zoom_ramp(&[(15.0, 0.0), (16.0, 1.0)]),
    );
    paint
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn palette_builds_match_with_transparent_default() {
        let expr = palette_expression(&[PaletteEntry::new("A", "#ff0000")]);
        assert_eq!(
            expr,
            json!(["match", ["get", "ID_color"], "A", "#ff0000", "transparent"])
        );
    }

    #[test]
    fn duplicate_keys_keep_position_and_last_colour() {
        let expr = palette_expression(&[
            PaletteEntry::new("A", "#111"),
            PaletteEntry::new("B", "#222"),
            PaletteEntry::new("A", "#333"),
        ]);
        assert_eq!(
            expr,
            json!(["match", ["get", "ID_color"], "A", "#333", "B", "#222", "transparent"])
        );
    }

    #[test]
    fn empty_palette_is_plain_fallback() {
        assert_eq!(palette_expression(&[]), json!("transparent"));
        assert_eq!(fill_colour_expression(None), json!("transparent"));
    }

    #[test]
    fn expressions_pass_through() {
        let raw = json!(["get", "colour"]);
        let fill = FillColour::Expression(raw.clone());
        assert_eq!(fill_colour_expression(Some(&fill)), raw);
    }

    #[test]
    fn state_case_reads_feature_state() {
        assert_eq!(
            hover_case(json!(0.5), json!(1)),
            json!(["case", ["boolean", ["feature-state", "hover"], false], 0.5, 1])
        );
    }
}
