use foundation::FeatureId;
use serde_json::{Map, Value};

/// Address of one feature's state on the surface.
///
/// `layer_id` doubles as the source id: every base layer owns a source of the
/// same name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FeatureRef {
    pub layer_id: String,
    pub source_layer: String,
    pub feature_id: FeatureId,
}

impl FeatureRef {
    pub fn new(layer_id: impl Into<String>, source_layer: impl Into<String>, id: FeatureId) -> Self {
        Self {
            layer_id: layer_id.into(),
            source_layer: source_layer.into(),
            feature_id: id,
        }
    }
}

/// Partial feature-state update; `None` fields are left untouched.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct FeatureState {
    pub hover: Option<bool>,
    pub click: Option<bool>,
}

impl FeatureState {
    pub fn hover(on: bool) -> Self {
        Self {
            hover: Some(on),
            click: None,
        }
    }

    pub fn click(on: bool) -> Self {
        Self {
            hover: None,
            click: Some(on),
        }
    }

    /// Applies `update` on top of `self`.
    pub fn merged(self, update: FeatureState) -> Self {
        Self {
            hover: update.hover.or(self.hover),
            click: update.click.or(self.click),
        }
    }
}

/// A feature returned from a source query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueriedFeature {
    pub id: Option<FeatureId>,
    pub properties: Map<String, Value>,
}

impl QueriedFeature {
    /// Property value in its string form; numbers compare as their text.
    pub fn property_str(&self, key: &str) -> Option<String> {
        match self.properties.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

/// Which rendered layer a feature was hit on.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedLayer {
    pub id: String,
    pub source: String,
    pub source_layer: Option<String>,
    pub metadata: Option<Map<String, Value>>,
}

/// A feature hit under the pointer, topmost first in query results.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedFeature {
    pub feature: QueriedFeature,
    pub layer: RenderedLayer,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn merged_state_keeps_untouched_flags() {
        let s = FeatureState::click(true).merged(FeatureState::hover(true));
        assert_eq!(s, FeatureState { hover: Some(true), click: Some(true) });
        let s = s.merged(FeatureState::hover(false));
        assert_eq!(s.hover, Some(false));
        assert_eq!(s.click, Some(true));
    }

    #[test]
    fn property_str_stringifies_numbers() {
        let f = QueriedFeature {
            id: None,
            properties: json!({"ID": 42, "name": "lot"}).as_object().cloned().unwrap(),
        };
        assert_eq!(f.property_str("ID").as_deref(), Some("42"));
        assert_eq!(f.property_str("name").as_deref(), Some("lot"));
        assert_eq!(f.property_str("missing"), None);
    }
}
