use serde_json::{Map, Value};

use crate::normalize::{merge_into, normalize};
use crate::views::{ChoroplethConfig, HeatmapConfig};

/// Immutable, fully parsed configuration tree.
///
/// Each push produces a new snapshot; consumers compare the sub-trees they
/// care about against the previous snapshot to decide whether to react.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ConfigSnapshot {
    tree: Map<String, Value>,
}

impl ConfigSnapshot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_raw(raw: &Value) -> Self {
        Self::new().merged(raw)
    }

    /// Returns a new snapshot with `raw` normalized and merged on top of this
    /// one. A push that is not an object leaves the configuration unchanged.
    pub fn merged(&self, raw: &Value) -> Self {
        let mut tree = self.tree.clone();
        match normalize(raw) {
            Some(incoming) => merge_into(&mut tree, incoming),
            None => tracing::warn!("ignoring configuration push that is not an object"),
        }
        Self { tree }
    }

    pub fn tree(&self) -> &Map<String, Value> {
        &self.tree
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.tree.get(key)
    }

    /// Deep inequality of one top-level key between `prev` and `self`.
    pub fn subtree_changed(&self, prev: &ConfigSnapshot, key: &str) -> bool {
        self.tree.get(key) != prev.tree.get(key)
    }

    /// Raw `select_id` as the host last sent it; `Some(None)` is an explicit
    /// clear (`null` or empty), `None` means the key was never sent.
    pub fn choropleth_select_id(&self) -> Option<Option<String>> {
        let group = self.tree.get("choropleth")?.as_object()?;
        let raw = group.get("select_id")?;
        Some(match raw {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            _ => None,
        })
    }

    pub fn choropleth(&self) -> Option<ChoroplethConfig> {
        self.group("choropleth", ChoroplethConfig::from_map)
    }

    pub fn heatmap(&self) -> Option<HeatmapConfig> {
        self.group("heatmap", HeatmapConfig::from_map)
    }

    /// Stories tileset name.
    pub fn stories(&self) -> Option<&str> {
        self.str_value("stories")
    }

    pub fn username(&self) -> Option<&str> {
        self.str_value("username")
    }

    pub fn token(&self) -> Option<&str> {
        self.str_value("token")
    }

    fn str_value(&self, key: &str) -> Option<&str> {
        self.tree
            .get(key)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Reads one group with `read`. Fields are read one by one, so only a
    /// group that is not an object at all falls back to defaults wholesale.
    fn group<T: Default>(
        &self,
        key: &str,
        read: impl FnOnce(&Map<String, Value>) -> T,
    ) -> Option<T> {
        match self.tree.get(key)? {
            Value::Null => None,
            Value::Object(map) => Some(read(map)),
            other => {
                tracing::warn!(
                    key,
                    found = %other,
                    "configuration group is not an object; using defaults"
                );
                Some(T::default())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::ConfigSnapshot;
    use serde_json::json;

    #[test]
    fn partial_pushes_accumulate() {
        let s0 = ConfigSnapshot::from_raw(&json!({
            "username": "acme",
            "choropleth": "{\"tileset\": \"parcels\", \"pickable\": true}"
        }));
        let s1 = s0.merged(&json!({ "choropleth": { "select_id": "17" } }));

        let c = s1.choropleth().unwrap();
        assert_eq!(c.tileset.as_deref(), Some("parcels"));
        assert!(c.pickable);
        assert_eq!(c.select_id.as_deref(), Some("17"));
        assert_eq!(s1.username(), Some("acme"));
        assert!(s1.subtree_changed(&s0, "choropleth"));
        assert!(!s1.subtree_changed(&s0, "username"));
    }

    #[test]
    fn malformed_group_falls_back_to_defaults() {
        let s = ConfigSnapshot::from_raw(&json!({ "heatmap": [1, 2] }));
        let h = s.heatmap().unwrap();
        assert_eq!(h.tileset, None);
        assert!(!h.pickable);
    }

    #[test]
    fn malformed_field_leaves_its_group_intact() {
        let s0 = ConfigSnapshot::from_raw(&json!({
            "choropleth": { "tileset": "parcels", "pickable": true }
        }));
        let s1 = s0.merged(&json!({ "choropleth": { "outline_width": "wide" } }));
        let c = s1.choropleth().unwrap();
        assert_eq!(c.tileset.as_deref(), Some("parcels"));
        assert!(c.pickable);
        assert_eq!(c.style.outline_width, 1.0);
    }

    #[test]
    fn numeric_looking_tileset_stays_a_name() {
        let s = ConfigSnapshot::from_raw(&json!({
            "choropleth": { "tileset": "2021", "pickable": true },
            "stories": 2022
        }));
        let c = s.choropleth().unwrap();
        assert_eq!(c.tileset.as_deref(), Some("2021"));
        assert!(c.pickable);
        assert_eq!(s.stories(), Some("2022"));
    }

    #[test]
    fn absent_group_is_none() {
        let s = ConfigSnapshot::from_raw(&json!({ "username": "acme" }));
        assert!(s.choropleth().is_none());
        assert!(s.stories().is_none());
    }

    #[test]
    fn select_id_tristate() {
        let s = ConfigSnapshot::from_raw(&json!({ "choropleth": { "tileset": "t" } }));
        assert_eq!(s.choropleth_select_id(), None);
        let s = s.merged(&json!({ "choropleth": { "select_id": null } }));
        assert_eq!(s.choropleth_select_id(), Some(None));
        let s = s.merged(&json!({ "choropleth": { "select_id": "9" } }));
        assert_eq!(s.choropleth_select_id(), Some(Some("9".to_string())));
    }

    #[test]
    fn non_object_push_is_ignored() {
        let s0 = ConfigSnapshot::from_raw(&json!({ "username": "acme" }));
        let s1 = s0.merged(&json!("not json"));
        assert_eq!(s0, s1);
    }
}
