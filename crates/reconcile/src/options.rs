use std::time::Duration;

use runtime::RetryPolicy;
use serde::{Deserialize, Serialize};

/// How the readiness gate learns that the style finished loading.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ReadinessMode {
    /// Subscribe once to the surface's style-loaded event.
    #[default]
    Event,
    /// Re-check `is_style_loaded` on a timer, then fall back to the event.
    Poll {
        #[serde(default = "default_poll_interval_ms")]
        interval_ms: u64,
        #[serde(default = "default_poll_attempts")]
        max_attempts: u32,
    },
}

fn default_poll_interval_ms() -> u64 {
    250
}

fn default_poll_attempts() -> u32 {
    20
}

/// Tunables of the engine itself. Every field has a default, so `{}` is a
/// valid options document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineOptions {
    #[serde(default)]
    pub readiness: ReadinessMode,
    #[serde(default = "default_select_retry_interval_ms")]
    pub select_retry_interval_ms: u64,
    #[serde(default = "default_select_max_retries")]
    pub select_max_retries: u32,
    /// Feature property holding the host-facing feature id.
    #[serde(default = "default_id_property")]
    pub id_property: String,
    /// Layers with a metadata key under this prefix belong to the basemap.
    #[serde(default = "default_basemap_metadata_prefix")]
    pub basemap_metadata_prefix: String,
    /// Basemap layer recognised by id when it carries no metadata.
    #[serde(default = "default_basemap_fallback_layer")]
    pub basemap_fallback_layer: String,
    /// Basemap fill layer hidden while a building choropleth is in range.
    #[serde(default = "default_building_layer_id")]
    pub building_layer_id: String,
}

fn default_select_retry_interval_ms() -> u64 {
    250
}

fn default_select_max_retries() -> u32 {
    5
}

fn default_id_property() -> String {
    "ID".to_string()
}

fn default_basemap_metadata_prefix() -> String {
    "mapbox:".to_string()
}

fn default_basemap_fallback_layer() -> String {
    "building".to_string()
}

fn default_building_layer_id() -> String {
    "building".to_string()
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            readiness: ReadinessMode::default(),
            select_retry_interval_ms: default_select_retry_interval_ms(),
            select_max_retries: default_select_max_retries(),
            id_property: default_id_property(),
            basemap_metadata_prefix: default_basemap_metadata_prefix(),
            basemap_fallback_layer: default_basemap_fallback_layer(),
            building_layer_id: default_building_layer_id(),
        }
    }
}

impl EngineOptions {
    pub fn select_retry_policy(&self) -> RetryPolicy {
        RetryPolicy::new(
            Duration::from_millis(self.select_retry_interval_ms),
            self.select_max_retries,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn empty_document_yields_defaults() {
        let opts: EngineOptions = serde_json::from_value(json!({})).unwrap();
        assert_eq!(opts, EngineOptions::default());
        assert_eq!(
            opts.select_retry_policy(),
            RetryPolicy::new(Duration::from_millis(250), 5)
        );
    }

    #[test]
    fn poll_mode_fills_missing_fields() {
        let opts: EngineOptions =
            serde_json::from_value(json!({"readiness": {"mode": "poll", "interval_ms": 100}}))
                .unwrap();
        assert_eq!(
            opts.readiness,
            ReadinessMode::Poll {
                interval_ms: 100,
                max_attempts: 20
            }
        );
    }
}
