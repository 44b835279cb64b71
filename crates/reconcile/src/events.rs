use layers::GroupKind;
use serde::Serialize;

/// One-way notifications for the host.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum HostEvent {
    /// A feature was clicked; both fields are `None` on deselection.
    Selection {
        feature_id: Option<String>,
        source_layer: Option<String>,
    },
    /// The camera settled. Coordinates carry 4 decimals, zoom 2.
    ViewState {
        longitude: f64,
        latitude: f64,
        zoom: f64,
        bounds: [f64; 4],
    },
    /// The host should fetch this metadata and hand it to `Engine::set_catalog`.
    CatalogRequest {
        group: GroupKind,
        tileset: String,
        metadata_url: String,
    },
}

impl HostEvent {
    pub fn deselection() -> Self {
        HostEvent::Selection {
            feature_id: None,
            source_layer: None,
        }
    }
}

pub(crate) fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}
