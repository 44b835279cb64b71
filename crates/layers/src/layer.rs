use serde::Serialize;
use surface::{LayerKind, PropertyMap, SourceSpec, StyleLayer, StyleLayerInfo};

/// Where a layer is inserted relative to the basemap.
///
/// Anchors stay declarative until materialization, when they are resolved
/// against the style that is actually loaded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Anchor {
    Top,
    Layer(String),
    /// Below the first layer of `kind` whose id contains `id_contains`.
    FirstMatching { kind: LayerKind, id_contains: String },
}

impl Anchor {
    pub fn layer(id: impl Into<String>) -> Self {
        Anchor::Layer(id.into())
    }

    pub fn first_matching(kind: LayerKind, id_contains: impl Into<String>) -> Self {
        Anchor::FirstMatching {
            kind,
            id_contains: id_contains.into(),
        }
    }

    /// Id to pass as `before`; `None` places the layer on top.
    pub fn resolve(&self, style: &[StyleLayerInfo]) -> Option<String> {
        match self {
            Anchor::Top => None,
            Anchor::Layer(id) => style.iter().find(|l| l.id == *id).map(|l| l.id.clone()),
            Anchor::FirstMatching { kind, id_contains } => style
                .iter()
                .find(|l| l.kind == *kind && l.id.contains(id_contains.as_str()))
                .map(|l| l.id.clone()),
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanionRole {
    Outline,
    Selection,
    Point,
}

impl CompanionRole {
    pub fn suffix(self) -> &'static str {
        match self {
            CompanionRole::Outline => "-outline",
            CompanionRole::Selection => "-selected",
            CompanionRole::Point => "-point",
        }
    }
}

/// A derived sub-layer sharing its base layer's source.
#[derive(Debug, Clone, PartialEq)]
pub struct Companion {
    pub role: CompanionRole,
    pub kind: LayerKind,
    pub minzoom: f64,
    pub maxzoom: f64,
    pub paint: PropertyMap,
    pub layout: PropertyMap,
    pub anchor: Anchor,
}

/// Desired state of one base layer, its source and its companions.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSpec {
    /// Unique within a derivation; also the id of the owned source.
    pub id: String,
    pub source_url: String,
    pub source_layer: String,
    pub kind: LayerKind,
    pub minzoom: f64,
    pub maxzoom: f64,
    pub paint: PropertyMap,
    pub layout: PropertyMap,
    pub anchor: Anchor,
    pub companions: Vec<Companion>,
}

impl LayerSpec {
    pub fn source(&self) -> SourceSpec {
        SourceSpec::vector(self.id.clone(), self.source_url.clone())
    }

    pub fn companion_id(&self, role: CompanionRole) -> String {
        format!("{}{}", self.id, role.suffix())
    }

    pub fn base_layer(&self) -> StyleLayer {
        StyleLayer {
            id: self.id.clone(),
            kind: self.kind,
            source: self.id.clone(),
            source_layer: self.source_layer.clone(),
            minzoom: self.minzoom,
            maxzoom: self.maxzoom,
            paint: self.paint.clone(),
            layout: self.layout.clone(),
        }
    }

    pub fn companion_layer(&self, companion: &Companion) -> StyleLayer {
        StyleLayer {
            id: self.companion_id(companion.role),
            kind: companion.kind,
            source: self.id.clone(),
            source_layer: self.source_layer.clone(),
            minzoom: companion.minzoom,
            maxzoom: companion.maxzoom,
            paint: companion.paint.clone(),
            layout: companion.layout.clone(),
        }
    }

    /// Base id followed by companion ids, in materialization order.
    pub fn layer_ids(&self) -> Vec<String> {
        std::iter::once(self.id.clone())
            .chain(self.companions.iter().map(|c| self.companion_id(c.role)))
            .collect()
    }

    pub fn covers_zoom(&self, zoom: f64) -> bool {
        self.minzoom <= zoom && zoom <= self.maxzoom
    }
}
