//! Tileset catalog: which source layers a vector tileset exposes.
//!
//! Fetching the metadata is the host's job. This crate names the endpoint,
//! parses the TileJSON it returns, and offers a [`CatalogSource`] seam for
//! hosts (and tests) that can resolve catalogs synchronously.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A tileset owned by a tile-hosting account.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TilesetRef {
    pub username: String,
    pub tileset: String,
}

impl TilesetRef {
    pub fn new(username: impl Into<String>, tileset: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            tileset: tileset.into(),
        }
    }

    /// Vector source URL handed to the render surface.
    pub fn source_url(&self) -> String {
        format!("mapbox://{}.{}", self.username, self.tileset)
    }

    /// TileJSON endpoint listing the tileset's source layers.
    pub fn metadata_url(&self, token: &str) -> String {
        format!(
            "https://api.mapbox.com/v4/{}.{}.json?secure&access_token={}",
            self.username, self.tileset, token
        )
    }
}

/// One source layer inside a vector tileset.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorLayerInfo {
    pub id: String,
    #[serde(default)]
    pub minzoom: f64,
    #[serde(default = "default_maxzoom")]
    pub maxzoom: f64,
}

fn default_maxzoom() -> f64 {
    22.0
}

impl VectorLayerInfo {
    pub fn new(id: impl Into<String>, minzoom: f64, maxzoom: f64) -> Self {
        Self {
            id: id.into(),
            minzoom,
            maxzoom,
        }
    }
}

/// Resolved catalog: the source layers plus the URL of the vector source.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct TilesetCatalog {
    pub vector_layers: Vec<VectorLayerInfo>,
    pub url: String,
}

impl TilesetCatalog {
    pub fn new(url: impl Into<String>, vector_layers: Vec<VectorLayerInfo>) -> Self {
        Self {
            vector_layers,
            url: url.into(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vector_layers.is_empty()
    }
}

#[derive(Debug, Deserialize)]
struct TileJson {
    #[serde(default)]
    vector_layers: Vec<VectorLayerInfo>,
}

/// Parses a TileJSON document into a catalog for `tileset`.
///
/// Unknown TileJSON fields are ignored; a document without `vector_layers`
/// yields an empty catalog.
pub fn parse_tilejson(raw: &str, tileset: &TilesetRef) -> Result<TilesetCatalog, CatalogError> {
    let doc: TileJson =
        serde_json::from_str(raw).map_err(|e| CatalogError::Corrupt(e.to_string()))?;
    tracing::debug!(
        tileset = %tileset.tileset,
        layers = doc.vector_layers.len(),
        "parsed tileset metadata"
    );
    Ok(TilesetCatalog::new(tileset.source_url(), doc.vector_layers))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    NotFound,
    Corrupt(String),
    Unavailable(String),
}

impl std::fmt::Display for CatalogError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CatalogError::NotFound => write!(f, "tileset not found"),
            CatalogError::Corrupt(msg) => write!(f, "tileset metadata corrupt: {msg}"),
            CatalogError::Unavailable(msg) => write!(f, "tileset metadata unavailable: {msg}"),
        }
    }
}

impl std::error::Error for CatalogError {}

pub trait CatalogSource {
    fn resolve(&self, tileset: &TilesetRef) -> Result<TilesetCatalog, CatalogError>;
}

/// Catalogs registered up front, keyed by tileset.
#[derive(Debug, Default)]
pub struct InMemoryCatalogSource {
    entries: BTreeMap<TilesetRef, TilesetCatalog>,
}

impl InMemoryCatalogSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, tileset: TilesetRef, catalog: TilesetCatalog) {
        self.entries.insert(tileset, catalog);
    }

    pub fn insert_tilejson(&mut self, tileset: TilesetRef, raw: &str) -> Result<(), CatalogError> {
        let catalog = parse_tilejson(raw, &tileset)?;
        self.insert(tileset, catalog);
        Ok(())
    }
}

impl CatalogSource for InMemoryCatalogSource {
    fn resolve(&self, tileset: &TilesetRef) -> Result<TilesetCatalog, CatalogError> {
        self.entries
            .get(tileset)
            .cloned()
            .ok_or(CatalogError::NotFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn builds_urls_for_tileset() {
        let t = TilesetRef::new("acme", "parcels_v2");
        assert_eq!(t.source_url(), "mapbox://acme.parcels_v2");
        assert_eq!(
            t.metadata_url("pk.abc"),
            "https://api.mapbox.com/v4/acme.parcels_v2.json?secure&access_token=pk.abc"
        );
    }

    #[test]
    fn parses_vector_layers_and_ignores_extra_fields() {
        let raw = r#"{
            "tilejson": "3.0.0",
            "name": "parcels",
            "vector_layers": [
                {"id": "parcels", "minzoom": 10, "maxzoom": 16, "fields": {"ID": "String"}},
                {"id": "buildings"}
            ]
        }"#;
        let t = TilesetRef::new("acme", "parcels_v2");
        let catalog = parse_tilejson(raw, &t).unwrap();
        assert_eq!(
            catalog,
            TilesetCatalog::new(
                "mapbox://acme.parcels_v2",
                vec![
                    VectorLayerInfo::new("parcels", 10.0, 16.0),
                    VectorLayerInfo::new("buildings", 0.0, 22.0),
                ]
            )
        );
    }

    #[test]
    fn missing_vector_layers_is_empty() {
        let t = TilesetRef::new("acme", "empty");
        let catalog = parse_tilejson(r#"{"name": "x"}"#, &t).unwrap();
        assert!(catalog.is_empty());
    }

    #[test]
    fn invalid_json_is_corrupt() {
        let t = TilesetRef::new("acme", "bad");
        let err = parse_tilejson("{not json", &t).unwrap_err();
        assert!(matches!(err, CatalogError::Corrupt(_)));
    }

    #[test]
    fn in_memory_source_resolves_registered_tilesets() {
        let mut source = InMemoryCatalogSource::new();
        let t = TilesetRef::new("acme", "parcels");
        source
            .insert_tilejson(t.clone(), r#"{"vector_layers":[{"id":"parcels"}]}"#)
            .unwrap();
        assert_eq!(source.resolve(&t).unwrap().vector_layers.len(), 1);
        assert_eq!(
            source.resolve(&TilesetRef::new("acme", "other")),
            Err(CatalogError::NotFound)
        );
    }
}
