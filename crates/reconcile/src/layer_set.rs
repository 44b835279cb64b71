use foundation::HandlerId;
use layers::LayerSpec;

/// A spec whose source and layers are on the surface, with its pointer hooks.
#[derive(Debug, Clone)]
pub struct MaterializedLayer {
    pub spec: LayerSpec,
    pub hooks: Vec<HandlerId>,
}

/// Layers the reconciliation cycle has put on the surface, in order.
///
/// `all_loaded` implies every listed layer and its source exist on the
/// surface. Readers must not act on a set that is not loaded.
#[derive(Debug, Default)]
pub struct LayerSet {
    entries: Vec<MaterializedLayer>,
    all_loaded: bool,
}

impl LayerSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn layer_ids(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.spec.id.as_str()).collect()
    }

    pub fn all_loaded(&self) -> bool {
        self.all_loaded
    }

    /// Loaded and non-empty.
    pub fn is_ready(&self) -> bool {
        self.all_loaded && !self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn specs(&self) -> impl Iterator<Item = &LayerSpec> + '_ {
        self.entries.iter().map(|e| &e.spec)
    }

    pub fn get(&self, id: &str) -> Option<&LayerSpec> {
        self.entries.iter().map(|e| &e.spec).find(|s| s.id == id)
    }

    /// Spec that owns `layer_id` as its base or one of its companions.
    pub fn owner_of(&self, layer_id: &str) -> Option<&LayerSpec> {
        self.specs()
            .find(|s| s.layer_ids().iter().any(|id| id == layer_id))
    }

    /// Whether pointer hooks are attached to the base layer `id`.
    pub fn is_pickable(&self, id: &str) -> bool {
        self.entries
            .iter()
            .any(|e| e.spec.id == id && !e.hooks.is_empty())
    }

    /// Every surface layer id: bases followed by their companions.
    pub fn surface_layer_ids(&self) -> Vec<String> {
        self.specs().flat_map(LayerSpec::layer_ids).collect()
    }

    pub(crate) fn push(&mut self, entry: MaterializedLayer) {
        self.all_loaded = false;
        self.entries.push(entry);
    }

    pub(crate) fn mark_loaded(&mut self) {
        self.all_loaded = true;
    }

    /// Empties the set, handing back what was materialized.
    pub(crate) fn take(&mut self) -> Vec<MaterializedLayer> {
        self.all_loaded = false;
        std::mem::take(&mut self.entries)
    }
}
