#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurfaceError {
    /// The style has not finished loading; layer mutations are rejected.
    StyleNotLoaded,
    DuplicateSource(String),
    DuplicateLayer(String),
    UnknownSource(String),
    UnknownLayer(String),
    /// The surface was torn down by its owner.
    Removed,
    Engine(String),
}

impl std::fmt::Display for SurfaceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SurfaceError::StyleNotLoaded => write!(f, "style is not done loading"),
            SurfaceError::DuplicateSource(id) => write!(f, "source already exists: {id}"),
            SurfaceError::DuplicateLayer(id) => write!(f, "layer already exists: {id}"),
            SurfaceError::UnknownSource(id) => write!(f, "unknown source: {id}"),
            SurfaceError::UnknownLayer(id) => write!(f, "unknown layer: {id}"),
            SurfaceError::Removed => write!(f, "render surface was removed"),
            SurfaceError::Engine(msg) => write!(f, "render engine error: {msg}"),
        }
    }
}

impl std::error::Error for SurfaceError {}
