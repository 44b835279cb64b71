//! The render-surface capability the engine drives.
//!
//! [`RenderSurface`] is the seam to the real map engine; [`HeadlessSurface`]
//! is an in-memory implementation that records every call.

pub mod error;
pub mod event;
pub mod feature;
pub mod headless;
pub mod style;
pub mod surface;

pub use error::*;
pub use event::*;
pub use feature::*;
pub use headless::*;
pub use style::*;
pub use surface::*;
