//! Layer specs: the desired state the reconciler drives a surface towards.

pub mod derive;
pub mod layer;
pub mod symbology;

pub use derive::*;
pub use layer::*;
