pub mod de;
pub mod normalize;
pub mod snapshot;
pub mod views;

pub use normalize::*;
pub use snapshot::*;
pub use views::*;
