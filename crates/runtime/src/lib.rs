pub mod event_bus;
pub mod retry;
pub mod timer;

pub use event_bus::*;
pub use retry::*;
pub use timer::*;
