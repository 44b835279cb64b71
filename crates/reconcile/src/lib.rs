//! Keeps map layers on a [`surface::RenderSurface`] in step with a
//! declarative host configuration.
//!
//! The [`Engine`] is single-threaded and deterministic. Hosts drive it through
//! three entry points: [`Engine::push_configuration`],
//! [`Engine::handle_event`] and [`Engine::advance_to`].

pub mod appliers;
pub mod context;
pub mod cycle;
pub mod engine;
pub mod events;
pub mod gate;
pub mod layer_set;
pub mod options;
pub mod tracker;

pub use context::{Continuation, MapContext};
pub use cycle::{CycleState, CycleStep, ReconcileCycle};
pub use engine::Engine;
pub use events::HostEvent;
pub use gate::{GateStatus, ReadinessGate};
pub use layer_set::LayerSet;
pub use options::{EngineOptions, ReadinessMode};
pub use tracker::SelectionTracker;
