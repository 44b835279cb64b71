use std::time::Duration;

use foundation::{Generation, HandlerId, Time};
use layers::GroupKind;
use runtime::{EventBus, TimerId, TimerQueue};
use surface::{EventKind, RenderSurface};

use crate::events::HostEvent;
use crate::options::EngineOptions;

/// Work scheduled for later, tagged with the generation it was issued under.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Continuation {
    ReadinessPoll { group: GroupKind, generation: Generation },
    SelectRetry { generation: Generation },
}

impl Continuation {
    pub fn group(&self) -> GroupKind {
        match self {
            Continuation::ReadinessPoll { group, .. } => *group,
            Continuation::SelectRetry { .. } => GroupKind::Choropleth,
        }
    }

    pub fn generation(&self) -> Generation {
        match self {
            Continuation::ReadinessPoll { generation, .. }
            | Continuation::SelectRetry { generation } => *generation,
        }
    }
}

/// Events the engine needs from the whole surface rather than one layer.
const SURFACE_EVENTS: [EventKind; 3] = [
    EventKind::SourceData,
    EventKind::Click,
    EventKind::MoveEnd,
];

/// Everything the components share: the surface, virtual time, pending timers
/// and the outward event bus.
///
/// Components receive the context per call and never keep a surface handle.
#[derive(Debug)]
pub struct MapContext<S> {
    pub surface: S,
    pub timers: TimerQueue<Continuation>,
    pub events: EventBus<HostEvent>,
    pub options: EngineOptions,
    now: Time,
    removed: bool,
    hooks: Vec<HandlerId>,
}

impl<S: RenderSurface> MapContext<S> {
    pub fn new(surface: S, options: EngineOptions) -> Self {
        Self {
            surface,
            timers: TimerQueue::new(),
            events: EventBus::new(),
            options,
            now: Time::ZERO,
            removed: false,
            hooks: Vec::new(),
        }
    }

    pub fn now(&self) -> Time {
        self.now
    }

    pub(crate) fn set_now(&mut self, now: Time) {
        self.now = self.now.max(now);
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }

    /// Subscribes to the surface-wide events once.
    pub(crate) fn attach(&mut self) {
        if self.removed || !self.hooks.is_empty() {
            return;
        }
        for kind in SURFACE_EVENTS {
            let id = self.surface.on(kind, None);
            self.hooks.push(id);
        }
    }

    pub(crate) fn detach(&mut self) {
        for id in std::mem::take(&mut self.hooks) {
            self.surface.off(id);
        }
    }

    pub(crate) fn mark_removed(&mut self) {
        self.removed = true;
        self.timers.cancel_where(|_| true);
    }

    pub fn schedule(&mut self, delay: Duration, continuation: Continuation) -> TimerId {
        self.timers.schedule(self.now, delay, continuation)
    }

    pub fn emit(&mut self, event: HostEvent) {
        self.events.emit(self.now, event);
    }
}
