use foundation::time::Time;

/// Outward notification stamped with the engine time it was raised at.
#[derive(Debug, Clone, PartialEq)]
pub struct Emitted<E> {
    pub at: Time,
    pub event: E,
}

/// One-way queue of notifications for the host.
///
/// The engine only appends; the host drains at its own pace.
#[derive(Debug)]
pub struct EventBus<E> {
    events: Vec<Emitted<E>>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self { events: Vec::new() }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn emit(&mut self, at: Time, event: E) {
        self.events.push(Emitted { at, event });
    }

    pub fn events(&self) -> &[Emitted<E>] {
        &self.events
    }

    pub fn drain(&mut self) -> Vec<Emitted<E>> {
        std::mem::take(&mut self.events)
    }
}
