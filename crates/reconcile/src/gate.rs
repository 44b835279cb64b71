use std::time::Duration;

use foundation::{Generation, HandlerId};
use layers::GroupKind;
use runtime::{BoundedRetry, RetryPolicy, RetryStep, TimerId};
use surface::{EventKind, RenderSurface};
use tracing::{debug, warn};

use crate::context::{Continuation, MapContext};
use crate::options::ReadinessMode;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum GateStatus {
    Ready,
    Pending,
    /// The surface went away; the caller must not proceed.
    Abandoned,
}

/// Holds a reconciliation back until the surface's style has loaded.
///
/// At most one subscription (or poll timer) is outstanding. Waiting again for
/// the same generation is a no-op; waiting for a newer one re-targets the
/// existing subscription.
#[derive(Debug, Default)]
pub struct ReadinessGate {
    waiting: Option<Generation>,
    subscription: Option<HandlerId>,
    poll: Option<BoundedRetry>,
    poll_timer: Option<TimerId>,
}

impl ReadinessGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn await_ready<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        group: GroupKind,
        generation: Generation,
    ) -> GateStatus {
        if ctx.is_removed() {
            self.reset();
            return GateStatus::Abandoned;
        }
        if ctx.surface.is_style_loaded() {
            self.release(ctx);
            return GateStatus::Ready;
        }
        self.wait(ctx, group, generation)
    }

    /// Waits for the next readiness signal without consulting the surface's
    /// current flag. Used after the surface rejected a mutation as not loaded.
    pub fn wait<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        group: GroupKind,
        generation: Generation,
    ) -> GateStatus {
        if ctx.is_removed() {
            self.reset();
            return GateStatus::Abandoned;
        }
        if self.waiting == Some(generation) {
            return GateStatus::Pending;
        }
        self.waiting = Some(generation);

        match ctx.options.readiness {
            ReadinessMode::Event => self.subscribe(ctx),
            ReadinessMode::Poll {
                interval_ms,
                max_attempts,
            } => {
                if let Some(timer) = self.poll_timer.take() {
                    ctx.timers.cancel(timer);
                }
                let interval = Duration::from_millis(interval_ms);
                self.poll = Some(BoundedRetry::new(RetryPolicy::new(
                    interval,
                    max_attempts.saturating_sub(1),
                )));
                self.poll_timer = Some(ctx.schedule(
                    interval,
                    Continuation::ReadinessPoll { group, generation },
                ));
            }
        }
        debug!(%group, %generation, "waiting for style to load");
        GateStatus::Pending
    }

    /// The style-loaded event fired. Returns the generation to resume.
    pub fn on_style_loaded<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
    ) -> Option<Generation> {
        let generation = self.waiting?;
        self.release(ctx);
        Some(generation)
    }

    /// A poll timer fired for `generation`.
    pub fn on_poll<S: RenderSurface>(
        &mut self,
        ctx: &mut MapContext<S>,
        group: GroupKind,
        generation: Generation,
    ) -> GateStatus {
        if ctx.is_removed() {
            self.reset();
            return GateStatus::Abandoned;
        }
        if self.waiting != Some(generation) {
            debug!(%group, %generation, "stale readiness poll ignored");
            return GateStatus::Pending;
        }
        self.poll_timer = None;
        let loaded = ctx.surface.is_style_loaded();
        let Some(poll) = self.poll.as_mut() else {
            return GateStatus::Pending;
        };
        match poll.attempt(|| loaded.then_some(())) {
            RetryStep::Done(()) => {
                self.release(ctx);
                GateStatus::Ready
            }
            RetryStep::RetryAfter(delay) => {
                self.poll_timer = Some(ctx.schedule(
                    delay,
                    Continuation::ReadinessPoll { group, generation },
                ));
                GateStatus::Pending
            }
            RetryStep::Exhausted => {
                warn!(%group, %generation, "style still loading after polling; waiting for load event");
                self.poll = None;
                self.subscribe(ctx);
                GateStatus::Pending
            }
        }
    }

    /// Drops the subscription and any poll timer.
    pub fn release<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) {
        if let Some(handler) = self.subscription.take()
            && !ctx.is_removed()
        {
            ctx.surface.off(handler);
        }
        if let Some(timer) = self.poll_timer.take() {
            ctx.timers.cancel(timer);
        }
        self.waiting = None;
        self.poll = None;
    }

    /// Forgets all state without touching the surface.
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn subscribe<S: RenderSurface>(&mut self, ctx: &mut MapContext<S>) {
        if self.subscription.is_none() {
            self.subscription = Some(ctx.surface.on(EventKind::StyleLoaded, None));
        }
    }
}
