/// Monotonic reconciliation generation.
///
/// Every reconciliation run bumps the generation of its layer group. Work that
/// was scheduled under an older generation compares against the current one
/// and becomes a no-op once it is stale.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Generation(pub u64);

impl Generation {
    pub const ZERO: Generation = Generation(0);

    pub fn next(self) -> Self {
        Generation(self.0.wrapping_add(1))
    }

    /// `true` when `self` was captured before `current` was issued.
    pub fn is_stale(self, current: Generation) -> bool {
        self != current
    }
}

impl std::fmt::Display for Generation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "g{}", self.0)
    }
}

/// Engine-assigned feature id. Only meaningful while the source that produced
/// it stays attached to the surface.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct FeatureId(pub u64);

/// Handle returned by the surface when an event subscription is registered.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct HandlerId(pub u64);

#[cfg(test)]
mod tests {
    use super::Generation;

    #[test]
    fn next_generation_makes_previous_stale() {
        let g0 = Generation::ZERO;
        let g1 = g0.next();
        assert!(g0.is_stale(g1));
        assert!(!g1.is_stale(g1));
        assert_eq!(g1.to_string(), "g1");
    }
}
