//! Agent lifecycle state machine.
//!
//! ```text
//! installing ──Installed──▶ waiting ──ControllerReleased / SkipWaiting──▶ activating ──Activated──▶ active
//!     │                                                                        ▲
//!     ├──Installed (skip-waiting requested)────────────────────────────────────┘
//!     └──InstallFailed──▶ redundant ◀──Superseded── active
//! ```
//!
//! [`Lifecycle::apply`] is pure: it never touches caches or clients. It
//! returns the effects the controller must carry out for the transition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Lifecycle phase of one agent instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Installing,
    Waiting,
    Activating,
    Active,
    /// Install failed or a newer version took over; this instance never
    /// serves requests again.
    Redundant,
}

/// Inputs to the state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleEvent {
    /// Precache population finished successfully.
    Installed,
    /// Precache population failed.
    InstallFailed,
    /// No other instance controls open pages any more.
    ControllerReleased,
    /// A page asked for immediate takeover.
    SkipWaiting,
    /// Eviction, claim and broadcast finished.
    Activated,
    /// Another version claimed the pages this instance controlled.
    Superseded,
}

/// Work the controller performs after a transition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Effect {
    /// Evict stale caches, claim clients, broadcast, then report `Activated`.
    BeginActivation,
}

/// Result of applying an event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub from: Phase,
    pub to: Phase,
    pub effects: Vec<Effect>,
}

impl Transition {
    pub fn changed(&self) -> bool {
        self.from != self.to
    }
}

/// Current phase plus the remembered skip-waiting request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Lifecycle {
    phase: Phase,
    skip_waiting: bool,
}

impl Lifecycle {
    /// A fresh instance in `installing`. With `skip_waiting` set, install
    /// completion moves straight to `activating`.
    pub fn new(skip_waiting: bool) -> Self {
        Self { phase: Phase::Installing, skip_waiting }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Apply `event` and return the resulting transition.
    ///
    /// Events that make no sense in the current phase are errors, except
    /// `SkipWaiting` and `ControllerReleased`, which are harmless repeats once
    /// the instance is already activating or active, and anything delivered
    /// to a redundant instance other than `Installed` or `Activated`.
    pub fn apply(&mut self, event: LifecycleEvent) -> Result<Transition, Error> {
        use LifecycleEvent as E;
        use Phase as P;

        let from = self.phase;
        let (to, effects) = match (from, event) {
            (P::Installing, E::Installed) if self.skip_waiting => (P::Activating, vec![Effect::BeginActivation]),
            (P::Installing, E::Installed) => (P::Waiting, vec![]),
            (P::Installing, E::InstallFailed) => (P::Redundant, vec![]),
            (P::Installing, E::SkipWaiting) => {
                self.skip_waiting = true;
                (P::Installing, vec![])
            }
            (P::Installing, E::ControllerReleased) => (P::Installing, vec![]),
            (P::Waiting, E::ControllerReleased | E::SkipWaiting) => (P::Activating, vec![Effect::BeginActivation]),
            (P::Activating, E::Activated) => (P::Active, vec![]),
            (P::Activating | P::Active, E::SkipWaiting | E::ControllerReleased) => (from, vec![]),
            (P::Active, E::Superseded) => (P::Redundant, vec![]),
            (P::Redundant, E::SkipWaiting | E::ControllerReleased | E::Superseded) => (P::Redundant, vec![]),
            (phase, event) => {
                return Err(Error::InvalidState(format!("{event:?} not allowed while {phase:?}")));
            }
        };

        self.phase = to;
        Ok(Transition { from, to, effects })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_install_then_wait() {
        let mut lc = Lifecycle::new(false);
        let t = lc.apply(LifecycleEvent::Installed).unwrap();
        assert_eq!(t.to, Phase::Waiting);
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_install_with_skip_waiting_activates() {
        let mut lc = Lifecycle::new(true);
        let t = lc.apply(LifecycleEvent::Installed).unwrap();
        assert_eq!(t.to, Phase::Activating);
        assert_eq!(t.effects, vec![Effect::BeginActivation]);
    }

    #[test]
    fn test_skip_waiting_while_waiting() {
        let mut lc = Lifecycle::new(false);
        lc.apply(LifecycleEvent::Installed).unwrap();
        let t = lc.apply(LifecycleEvent::SkipWaiting).unwrap();
        assert_eq!((t.from, t.to), (Phase::Waiting, Phase::Activating));
        assert_eq!(t.effects, vec![Effect::BeginActivation]);
    }

    #[test]
    fn test_skip_waiting_during_install_is_remembered() {
        let mut lc = Lifecycle::new(false);
        let t = lc.apply(LifecycleEvent::SkipWaiting).unwrap();
        assert!(!t.changed());
        assert_eq!(lc.apply(LifecycleEvent::Installed).unwrap().to, Phase::Activating);
    }

    #[test]
    fn test_controller_released() {
        let mut lc = Lifecycle::new(false);
        lc.apply(LifecycleEvent::Installed).unwrap();
        assert_eq!(lc.apply(LifecycleEvent::ControllerReleased).unwrap().to, Phase::Activating);
        assert_eq!(lc.apply(LifecycleEvent::Activated).unwrap().to, Phase::Active);
    }

    #[test]
    fn test_install_failure_is_terminal() {
        let mut lc = Lifecycle::new(true);
        assert_eq!(lc.apply(LifecycleEvent::InstallFailed).unwrap().to, Phase::Redundant);
        assert!(matches!(lc.apply(LifecycleEvent::Installed), Err(Error::InvalidState(_))));
        assert!(matches!(lc.apply(LifecycleEvent::Activated), Err(Error::InvalidState(_))));
    }

    #[test]
    fn test_skip_waiting_ignored_when_redundant() {
        let mut lc = Lifecycle::new(false);
        lc.apply(LifecycleEvent::InstallFailed).unwrap();
        let t = lc.apply(LifecycleEvent::SkipWaiting).unwrap();
        assert!(!t.changed());
        assert!(t.effects.is_empty());
        assert_eq!(lc.phase(), Phase::Redundant);
    }

    #[test]
    fn test_superseded_active_becomes_redundant() {
        let mut lc = Lifecycle::new(true);
        lc.apply(LifecycleEvent::Installed).unwrap();
        lc.apply(LifecycleEvent::Activated).unwrap();
        let t = lc.apply(LifecycleEvent::Superseded).unwrap();
        assert_eq!((t.from, t.to), (Phase::Active, Phase::Redundant));
        assert!(!lc.apply(LifecycleEvent::Superseded).unwrap().changed());
    }

    #[test]
    fn test_superseded_requires_active() {
        let mut lc = Lifecycle::new(false);
        lc.apply(LifecycleEvent::Installed).unwrap();
        assert!(matches!(lc.apply(LifecycleEvent::Superseded), Err(Error::InvalidState(_))));
        assert_eq!(lc.phase(), Phase::Waiting);
    }

    #[test]
    fn test_repeat_signals_when_active() {
        let mut lc = Lifecycle::new(true);
        lc.apply(LifecycleEvent::Installed).unwrap();
        lc.apply(LifecycleEvent::Activated).unwrap();
        let t = lc.apply(LifecycleEvent::SkipWaiting).unwrap();
        assert!(!t.changed());
        assert!(t.effects.is_empty());
    }

    #[test]
    fn test_activated_out_of_order() {
        let mut lc = Lifecycle::new(false);
        assert!(matches!(lc.apply(LifecycleEvent::Activated), Err(Error::InvalidState(_))));
        assert_eq!(lc.phase(), Phase::Installing);
    }
}
