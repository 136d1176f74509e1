// src/termination.rs
//
// Reward / termination state machine.
//
//   Active -> { Active, Success, Timeout }
//
// Evaluated once per step, after the psychology update, success before
// timeout. Success and Timeout are absorbing; the environment refuses
// further steps until reset.

use serde::{Deserialize, Serialize};

use crate::store::ConfigStore;

/// Lifecycle phase of one episode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EpisodePhase {
    #[default]
    Active,
    /// Closing action taken with every ready threshold met.
    Success,
    /// `max_turns` reached without success.
    Timeout,
}

impl EpisodePhase {
    /// Stable lowercase name (used in logs and transcripts).
    pub fn as_str(&self) -> &'static str {
        match self {
            EpisodePhase::Active => "active",
            EpisodePhase::Success => "success",
            EpisodePhase::Timeout => "timeout",
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, EpisodePhase::Active)
    }

    /// Gym `terminated` flag.
    pub fn terminated(&self) -> bool {
        matches!(self, EpisodePhase::Success)
    }

    /// Gym `truncated` flag.
    pub fn truncated(&self) -> bool {
        matches!(self, EpisodePhase::Timeout)
    }
}

impl std::fmt::Display for EpisodePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// True if every thresholded trait is at or above its threshold.
pub fn is_ready(store: &ConfigStore, psychology: &[f64]) -> bool {
    store
        .thresholds()
        .iter()
        .all(|t| psychology[t.trait_index] >= t.value)
}

/// Phase after a step that took `action` and advanced the counter to `turn`.
pub fn evaluate(store: &ConfigStore, psychology: &[f64], action: usize, turn: u32) -> EpisodePhase {
    if store.is_closing(action) && is_ready(store, psychology) {
        return EpisodePhase::Success;
    }
    if turn >= store.max_turns() {
        return EpisodePhase::Timeout;
    }
    EpisodePhase::Active
}

/// Sparse terminal reward for a phase.
pub fn reward(store: &ConfigStore, phase: EpisodePhase) -> f64 {
    let spec = store.reward();
    match phase {
        EpisodePhase::Active => 0.0,
        EpisodePhase::Success => spec.success,
        EpisodePhase::Timeout => spec.timeout,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::scenario_store;

    #[test]
    fn flags_are_exclusive() {
        for phase in [
            EpisodePhase::Active,
            EpisodePhase::Success,
            EpisodePhase::Timeout,
        ] {
            assert!(!(phase.terminated() && phase.truncated()));
            assert_eq!(phase.is_terminal(), phase.terminated() || phase.truncated());
        }
    }

    #[test]
    fn thresholds_are_inclusive() {
        let store = scenario_store();
        // interest, trust, commitment
        assert!(is_ready(&store, &[0.5, 0.5, 0.5]));
        assert!(!is_ready(&store, &[0.5, 0.4999, 0.5]));
    }

    #[test]
    fn success_wins_on_final_turn() {
        let store = scenario_store();
        let close = store.action_index("close").unwrap();
        let phase = evaluate(&store, &[0.9, 0.9, 0.9], close, store.max_turns());
        assert_eq!(phase, EpisodePhase::Success);
        assert_eq!(reward(&store, phase), 1.0);
    }

    #[test]
    fn non_closing_action_never_succeeds() {
        let store = scenario_store();
        let pitch = store.action_index("pitch").unwrap();
        assert_eq!(
            evaluate(&store, &[1.0, 1.0, 1.0], pitch, 3),
            EpisodePhase::Active
        );
        let phase = evaluate(&store, &[1.0, 1.0, 1.0], pitch, store.max_turns());
        assert_eq!(phase, EpisodePhase::Timeout);
        assert_eq!(reward(&store, phase), 0.0);
    }

    #[test]
    fn closing_when_not_ready_stays_active() {
        let store = scenario_store();
        let close = store.action_index("close").unwrap();
        assert_eq!(
            evaluate(&store, &[0.3, 0.25, 0.2], close, 1),
            EpisodePhase::Active
        );
    }
}
