// src/state.rs
//
// Mutable state of one episode.
//
// Created wholesale at reset, advanced only by `EpisodeState::commit`, and
// dropped at the next reset. Nothing here survives across episodes.

use serde::{Deserialize, Serialize};

use crate::termination::EpisodePhase;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeState {
    /// Trait values in config trait order, each in [0, 1].
    pub psychology: Vec<f64>,
    /// Steps taken so far.
    pub turn: u32,
    /// Action ids in the order they were taken. `history.len() == turn`.
    pub history: Vec<usize>,
    /// Per-action occurrence counts (length = action count).
    pub action_counts: Vec<u32>,
    /// Persona index drawn at reset.
    pub persona: usize,
    pub phase: EpisodePhase,
    /// Seed of this episode's RNG stream.
    pub seed: u64,
}

impl EpisodeState {
    pub fn new(psychology: Vec<f64>, persona: usize, action_count: usize, seed: u64) -> Self {
        Self {
            psychology,
            turn: 0,
            history: Vec::new(),
            action_counts: vec![0; action_count],
            persona,
            phase: EpisodePhase::Active,
            seed,
        }
    }

    /// Commit an already validated transition.
    pub(crate) fn commit(&mut self, action: usize, psychology: Vec<f64>) {
        self.psychology = psychology;
        self.history.push(action);
        self.action_counts[action] += 1;
        self.turn += 1;
    }

    pub fn last_action(&self) -> Option<usize> {
        self.history.last().copied()
    }

    pub fn terminated(&self) -> bool {
        self.phase.terminated()
    }

    pub fn truncated(&self) -> bool {
        self.phase.truncated()
    }

    pub fn is_done(&self) -> bool {
        self.phase.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_state_is_active_and_empty() {
        let s = EpisodeState::new(vec![0.1, 0.2], 1, 3, 42);
        assert_eq!(s.turn, 0);
        assert!(s.history.is_empty());
        assert_eq!(s.action_counts, vec![0, 0, 0]);
        assert!(!s.terminated() && !s.truncated());
        assert_eq!(s.last_action(), None);
    }

    #[test]
    fn commit_keeps_history_in_step_with_turn() {
        let mut s = EpisodeState::new(vec![0.1], 0, 2, 0);
        s.commit(1, vec![0.2]);
        s.commit(1, vec![0.3]);
        s.commit(0, vec![0.3]);
        assert_eq!(s.turn as usize, s.history.len());
        assert_eq!(s.history, vec![1, 1, 0]);
        assert_eq!(s.action_counts, vec![1, 2]);
        assert_eq!(s.last_action(), Some(0));
        assert_eq!(s.psychology, vec![0.3]);
    }
}
