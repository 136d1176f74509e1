// src/transcript.rs
//
// Read-only episode summary for downstream reporters.
//
// A Transcript is a snapshot: building one never touches the environment,
// and nothing in it feeds back into a running episode.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::rl::observation::TraitObservation;
use crate::state::EpisodeState;
use crate::store::ConfigStore;
use crate::termination::EpisodePhase;

/// One action taken during the episode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptTurn {
    /// 1-based turn on which the action was taken.
    pub turn: u32,
    pub action: usize,
    pub action_id: String,
    pub action_label: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transcript {
    pub config_name: String,
    pub seed: u64,
    pub persona_id: String,
    pub persona_label: String,
    pub turns: Vec<TranscriptTurn>,
    pub final_traits: Vec<TraitObservation>,
    pub outcome: EpisodePhase,
    pub turn: u32,
}

impl Transcript {
    pub fn from_state(store: &ConfigStore, state: &EpisodeState) -> Self {
        let (persona_id, persona_label) = store
            .persona(state.persona)
            .map(|p| (p.id.clone(), p.label.clone()))
            .unwrap_or_default();

        let turns = state
            .history
            .iter()
            .enumerate()
            .map(|(i, &action)| {
                let (action_id, action_label) = store
                    .action(action)
                    .map(|a| (a.id.clone(), a.label.clone()))
                    .unwrap_or_default();
                TranscriptTurn {
                    turn: i as u32 + 1,
                    action,
                    action_id,
                    action_label,
                }
            })
            .collect();

        let final_traits = store
            .traits()
            .iter()
            .zip(state.psychology.iter())
            .map(|(t, v)| TraitObservation {
                id: t.id.clone(),
                value: *v,
            })
            .collect();

        Self {
            config_name: store.name().to_string(),
            seed: state.seed,
            persona_id,
            persona_label,
            turns,
            final_traits,
            outcome: state.phase,
            turn: state.turn,
        }
    }

    /// Ordered action ids.
    pub fn action_ids(&self) -> Vec<&str> {
        self.turns.iter().map(|t| t.action_id.as_str()).collect()
    }

    /// Plain-text rendering, one line per turn.
    pub fn render_text(&self) -> String {
        let mut out = String::new();
        let _ = writeln!(
            out,
            "[{}] persona={} ({}) seed={} outcome={} turns={}",
            self.config_name,
            self.persona_id,
            self.persona_label,
            self.seed,
            self.outcome,
            self.turn
        );
        for t in &self.turns {
            let _ = writeln!(out, "  {:>2}. {} ({})", t.turn, t.action_label, t.action_id);
        }
        let traits: Vec<String> = self
            .final_traits
            .iter()
            .map(|t| format!("{}={:.3}", t.id, t.value))
            .collect();
        let _ = writeln!(out, "  final: {}", traits.join(" "));
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testkit::scenario_store;

    #[test]
    fn transcript_mirrors_history() {
        let store = scenario_store();
        let mut s = EpisodeState::new(vec![0.3, 0.25, 0.2], 0, 4, 17);
        s.commit(0, vec![0.42, 0.3, 0.2]);
        s.commit(3, vec![0.42, 0.3, 0.3]);
        let t = Transcript::from_state(&store, &s);
        assert_eq!(t.action_ids(), vec!["pitch", "close"]);
        assert_eq!(t.turns[1].turn, 2);
        assert_eq!(t.persona_id, "cautious");
        assert_eq!(t.final_traits[2].value, 0.3);
        assert_eq!(t.outcome, EpisodePhase::Active);

        let text = t.render_text();
        assert!(text.contains("persona=cautious"));
        assert!(text.contains("close"));
    }
}
