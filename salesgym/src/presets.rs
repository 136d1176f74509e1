// src/presets.rs
//
// Built-in configurations.
//
// - appointment: automotive appointment booking. Eight sales tactics with
//   fixed per-trait effects, six buyer archetypes, closing on
//   `book_appointment`, small Gaussian step noise.
// - prompt: prompt construction. Ten components whose effect is scaled by
//   a per-persona affinity (component effectiveness, x1.2 for components the
//   persona prefers) and by the conversation stage.

use std::collections::BTreeMap;

use crate::config::{
    ActionDef, EnvConfig, ObservationConfig, PersonaDef, RewardConfig, ScoringConfig, StageDef,
    TraitDef,
};
use crate::noise::{NoiseConfig, NoiseSpec};

/// Trait order shared by both presets.
const TRAITS: [(&str, &str, &str); 5] = [
    ("interest", "Interest", "How interested the customer is in buying"),
    ("urgency", "Urgency", "How soon the customer needs to buy"),
    ("availability", "Availability", "How flexible the customer's schedule is"),
    ("trust", "Trust", "How much the customer trusts the dealership"),
    ("commitment", "Commitment", "How ready the customer is to take the next step"),
];

/// Buyer archetypes shared by both presets: id, label, description,
/// base [interest, urgency, availability, trust, commitment].
const PERSONAS: [(&str, &str, &str, [f64; 5]); 6] = [
    (
        "cautious",
        "Cautious Buyer",
        "Takes time to decide, needs lots of information",
        [0.30, 0.20, 0.40, 0.25, 0.20],
    ),
    (
        "price_shopper",
        "Price Shopper",
        "Very focused on getting the best deal",
        [0.45, 0.35, 0.60, 0.35, 0.35],
    ),
    (
        "ready_buyer",
        "Ready Buyer",
        "Already knows what they want, ready to buy",
        [0.60, 0.50, 0.80, 0.45, 0.50],
    ),
    (
        "research_buyer",
        "Research Buyer",
        "Wants to learn everything before deciding",
        [0.30, 0.20, 0.40, 0.25, 0.20],
    ),
    (
        "impulse_buyer",
        "Impulse Buyer",
        "Makes quick decisions, easy to convince",
        [0.45, 0.35, 0.60, 0.35, 0.35],
    ),
    (
        "skeptical",
        "Skeptical Buyer",
        "Hard to convince, needs lots of proof",
        [0.60, 0.50, 0.80, 0.45, 0.50],
    ),
];

fn traits() -> Vec<TraitDef> {
    TRAITS
        .iter()
        .map(|(id, label, description)| TraitDef {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
        })
        .collect()
}

fn trait_map(values: &[f64; 5]) -> BTreeMap<String, f64> {
    TRAITS
        .iter()
        .zip(values.iter())
        .filter(|(_, v)| **v != 0.0)
        .map(|((id, _, _), v)| (id.to_string(), *v))
        .collect()
}

fn base_map(values: &[f64; 5]) -> BTreeMap<String, f64> {
    TRAITS
        .iter()
        .zip(values.iter())
        .map(|((id, _, _), v)| (id.to_string(), *v))
        .collect()
}

fn named(pairs: &[(&str, f64)]) -> BTreeMap<String, f64> {
    pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
}

// ---------------------------------------------------------------------------
// appointment
// ---------------------------------------------------------------------------

/// Sales tactics: id, label, description,
/// effects [interest, urgency, availability, trust, commitment], closing.
const TACTICS: [(&str, &str, &str, [f64; 5], bool); 8] = [
    (
        "rapport",
        "Build rapport",
        "Build relationship and trust with customer",
        [0.10, -0.02, -0.01, 0.06, 0.03],
        false,
    ),
    (
        "qualify",
        "Qualify",
        "Learn about customer needs and preferences",
        [0.07, -0.03, -0.01, 0.05, 0.02],
        false,
    ),
    (
        "show_inventory",
        "Show inventory",
        "Show available cars that match customer needs",
        [0.12, 0.00, -0.01, 0.03, 0.04],
        false,
    ),
    (
        "handle_concerns",
        "Handle concerns",
        "Address customer worries about price, reliability, etc.",
        [0.03, -0.10, 0.00, 0.02, 0.01],
        false,
    ),
    (
        "create_urgency",
        "Create urgency",
        "Create time pressure with limited offers or popular models",
        [0.04, -0.01, -0.08, 0.02, 0.05],
        false,
    ),
    (
        "social_proof",
        "Social proof",
        "Show that other customers have bought and are happy",
        [0.02, 0.00, 0.00, 0.11, 0.03],
        false,
    ),
    (
        "offer_incentives",
        "Offer incentives",
        "Offer special deals, financing, or free services",
        [0.06, -0.01, -0.01, 0.04, 0.08],
        false,
    ),
    (
        "book_appointment",
        "Book appointment",
        "Try to book an appointment with the customer",
        [0.0; 5],
        true,
    ),
];

/// Appointment-booking preset.
pub fn appointment() -> EnvConfig {
    let actions = TACTICS
        .iter()
        .map(|(id, label, description, effects, closing)| ActionDef {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
            effects: trait_map(effects),
            effectiveness: 1.0,
            closing: *closing,
        })
        .collect();

    let personas = PERSONAS
        .iter()
        .map(|(id, label, description, base)| PersonaDef {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
            base: base_map(base),
            trait_weights: BTreeMap::new(),
            action_affinity: BTreeMap::new(),
            weight: 1.0,
        })
        .collect();

    EnvConfig {
        name: "appointment".to_string(),
        version: "1".to_string(),
        max_turns: 12,
        traits: traits(),
        actions,
        personas,
        thresholds: named(&[
            ("interest", 0.5),
            ("availability", 0.4),
            ("trust", 0.5),
            ("commitment", 0.6),
        ]),
        stages: Vec::new(),
        noise: NoiseConfig {
            initial: NoiseSpec::None,
            step: NoiseSpec::Gaussian {
                std: 0.01,
                clip: None,
            },
        },
        scoring: Some(ScoringConfig {
            bias: 0.1,
            coefficients: named(&[
                ("interest", 1.5),
                ("urgency", -0.5),
                ("availability", 1.0),
                ("trust", 1.2),
                ("commitment", 1.8),
            ]),
        }),
        observation: ObservationConfig {
            history_cap: 4,
            include_last_action: true,
            include_persona: true,
        },
        reward: RewardConfig::default(),
    }
}

// ---------------------------------------------------------------------------
// prompt
// ---------------------------------------------------------------------------

/// Multiplier applied to a component's effectiveness when the persona prefers it.
const PREFERRED_BONUS: f64 = 1.2;

/// Stage ids and their exclusive turn-progress bounds.
const STAGES: [(&str, f64); 4] = [
    ("early", 0.25),
    ("middle", 0.5),
    ("late", 0.75),
    ("closing", 1.0),
];

/// Component id, label, description,
/// effects [interest, urgency, availability, trust, commitment],
/// effectiveness per persona (PERSONAS order),
/// stage multipliers (STAGES order), closing.
#[allow(clippy::type_complexity)]
const COMPONENTS: [(&str, &str, &str, [f64; 5], [f64; 6], [f64; 4], bool); 10] = [
    (
        "rapport_building",
        "Rapport building",
        "Build rapport and establish connection",
        [0.08, 0.00, 0.00, 0.12, 0.02],
        [0.9, 0.6, 0.7, 0.8, 0.5, 0.8],
        [0.9, 0.7, 0.4, 0.2],
        false,
    ),
    (
        "needs_assessment",
        "Needs assessment",
        "Assess customer needs and preferences",
        [0.10, 0.00, 0.02, 0.06, 0.00],
        [0.8, 0.7, 0.6, 0.9, 0.4, 0.7],
        [0.8, 0.9, 0.6, 0.3],
        false,
    ),
    (
        "value_proposition",
        "Value proposition",
        "Present value and benefits",
        [0.15, 0.00, 0.00, 0.00, 0.05],
        [0.7, 0.9, 0.8, 0.8, 0.6, 0.7],
        [0.5, 0.8, 0.9, 0.7],
        false,
    ),
    (
        "objection_handling",
        "Objection handling",
        "Address concerns and objections",
        [0.00, -0.05, 0.00, 0.10, 0.04],
        [0.8, 0.9, 0.5, 0.8, 0.4, 0.9],
        [0.4, 0.7, 0.8, 0.9],
        false,
    ),
    (
        "urgency_creation",
        "Urgency creation",
        "Create urgency and time pressure",
        [0.00, 0.12, -0.04, 0.00, 0.06],
        [0.4, 0.8, 0.7, 0.3, 0.9, 0.5],
        [0.3, 0.6, 0.8, 0.9],
        false,
    ),
    (
        "social_proof",
        "Social proof",
        "Provide social proof and testimonials",
        [0.04, 0.00, 0.00, 0.14, 0.00],
        [0.8, 0.6, 0.5, 0.9, 0.4, 0.8],
        [0.6, 0.8, 0.7, 0.5],
        false,
    ),
    (
        "incentive_offering",
        "Incentive offering",
        "Offer incentives and special deals",
        [0.06, 0.00, 0.00, 0.00, 0.12],
        [0.6, 0.9, 0.7, 0.5, 0.8, 0.6],
        [0.4, 0.6, 0.8, 0.9],
        false,
    ),
    (
        "appointment_booking",
        "Appointment booking",
        "Directly request appointment booking",
        [0.00, 0.00, 0.00, 0.00, 0.03],
        [0.5, 0.7, 0.9, 0.4, 0.8, 0.6],
        [0.2, 0.4, 0.8, 0.9],
        true,
    ),
    (
        "follow_up",
        "Follow-up",
        "Set up follow-up and next steps",
        [0.00, 0.00, 0.06, 0.03, 0.04],
        [0.7, 0.6, 0.5, 0.8, 0.4, 0.7],
        [0.3, 0.5, 0.7, 0.8],
        false,
    ),
    (
        "personalization",
        "Personalization",
        "Personalize the approach based on customer data",
        [0.08, 0.00, 0.00, 0.08, 0.00],
        [0.8, 0.7, 0.6, 0.9, 0.5, 0.8],
        [0.7, 0.8, 0.6, 0.4],
        false,
    ),
];

/// Components each persona prefers (PERSONAS order).
const PREFERENCES: [&[&str]; 6] = [
    &[
        "rapport_building",
        "needs_assessment",
        "social_proof",
        "personalization",
    ],
    &["value_proposition", "objection_handling", "incentive_offering"],
    &["value_proposition", "appointment_booking", "incentive_offering"],
    &[
        "needs_assessment",
        "social_proof",
        "personalization",
        "follow_up",
    ],
    &["urgency_creation", "incentive_offering", "appointment_booking"],
    &[
        "rapport_building",
        "objection_handling",
        "social_proof",
        "personalization",
    ],
];

/// Prompt-construction preset.
pub fn prompt() -> EnvConfig {
    let actions = COMPONENTS
        .iter()
        .map(|(id, label, description, effects, _, _, closing)| ActionDef {
            id: id.to_string(),
            label: label.to_string(),
            description: description.to_string(),
            effects: trait_map(effects),
            effectiveness: 1.0,
            closing: *closing,
        })
        .collect();

    let personas = PERSONAS
        .iter()
        .enumerate()
        .map(|(p, (id, label, description, base))| {
            let action_affinity = COMPONENTS
                .iter()
                .map(|(component, _, _, _, effectiveness, _, _)| {
                    let mut affinity = effectiveness[p];
                    if PREFERENCES[p].contains(component) {
                        affinity *= PREFERRED_BONUS;
                    }
                    (component.to_string(), affinity)
                })
                .collect();
            PersonaDef {
                id: id.to_string(),
                label: label.to_string(),
                description: description.to_string(),
                base: base_map(base),
                trait_weights: BTreeMap::new(),
                action_affinity,
                weight: 1.0,
            }
        })
        .collect();

    let stages = STAGES
        .iter()
        .enumerate()
        .map(|(s, (id, until))| StageDef {
            id: id.to_string(),
            until: *until,
            action_multipliers: COMPONENTS
                .iter()
                .map(|(component, _, _, _, _, multipliers, _)| {
                    (component.to_string(), multipliers[s])
                })
                .collect(),
        })
        .collect();

    EnvConfig {
        name: "prompt".to_string(),
        version: "1".to_string(),
        max_turns: 12,
        traits: traits(),
        actions,
        personas,
        thresholds: named(&[("interest", 0.5), ("trust", 0.5), ("commitment", 0.5)]),
        stages,
        noise: NoiseConfig {
            initial: NoiseSpec::Gaussian {
                std: 0.1,
                clip: None,
            },
            step: NoiseSpec::None,
        },
        scoring: None,
        observation: ObservationConfig {
            history_cap: 4,
            include_last_action: true,
            include_persona: true,
        },
        reward: RewardConfig::default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn appointment_shape() {
        let cfg = appointment();
        assert_eq!(cfg.traits.len(), 5);
        assert_eq!(cfg.actions.len(), 8);
        assert_eq!(cfg.personas.len(), 6);
        let closing: Vec<_> = cfg.actions.iter().filter(|a| a.closing).collect();
        assert_eq!(closing.len(), 1);
        assert_eq!(closing[0].id, "book_appointment");
        assert!(!cfg.thresholds.contains_key("urgency"));
    }

    #[test]
    fn prompt_preferred_components_get_bonus() {
        let cfg = prompt();
        let cautious = &cfg.personas[0];
        // rapport_building: 0.9 effectiveness, preferred by cautious buyers
        let a = cautious.action_affinity["rapport_building"];
        assert!((a - 0.9 * PREFERRED_BONUS).abs() < 1e-12);
        // value_proposition: 0.7, not preferred
        assert_eq!(cautious.action_affinity["value_proposition"], 0.7);
    }

    #[test]
    fn prompt_stages_cover_the_episode() {
        let cfg = prompt();
        assert_eq!(cfg.stages.len(), 4);
        assert_eq!(cfg.stages.last().map(|s| s.until), Some(1.0));
        assert!(cfg.stages.windows(2).all(|w| w[0].until < w[1].until));
    }
}
