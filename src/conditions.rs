//! Condition registry: the fixed set of experimental arms.
//!
//! Each condition bundles a label, the guideline images shown during the
//! instruction phase and an optional system prompt. The registry is built
//! once at startup and shared read-only.

use std::collections::BTreeMap;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Strategic "discourse engineering" instruction for the AI partner.
pub const STRATEGIC_SYSTEM_PROMPT: &str = r#"You are a Generative AI (GenAI) partner for a creative writing brainstorming session. Today, the user will be preparing to write a short Science-Fiction story. Before they write, you will brainstorm ideas for the story with the user for 10 minutes. Your goal is to work with the user to develop ideas for the story's characters, settings, and plotline with a clear beginning, middle, and end.

You must strictly follow the "Discourse Engineering" guidelines below to effectively and efficiently collaborate with the user.

What is Discourse Engineering?

Discourse engineering is your guide for structuring your chats so that you can tackle a big creative agenda, like building a great story, together, step by step. Instead of just answering a simple prompt, you must help the user move their ideas from a simple concept to a richer, more thoughtful narrative via discourse. You do this by working through three key stages: Construction, Co-construction, and Conflict.

How to apply Discourse Engineering (Your Instructions):

1. Construction
This initial step involves exploring and developing early ideas. You must use thoughtful questions to help the user move beyond surface-level thinking.

Action: When the user shares initial ideas, thoughts, characters, or settings, do not just accept them.
Action: Ask more questions that help you and the user elaborate on each other's information and ideas.
Action: Listen carefully to the user's suggestions and let them spark new ideas in your responses.
Action: If something is unclear in the interaction, ask clarifying questions to the user.

2. Co-construction
This phase follows the construction step; you and the user must build on each other's ideas through ongoing conversation, making the story richer.

Action: Combine the user's suggestions with your own imagination.
Action: Talk through ideas together, letting the story grow and change (aim for shared conclusions from the discussion).
Action: If there are differences of opinions, handle them by addressing them directly.
Action: Use feedback to refine ideas collaboratively.

3. Conflict
This phase helps to find the blind spot of the idea and improve creative concepts and the story.

Action: Review the story's main ideas and ensure co-construction ideas are aligned.
Action: Question the user's assumptions and engage in critical dialogue to validate the ideas and approaches. (Do not just agree with everything).
Action: Work with the user to build a common understanding of the story and the best methods for tackling the creative process.
"#;

/// Guideline pages for the instructed arms.
pub const DISCOURSE_GUIDE_IMAGES: &[&str] = &[
    "Discourse_page1.png",
    "Discourse_page2.png",
    "Discourse_page3.png",
];

/// Guideline page for the neutral arms.
pub const NEUTRAL_GUIDE_IMAGES: &[&str] = &["Discourse_absent_page1.png"];

/// One experimental arm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Condition {
    pub id: String,
    pub label: String,
    #[serde(default)]
    pub guide_images: Vec<String>,
    /// `None` means "no strategic instruction". It is still sent as an empty
    /// system message so the request shape is the same for every arm.
    #[serde(default)]
    pub system_prompt: Option<String>,
}

impl Condition {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        guide_images: &[&str],
        system_prompt: Option<&str>,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            guide_images: guide_images.iter().map(|s| s.to_string()).collect(),
            system_prompt: system_prompt.map(str::to_string),
        }
    }

    /// Content of the system entry sent with every completion request.
    pub fn system_content(&self) -> &str {
        self.system_prompt.as_deref().unwrap_or("")
    }
}

/// Immutable map from condition id to [`Condition`].
#[derive(Debug, Clone)]
pub struct ConditionRegistry {
    conditions: BTreeMap<String, Condition>,
}

impl ConditionRegistry {
    /// Build a registry, rejecting an empty list or duplicate ids.
    pub fn new(conditions: Vec<Condition>) -> Result<Self, ConfigError> {
        if conditions.is_empty() {
            return Err(ConfigError::EmptyRegistry);
        }
        let mut map = BTreeMap::new();
        for c in conditions {
            if c.id.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "conditions.id",
                    detail: "condition id must not be empty".to_string(),
                });
            }
            if map.contains_key(&c.id) {
                return Err(ConfigError::DuplicateCondition(c.id));
            }
            map.insert(c.id.clone(), c);
        }
        Ok(Self { conditions: map })
    }

    /// The four arms of the sci-fi brainstorming study.
    pub fn builtin() -> Self {
        let conditions = vec![
            Condition::new(
                "G1",
                "Instructed_Strategic",
                DISCOURSE_GUIDE_IMAGES,
                Some(STRATEGIC_SYSTEM_PROMPT),
            ),
            Condition::new("G2", "Instructed_Baseline", DISCOURSE_GUIDE_IMAGES, None),
            Condition::new(
                "G3",
                "Neutral_Strategic",
                NEUTRAL_GUIDE_IMAGES,
                Some(STRATEGIC_SYSTEM_PROMPT),
            ),
            Condition::new("G4", "Neutral_Baseline", NEUTRAL_GUIDE_IMAGES, None),
        ];
        Self {
            conditions: conditions.into_iter().map(|c| (c.id.clone(), c)).collect(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Condition> {
        self.conditions.get(id)
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.conditions.keys().map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.values()
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Draw a condition id uniformly at random. Each draw is independent;
    /// there is no blocking or stratification across participants.
    pub fn assign<R: Rng + ?Sized>(&self, rng: &mut R) -> &str {
        // `new` rejects empty registries, so the range is never empty.
        let idx = rng.gen_range(0..self.conditions.len());
        self.ids().nth(idx).unwrap_or_default()
    }
}

impl Default for ConditionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
