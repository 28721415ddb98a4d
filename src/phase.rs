use serde::{Deserialize, Serialize};

/// One stage of the guided session, in participant order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Phase {
    Login,
    Instruction,
    Brainstorming,
    Submission,
}

impl Phase {
    /// Every phase in participant order. The admin jump selector lists them
    /// in this order.
    pub const ALL: [Phase; 4] = [
        Phase::Login,
        Phase::Instruction,
        Phase::Brainstorming,
        Phase::Submission,
    ];

    /// Human-facing label, also used as the admin selector value.
    pub fn label(&self) -> &'static str {
        match self {
            Phase::Login => "Login",
            Phase::Instruction => "Phase 0: Instruction",
            Phase::Brainstorming => "Phase 1: Brainstorming",
            Phase::Submission => "Submission",
        }
    }

    /// Parse a label. Anything unrecognised falls back to the first phase
    /// rather than failing.
    pub fn from_label_or_default(s: &str) -> Phase {
        let s = s.trim();
        Phase::ALL
            .iter()
            .copied()
            .find(|p| p.label() == s || p.slug() == s)
            .unwrap_or(Phase::Login)
    }

    /// Short form-safe identifier.
    pub fn slug(&self) -> &'static str {
        match self {
            Phase::Login => "login",
            Phase::Instruction => "instruction",
            Phase::Brainstorming => "brainstorming",
            Phase::Submission => "submission",
        }
    }

    /// The phase a normal participant action leads to, `None` at the end.
    pub fn next(&self) -> Option<Phase> {
        match self {
            Phase::Login => Some(Phase::Instruction),
            Phase::Instruction => Some(Phase::Brainstorming),
            Phase::Brainstorming => Some(Phase::Submission),
            Phase::Submission => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.next().is_none()
    }
}

impl Default for Phase {
    fn default() -> Self {
        Phase::Login
    }
}

impl std::fmt::Display for Phase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}
