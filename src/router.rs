//! Phase router: one handler per participant action, each returning a view
//! descriptor for the renderer.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::admin::{AdminAccess, AdminStatus};
use crate::assets::{AssetDir, GuideImage};
use crate::chat::ChatOrchestrator;
use crate::conditions::ConditionRegistry;
use crate::config::StudyConfig;
use crate::error::{ChatError, TransitionError};
use crate::phase::Phase;
use crate::session::{ParticipantSession, Turn};

/// A participant action.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    SubmitLogin { participant_id: String },
    ConfirmInstructions,
    SendMessage { text: String },
    Finish,
}

/// What to show for the current phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum View {
    Login,
    Instruction {
        guide_images: Vec<GuideImage>,
        remaining_seconds: u64,
    },
    Brainstorming {
        transcript: Vec<Turn>,
        remaining_seconds: u64,
    },
    Submission {
        participant_id: String,
        redirect_url: String,
    },
}

impl View {
    pub fn phase(&self) -> Phase {
        match self {
            View::Login => Phase::Login,
            View::Instruction { .. } => Phase::Instruction,
            View::Brainstorming { .. } => Phase::Brainstorming,
            View::Submission { .. } => Phase::Submission,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Error,
}

/// Inline message shown above the view for one render.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub text: String,
}

impl Notice {
    pub fn info(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Info, text: text.into() }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self { level: NoticeLevel::Error, text: text.into() }
    }
}

/// A rendered-to-be page: the view plus an optional notice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Page {
    pub view: View,
    pub notice: Option<Notice>,
}

/// Everything the admin panel shows once unlocked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminView {
    pub status: Option<AdminStatus>,
    pub phase: Phase,
    pub remaining_seconds: Option<u64>,
}

#[derive(Clone)]
pub struct PhaseRouter {
    config: Arc<StudyConfig>,
    registry: Arc<ConditionRegistry>,
    assets: AssetDir,
    chat: ChatOrchestrator,
}

impl PhaseRouter {
    pub fn new(config: Arc<StudyConfig>, registry: Arc<ConditionRegistry>, chat: ChatOrchestrator) -> Self {
        let assets = AssetDir::new(config.assets_dir.clone());
        Self { config, registry, assets, chat }
    }

    pub fn config(&self) -> &StudyConfig {
        &self.config
    }

    pub fn registry(&self) -> &ConditionRegistry {
        &self.registry
    }

    pub fn assets(&self) -> &AssetDir {
        &self.assets
    }

    // -- handlers -----------------------------------------------------------

    /// URL auto-login; a no-op after the first call for a session.
    pub fn bootstrap(&self, session: &mut ParticipantSession, participant_id: Option<&str>) -> Option<Notice> {
        match session.bootstrap(participant_id, &self.registry, &mut rand::thread_rng()) {
            Ok(_) => None,
            Err(e) => Some(Notice::error(e.to_string())),
        }
    }

    pub fn submit_login(&self, session: &mut ParticipantSession, participant_id: &str) -> Result<(), TransitionError> {
        session.login(participant_id, &self.registry, &mut rand::thread_rng())?;
        Ok(())
    }

    pub fn confirm_instructions(&self, session: &mut ParticipantSession) -> Result<(), TransitionError> {
        session.confirm_instructions()
    }

    /// Only available while brainstorming.
    pub async fn send_message(&self, session: &mut ParticipantSession, text: &str) -> Result<String, ChatError> {
        if session.phase() != Phase::Brainstorming {
            return Err(TransitionError::WrongPhase { action: "send message", phase: session.phase() }.into());
        }
        self.chat.send(session, text).await
    }

    pub fn finish(&self, session: &mut ParticipantSession) -> Result<(), TransitionError> {
        session.finish_brainstorming()
    }

    /// Apply an action and build the page to show next. Failures become an
    /// error notice; the session is left as the failed step left it.
    pub async fn handle(&self, session: &mut ParticipantSession, action: Action) -> Page {
        debug!(phase = %session.phase(), ?action, "handling action");
        let result: Result<(), String> = match action {
            Action::SubmitLogin { participant_id } => {
                self.submit_login(session, &participant_id).map_err(|e| e.to_string())
            }
            Action::ConfirmInstructions => self.confirm_instructions(session).map_err(|e| e.to_string()),
            Action::SendMessage { text } => self
                .send_message(session, &text)
                .await
                .map(|_| ())
                .map_err(|e| match e {
                    ChatError::Provider(p) => format!("Error: {p}"),
                    ChatError::Rejected(r) => r.to_string(),
                }),
            Action::Finish => self.finish(session).map_err(|e| e.to_string()),
        };
        let notice = result.err().map(|text| {
            warn!(phase = %session.phase(), %text, "action failed");
            Notice::error(text)
        });
        Page { view: self.view(session), notice }
    }

    // -- views --------------------------------------------------------------

    /// Build the view for the current phase. Reading the timer starts it.
    pub fn view(&self, session: &mut ParticipantSession) -> View {
        let duration = self.config.duration_for(session.phase());
        match session.phase() {
            Phase::Login => View::Login,
            Phase::Instruction => {
                let images = session
                    .assigned_group()
                    .and_then(|g| self.registry.get(g))
                    .map(|c| self.assets.resolve_all(&c.guide_images))
                    .unwrap_or_default();
                View::Instruction {
                    guide_images: images,
                    remaining_seconds: session.remaining_seconds(duration).unwrap_or(0),
                }
            }
            Phase::Brainstorming => View::Brainstorming {
                remaining_seconds: session.remaining_seconds(duration).unwrap_or(0),
                transcript: session.transcript().to_vec(),
            },
            Phase::Submission => {
                let pid = session.participant_id().unwrap_or_default();
                let group = session.assigned_group().unwrap_or_default();
                View::Submission {
                    participant_id: pid.to_string(),
                    redirect_url: self.config.redirect_url(pid, group),
                }
            }
        }
    }

    pub fn page(&self, session: &mut ParticipantSession, notice: Option<Notice>) -> Page {
        Page { view: self.view(session), notice }
    }

    pub fn admin_view(&self, access: &AdminAccess, session: &mut ParticipantSession) -> AdminView {
        let duration = self.config.duration_for(session.phase());
        AdminView {
            status: access.status(session, &self.registry),
            phase: session.phase(),
            remaining_seconds: session.remaining_seconds(duration),
        }
    }
}
