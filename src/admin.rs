//! Researcher admin panel.
//!
//! Every capability is a method on [`AdminAccess`]. The only ways to get one
//! are [`AdminGate::unlock`] with the right passphrase, or redeeming an
//! unexpired [`AdminGrant`] that an earlier unlock issued to the same browser.

use subtle::ConstantTimeEq;
use tracing::{info, warn};

use crate::conditions::ConditionRegistry;
use crate::error::AdminError;
use crate::export::SessionLog;
use crate::phase::Phase;
use crate::session::ParticipantSession;

/// Shared-secret gate. No identities, no rate limiting.
#[derive(Clone)]
pub struct AdminGate {
    passphrase: String,
}

impl std::fmt::Debug for AdminGate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminGate").field("passphrase", &"<redacted>").finish()
    }
}

impl AdminGate {
    pub fn new(passphrase: impl Into<String>) -> Self {
        Self { passphrase: passphrase.into() }
    }

    pub fn unlock(&self, attempt: &str) -> Result<AdminAccess, AdminError> {
        if bool::from(attempt.as_bytes().ct_eq(self.passphrase.as_bytes())) {
            Ok(AdminAccess { _private: () })
        } else {
            warn!("admin unlock rejected");
            Err(AdminError::Locked)
        }
    }
}

/// How long an unlock stays valid for the browser that performed it.
pub const ADMIN_GRANT_TTL_MS: u64 = 30 * 60 * 1000;

/// Proof of a successful unlock.
#[derive(Debug)]
pub struct AdminAccess {
    _private: (),
}

/// Time-limited unlock kept in the browser's server-side session, so the
/// passphrase is never echoed back into page source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdminGrant {
    expires_at_ms: u64,
}

impl AdminGrant {
    pub fn expires_at_ms(&self) -> u64 {
        self.expires_at_ms
    }

    pub fn redeem(&self, now_ms: u64) -> Result<AdminAccess, AdminError> {
        if now_ms < self.expires_at_ms {
            Ok(AdminAccess { _private: () })
        } else {
            Err(AdminError::Expired)
        }
    }
}

/// What the status monitor shows for a logged-in participant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdminStatus {
    pub participant_id: String,
    pub assigned_group: String,
    pub condition_label: String,
    pub phase: Phase,
}

impl AdminAccess {
    pub fn grant(&self, now_ms: u64) -> AdminGrant {
        AdminGrant { expires_at_ms: now_ms.saturating_add(ADMIN_GRANT_TTL_MS) }
    }

    /// `None` when no participant is logged in.
    pub fn status(
        &self,
        session: &ParticipantSession,
        registry: &ConditionRegistry,
    ) -> Option<AdminStatus> {
        let participant_id = session.participant_id()?.to_string();
        let assigned_group = session.assigned_group().unwrap_or_default().to_string();
        let condition_label = registry
            .get(&assigned_group)
            .map(|c| c.label.clone())
            .unwrap_or_default();
        Some(AdminStatus {
            participant_id,
            assigned_group,
            condition_label,
            phase: session.phase(),
        })
    }

    pub fn reset_timer(&self, session: &mut ParticipantSession) {
        info!(phase = %session.phase(), "admin reset phase timer");
        session.reset_timer();
    }

    pub fn force_phase(&self, session: &mut ParticipantSession, phase: Phase) {
        session.force_phase(phase);
    }

    pub fn export(
        &self,
        session: &ParticipantSession,
        registry: &ConditionRegistry,
    ) -> Result<SessionLog, AdminError> {
        let log = SessionLog::from_session(session, registry)?;
        info!(
            participant = %log.participant_id,
            turns = log.chat_history.len(),
            "admin exported session log"
        );
        Ok(log)
    }

    pub fn clear(&self, session: &mut ParticipantSession) {
        info!(participant = session.participant_id().unwrap_or("-"), "admin cleared session");
        session.clear();
    }
}
