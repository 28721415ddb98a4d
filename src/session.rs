//! Participant session state and the per-browser session store.
//!
//! ## Design
//! - `ParticipantSession` is the explicit context object every phase handler
//!   and the chat orchestrator receives by `&mut`. All transitions are
//!   methods on it; nothing is inferred from which fields happen to be set.
//! - `SessionStore`: Arc<Mutex<HashMap<String, StoreEntry>>> keyed by the
//!   browser cookie. Each session sits behind its own async mutex so a
//!   participant's interactions (including the provider call) are serialized.
//!   Entries are bounded by [`SessionLimits`].
//!
//! ## Lifecycle
//! 1. Browser arrives without a cookie → `create_session` inserts an empty session,
//!    first evicting idle entries and, past the cap, the least recently seen
//! 2. Login → Instruction → Brainstorming → Submission via the methods below
//! 3. Admin full reset → `clear` replaces the session with a fresh one

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::admin::AdminGrant;
use crate::conditions::ConditionRegistry;
use crate::error::TransitionError;
use crate::phase::Phase;
use crate::timer::{now_ms, PhaseTimer};

/// Author of a transcript turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of the participant/assistant conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

impl Turn {
    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }
}

/// State of one participant for the lifetime of a browser session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParticipantSession {
    participant_id: Option<String>,
    assigned_group: Option<String>,
    phase: Phase,
    transcript: Vec<Turn>,
    timer: PhaseTimer,
    bootstrap_consumed: bool,
}

impl ParticipantSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn participant_id(&self) -> Option<&str> {
        self.participant_id.as_deref()
    }

    pub fn assigned_group(&self) -> Option<&str> {
        self.assigned_group.as_deref()
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn transcript(&self) -> &[Turn] {
        &self.transcript
    }

    pub fn timer(&self) -> &PhaseTimer {
        &self.timer
    }

    pub fn timer_mut(&mut self) -> &mut PhaseTimer {
        &mut self.timer
    }

    pub fn is_logged_in(&self) -> bool {
        self.participant_id.is_some()
    }

    /// `Login → Instruction`. Records the id, draws a condition uniformly from
    /// `registry` and restarts the timer. Returns the assigned group id.
    pub fn login<R: Rng + ?Sized>(
        &mut self,
        participant_id: &str,
        registry: &ConditionRegistry,
        rng: &mut R,
    ) -> Result<&str, TransitionError> {
        if let Some(existing) = &self.participant_id {
            return Err(TransitionError::AlreadyLoggedIn(existing.clone()));
        }
        if self.phase != Phase::Login {
            return Err(TransitionError::WrongPhase { action: "login", phase: self.phase });
        }
        let participant_id = participant_id.trim();
        if participant_id.is_empty() {
            return Err(TransitionError::EmptyParticipantId);
        }
        let group = registry.assign(rng).to_string();
        info!(participant = participant_id, group = %group, "participant logged in");
        self.participant_id = Some(participant_id.to_string());
        self.assigned_group = Some(group);
        self.enter(Phase::Instruction);
        Ok(self.assigned_group.as_deref().unwrap_or_default())
    }

    /// Auto-login from a URL parameter. Runs its check at most once per
    /// session; returns `Ok(true)` when it logged the participant in.
    pub fn bootstrap<R: Rng + ?Sized>(
        &mut self,
        participant_id: Option<&str>,
        registry: &ConditionRegistry,
        rng: &mut R,
    ) -> Result<bool, TransitionError> {
        if std::mem::replace(&mut self.bootstrap_consumed, true) {
            return Ok(false);
        }
        match participant_id.map(str::trim) {
            Some(pid) if !pid.is_empty() && !self.is_logged_in() && self.phase == Phase::Login => {
                self.login(pid, registry, rng)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    pub fn bootstrap_consumed(&self) -> bool {
        self.bootstrap_consumed
    }

    /// `Instruction → Brainstorming` on "ready to start".
    pub fn confirm_instructions(&mut self) -> Result<(), TransitionError> {
        self.advance_from(Phase::Instruction, "start brainstorming")
    }

    /// `Brainstorming → Submission` on "finish". The transcript is kept.
    pub fn finish_brainstorming(&mut self) -> Result<(), TransitionError> {
        self.advance_from(Phase::Brainstorming, "finish")
    }

    fn advance_from(&mut self, expected: Phase, action: &'static str) -> Result<(), TransitionError> {
        if self.phase != expected {
            return Err(TransitionError::WrongPhase { action, phase: self.phase });
        }
        if let Some(next) = expected.next() {
            info!(
                participant = self.participant_id.as_deref().unwrap_or("-"),
                from = %expected,
                to = %next,
                "phase transition"
            );
            self.enter(next);
        }
        Ok(())
    }

    /// Admin escape hatch: set any phase without preconditions.
    pub fn force_phase(&mut self, phase: Phase) {
        info!(from = %self.phase, to = %phase, "admin phase jump");
        self.enter(phase);
    }

    /// Restart the current phase's timer only.
    pub fn reset_timer(&mut self) {
        self.timer.reset();
    }

    /// Drop every field, ready for the next participant.
    pub fn clear(&mut self) {
        *self = Self::new();
    }

    /// Seconds left in the current phase, if it has a duration. Starts the
    /// timer on first read.
    pub fn remaining_seconds(&mut self, duration_minutes: Option<u64>) -> Option<u64> {
        duration_minutes.map(|m| self.timer.remaining_seconds(m))
    }

    pub(crate) fn push_turn(&mut self, turn: Turn) {
        self.transcript.push(turn);
    }

    fn enter(&mut self, phase: Phase) {
        self.phase = phase;
        self.timer.reset();
    }
}

// ---------------------------------------------------------------------------
// Session store
// ---------------------------------------------------------------------------

/// A stored browser session.
#[derive(Debug, Default)]
pub struct BrowserSession {
    pub participant: ParticipantSession,
    /// One-shot message shown on the next render (errors and confirmations).
    pub notice: Option<String>,
    /// Set after a successful admin unlock so later admin forms need no passphrase.
    pub admin_grant: Option<AdminGrant>,
}

impl BrowserSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take_notice(&mut self) -> Option<String> {
        self.notice.take()
    }
}

pub type SharedSession = Arc<tokio::sync::Mutex<BrowserSession>>;

/// One slot in the store. `last_seen_ms` is bumped on every lookup.
#[derive(Debug, Clone)]
pub struct StoreEntry {
    session: SharedSession,
    last_seen_ms: u64,
}

/// Shared session store: cookie value → session.
pub type SessionStore = Arc<Mutex<HashMap<String, StoreEntry>>>;

/// Idle sessions live this long before a sweep drops them.
pub const DEFAULT_SESSION_IDLE_MS: u64 = 2 * 60 * 60 * 1000;
pub const DEFAULT_MAX_SESSIONS: usize = 1000;

/// Bounds applied whenever a session is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub idle_ttl_ms: u64,
    pub max_sessions: usize,
}

impl Default for SessionLimits {
    fn default() -> Self {
        Self { idle_ttl_ms: DEFAULT_SESSION_IDLE_MS, max_sessions: DEFAULT_MAX_SESSIONS }
    }
}

impl SessionLimits {
    fn is_expired(&self, entry: &StoreEntry, now: u64) -> bool {
        now.saturating_sub(entry.last_seen_ms) > self.idle_ttl_ms
    }
}

/// Create a new empty SessionStore.
pub fn new_session_store() -> SessionStore {
    Arc::new(Mutex::new(HashMap::new()))
}

/// Recover from a poisoned lock; every map operation leaves it consistent.
fn lock_store(store: &SessionStore) -> MutexGuard<'_, HashMap<String, StoreEntry>> {
    store.lock().unwrap_or_else(|poisoned| {
        warn!("session store lock poisoned; recovering");
        poisoned.into_inner()
    })
}

/// Generate a fresh opaque session id.
pub fn generate_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// Drop idle entries, then the least recently seen ones until a new entry fits.
fn evict(map: &mut HashMap<String, StoreEntry>, limits: SessionLimits, now: u64) -> usize {
    let before = map.len();
    map.retain(|_, entry| !limits.is_expired(entry, now));
    while !map.is_empty() && map.len() >= limits.max_sessions {
        let oldest = map
            .iter()
            .min_by_key(|(_, entry)| entry.last_seen_ms)
            .map(|(id, _)| id.clone());
        match oldest {
            Some(id) => {
                map.remove(&id);
            }
            None => break,
        }
    }
    let evicted = before - map.len();
    if evicted > 0 {
        debug!(evicted, remaining = map.len(), "evicted browser sessions");
    }
    evicted
}

/// Insert a new empty session, returning its id and handle.
pub fn create_session(store: &SessionStore, limits: SessionLimits) -> (String, SharedSession) {
    create_session_at(store, limits, now_ms())
}

pub fn create_session_at(
    store: &SessionStore,
    limits: SessionLimits,
    now: u64,
) -> (String, SharedSession) {
    let mut map = lock_store(store);
    insert_new(&mut map, limits, now)
}

fn insert_new(
    map: &mut HashMap<String, StoreEntry>,
    limits: SessionLimits,
    now: u64,
) -> (String, SharedSession) {
    evict(map, limits, now);
    let id = generate_session_id();
    let session = Arc::new(tokio::sync::Mutex::new(BrowserSession::new()));
    map.insert(id.clone(), StoreEntry { session: Arc::clone(&session), last_seen_ms: now });
    (id, session)
}

/// Look up a session by id and mark it as seen.
pub fn get_session(store: &SessionStore, id: &str) -> Option<SharedSession> {
    let mut map = lock_store(store);
    let entry = map.get_mut(id)?;
    entry.last_seen_ms = now_ms();
    Some(Arc::clone(&entry.session))
}

/// Resolve the cookie's session, creating one when the id is missing, unknown
/// or idle past the limit. The flag is `true` when a new session was created.
pub fn resolve_session(
    store: &SessionStore,
    limits: SessionLimits,
    id: Option<&str>,
) -> (String, SharedSession, bool) {
    resolve_session_at(store, limits, id, now_ms())
}

pub fn resolve_session_at(
    store: &SessionStore,
    limits: SessionLimits,
    id: Option<&str>,
    now: u64,
) -> (String, SharedSession, bool) {
    let mut map = lock_store(store);
    if let Some(id) = id {
        if let Some(entry) = map.get_mut(id) {
            if !limits.is_expired(entry, now) {
                entry.last_seen_ms = now;
                return (id.to_string(), Arc::clone(&entry.session), false);
            }
        }
    }
    let (id, session) = insert_new(&mut map, limits, now);
    (id, session, true)
}

pub fn session_count(store: &SessionStore) -> usize {
    lock_store(store).len()
}
