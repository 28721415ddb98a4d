//! End-to-end participant flow against the library API, with an in-test
//! completion provider that records what it was sent.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::SeedableRng;

use brainstorm_study::admin::AdminGate;
use brainstorm_study::chat::ChatOrchestrator;
use brainstorm_study::conditions::{ConditionRegistry, STRATEGIC_SYSTEM_PROMPT};
use brainstorm_study::config::StudyConfig;
use brainstorm_study::error::{ChatError, ProviderError, TransitionError};
use brainstorm_study::export::SessionLog;
use brainstorm_study::phase::Phase;
use brainstorm_study::providers::{ChatMessage, CompletionProvider};
use brainstorm_study::router::{Action, PhaseRouter, View};
use brainstorm_study::session::{ParticipantSession, Role, Turn};

const IDEA: &str = "A lonely lighthouse keeper finds a signal from space.";

#[derive(Default)]
struct Recording {
    calls: Mutex<Vec<Vec<ChatMessage>>>,
    fail: bool,
}

#[async_trait]
impl CompletionProvider for Recording {
    async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push(messages.to_vec());
        if self.fail {
            return Err(ProviderError::Status { status: 503, body: "overloaded".into() });
        }
        Ok(format!("reply {}", calls.len()))
    }
}

/// Log in repeatedly with fresh seeds until the wanted arm is drawn.
fn login_into(group: &str, registry: &ConditionRegistry) -> ParticipantSession {
    for seed in 0..1000 {
        let mut s = ParticipantSession::new();
        let drawn = s.login("P01", registry, &mut StdRng::seed_from_u64(seed)).unwrap().to_string();
        if drawn == group {
            return s;
        }
    }
    panic!("group {group} never drawn");
}

fn router(provider: Arc<Recording>, registry: Arc<ConditionRegistry>) -> PhaseRouter {
    let config = Arc::new(StudyConfig {
        survey_url: "https://survey.example.org/s".into(),
        assets_dir: "/nonexistent-assets".into(),
        ..StudyConfig::default()
    });
    let chat = ChatOrchestrator::new(provider, Arc::clone(&registry));
    PhaseRouter::new(config, registry, chat)
}

#[tokio::test]
async fn test_p01_g2_scenario() {
    let registry = Arc::new(ConditionRegistry::builtin());
    let provider = Arc::new(Recording::default());
    let r = router(Arc::clone(&provider), Arc::clone(&registry));

    let mut s = login_into("G2", &registry);
    assert_eq!(s.phase(), Phase::Instruction);
    assert!(s.transcript().is_empty());

    let page = r.handle(&mut s, Action::ConfirmInstructions).await;
    match page.view {
        View::Brainstorming { remaining_seconds, .. } => assert!((599..=600).contains(&remaining_seconds)),
        other => panic!("unexpected view {other:?}"),
    }

    let page = r.handle(&mut s, Action::SendMessage { text: IDEA.into() }).await;
    assert!(page.notice.is_none());
    {
        let calls = provider.calls.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], vec![ChatMessage::new("system", ""), ChatMessage::new("user", IDEA)]);
    }
    assert_eq!(s.transcript(), &[Turn::user(IDEA), Turn::assistant("reply 1")]);

    let page = r.handle(&mut s, Action::Finish).await;
    match page.view {
        View::Submission { redirect_url, .. } => assert!(redirect_url.contains("PID=P01&GROUP=G2")),
        other => panic!("unexpected view {other:?}"),
    }
    assert_eq!(s.transcript().len(), 2);

    let access = AdminGate::new("pw").unlock("pw").unwrap();
    let log = access.export(&s, &registry).unwrap();
    assert_eq!(log.file_name(), "log_P01_G2.json");
    let back: SessionLog = serde_json::from_str(&log.to_json().unwrap()).unwrap();
    assert_eq!(back.participant_id, "P01");
    assert_eq!(back.assigned_group, "G2");
    assert_eq!(back.condition_detail, "Instructed_Baseline");
    assert_eq!(back.chat_history.len(), 2);
    assert_eq!(back.chat_history[0].role, Role::User);
    assert_eq!(back.chat_history[1].role, Role::Assistant);
}

#[tokio::test]
async fn test_strategic_arm_sends_instruction_and_full_history() {
    let registry = Arc::new(ConditionRegistry::builtin());
    let provider = Arc::new(Recording::default());
    let chat = ChatOrchestrator::new(Arc::clone(&provider) as Arc<dyn CompletionProvider>, Arc::clone(&registry));

    let mut s = login_into("G1", &registry);
    s.confirm_instructions().unwrap();
    for n in 1..=3 {
        let reply = chat.send(&mut s, &format!("idea {n}")).await.unwrap();
        assert_eq!(reply, format!("reply {n}"));
    }

    let transcript = s.transcript();
    assert_eq!(transcript.len(), 6);
    for (i, turn) in transcript.iter().enumerate() {
        let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
        assert_eq!(turn.role, expected);
    }

    let calls = provider.calls.lock().unwrap();
    let last = calls.last().unwrap();
    assert_eq!(last[0], ChatMessage::new("system", STRATEGIC_SYSTEM_PROMPT));
    assert_eq!(last.len(), 1 + 5);
    assert_eq!(last[5], ChatMessage::new("user", "idea 3"));
}

#[tokio::test]
async fn test_failed_call_keeps_only_user_turn() {
    let registry = Arc::new(ConditionRegistry::builtin());
    let provider = Arc::new(Recording { fail: true, ..Recording::default() });
    let chat = ChatOrchestrator::new(Arc::clone(&provider) as Arc<dyn CompletionProvider>, Arc::clone(&registry));

    let mut s = login_into("G3", &registry);
    s.confirm_instructions().unwrap();
    let err = chat.send(&mut s, "first").await.unwrap_err();
    assert!(matches!(err, ChatError::Provider(ProviderError::Status { status: 503, .. })));
    assert_eq!(s.transcript(), &[Turn::user("first")]);
    assert_eq!(s.phase(), Phase::Brainstorming);

    // The dangling user turn is re-sent with the next message.
    let _ = chat.send(&mut s, "second").await;
    let calls = provider.calls.lock().unwrap();
    assert_eq!(calls[1].len(), 3);
    assert_eq!(calls[1][1], ChatMessage::new("user", "first"));
}

#[tokio::test]
async fn test_only_forward_transitions_via_normal_actions() {
    let registry = Arc::new(ConditionRegistry::builtin());
    let r = router(Arc::new(Recording::default()), Arc::clone(&registry));
    let mut s = ParticipantSession::new();

    let mut seen = vec![s.phase()];
    for action in [
        Action::Finish,
        Action::ConfirmInstructions,
        Action::SubmitLogin { participant_id: "P09".into() },
        Action::SubmitLogin { participant_id: "P10".into() },
        Action::Finish,
        Action::ConfirmInstructions,
        Action::ConfirmInstructions,
        Action::Finish,
        Action::SendMessage { text: "late".into() },
    ] {
        r.handle(&mut s, action).await;
        if seen.last() != Some(&s.phase()) {
            seen.push(s.phase());
        }
    }
    assert_eq!(seen, Phase::ALL.to_vec());
    assert_eq!(s.participant_id(), Some("P09"));
    assert!(s.transcript().is_empty());
}

#[test]
fn test_login_twice_is_rejected() {
    let registry = ConditionRegistry::builtin();
    let mut s = login_into("G4", &registry);
    let err = s.login("P02", &registry, &mut StdRng::seed_from_u64(1)).unwrap_err();
    assert_eq!(err, TransitionError::AlreadyLoggedIn("P01".into()));
    assert_eq!(s.assigned_group(), Some("G4"));
}
