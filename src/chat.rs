//! Chat orchestration for the brainstorming phase.

use std::sync::Arc;

use tracing::{info, warn};

use crate::conditions::ConditionRegistry;
use crate::error::{ChatError, TransitionError};
use crate::providers::{ChatMessage, CompletionProvider};
use crate::session::{ParticipantSession, Turn};

/// Build the outbound message list: the condition's system entry (empty
/// content for arms without an instruction) followed by the whole transcript.
pub fn build_messages(system_prompt: &str, transcript: &[Turn]) -> Vec<ChatMessage> {
    let mut messages = Vec::with_capacity(transcript.len() + 1);
    messages.push(ChatMessage::new("system", system_prompt));
    messages.extend(
        transcript
            .iter()
            .map(|t| ChatMessage::new(t.role.as_str(), t.content.clone())),
    );
    messages
}

/// Appends user turns, calls the provider and appends the reply.
#[derive(Clone)]
pub struct ChatOrchestrator {
    provider: Arc<dyn CompletionProvider>,
    registry: Arc<ConditionRegistry>,
}

impl ChatOrchestrator {
    pub fn new(provider: Arc<dyn CompletionProvider>, registry: Arc<ConditionRegistry>) -> Self {
        Self { provider, registry }
    }

    pub fn registry(&self) -> &ConditionRegistry {
        &self.registry
    }

    /// Run one exchange. On provider failure the user turn stays in the
    /// transcript without a reply and the error is returned; the next message
    /// re-sends the transcript as it stands.
    pub async fn send(
        &self,
        session: &mut ParticipantSession,
        text: &str,
    ) -> Result<String, ChatError> {
        let text = text.trim();
        if text.is_empty() {
            return Err(TransitionError::EmptyMessage.into());
        }
        let group = session.assigned_group().ok_or(TransitionError::NotLoggedIn)?;
        let condition = self
            .registry
            .get(group)
            .ok_or_else(|| TransitionError::UnknownCondition(group.to_string()))?;
        let system_prompt = condition.system_content().to_string();

        session.push_turn(Turn::user(text));
        let messages = build_messages(&system_prompt, session.transcript());

        match self.provider.complete(&messages).await {
            Ok(reply) => {
                info!(
                    participant = session.participant_id().unwrap_or("-"),
                    turns = session.transcript().len() + 1,
                    provider = self.provider.name(),
                    "assistant replied"
                );
                session.push_turn(Turn::assistant(reply.clone()));
                Ok(reply)
            }
            Err(e) => {
                warn!(
                    participant = session.participant_id().unwrap_or("-"),
                    provider = self.provider.name(),
                    error = %e,
                    "completion failed"
                );
                Err(e.into())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProviderError;
    use crate::session::Role;
    use async_trait::async_trait;
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Mutex;

    /// Replies with a numbered echo and records every request.
    struct EchoProvider {
        calls: Mutex<Vec<Vec<ChatMessage>>>,
        fail: bool,
    }

    impl EchoProvider {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self { calls: Mutex::new(Vec::new()), fail })
        }
    }

    #[async_trait]
    impl CompletionProvider for EchoProvider {
        async fn complete(&self, messages: &[ChatMessage]) -> Result<String, ProviderError> {
            let mut calls = self.calls.lock().unwrap();
            calls.push(messages.to_vec());
            if self.fail {
                return Err(ProviderError::Status { status: 429, body: "rate limited".into() });
            }
            Ok(format!("reply {}", calls.len()))
        }
    }

    fn session_in(group: &str) -> ParticipantSession {
        let registry = ConditionRegistry::builtin();
        // Seeds are cheap; find one that lands on the wanted arm.
        for seed in 0..1_000 {
            let mut s = ParticipantSession::new();
            s.login("P01", &registry, &mut StdRng::seed_from_u64(seed)).unwrap();
            if s.assigned_group() == Some(group) {
                s.confirm_instructions().unwrap();
                return s;
            }
        }
        panic!("no seed assigns {group}");
    }

    fn orchestrator(p: Arc<EchoProvider>) -> ChatOrchestrator {
        ChatOrchestrator::new(p, Arc::new(ConditionRegistry::builtin()))
    }

    #[test]
    fn test_build_messages_prepends_system() {
        let t = vec![Turn::user("a"), Turn::assistant("b")];
        let m = build_messages("sys", &t);
        assert_eq!(m.len(), 3);
        assert_eq!(m[0], ChatMessage::new("system", "sys"));
        assert_eq!(m[1], ChatMessage::new("user", "a"));
        assert_eq!(m[2], ChatMessage::new("assistant", "b"));
    }

    #[test]
    fn test_build_messages_empty_prompt_still_present() {
        let m = build_messages("", &[Turn::user("x")]);
        assert_eq!(m[0].role, "system");
        assert_eq!(m[0].content, "");
    }

    #[tokio::test]
    async fn test_send_appends_user_then_assistant() {
        let p = EchoProvider::new(false);
        let orch = orchestrator(p.clone());
        let mut s = session_in("G1");
        let reply = orch.send(&mut s, "a robot gardener").await.unwrap();
        assert_eq!(reply, "reply 1");
        assert_eq!(s.transcript(), &[Turn::user("a robot gardener"), Turn::assistant("reply 1")]);
    }

    #[tokio::test]
    async fn test_send_uses_condition_prompt() {
        let p = EchoProvider::new(false);
        let orch = orchestrator(p.clone());
        let mut s = session_in("G3");
        orch.send(&mut s, "idea").await.unwrap();
        let calls = p.calls.lock().unwrap();
        assert!(calls[0][0].content.contains("Discourse Engineering"));
    }

    #[tokio::test]
    async fn test_send_replays_full_history() {
        let p = EchoProvider::new(false);
        let orch = orchestrator(p.clone());
        let mut s = session_in("G2");
        orch.send(&mut s, "one").await.unwrap();
        orch.send(&mut s, "two").await.unwrap();
        let calls = p.calls.lock().unwrap();
        assert_eq!(calls.len(), 2);
        let roles: Vec<&str> = calls[1].iter().map(|m| m.role.as_str()).collect();
        assert_eq!(roles, vec!["system", "user", "assistant", "user"]);
        assert_eq!(calls[1][3].content, "two");
        assert_eq!(calls[1][0].content, "");
    }

    #[tokio::test]
    async fn test_failed_call_leaves_only_user_turn() {
        let p = EchoProvider::new(true);
        let orch = orchestrator(p);
        let mut s = session_in("G4");
        let err = orch.send(&mut s, "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Provider(ProviderError::Status { status: 429, .. })));
        assert_eq!(s.transcript(), &[Turn::user("hello")]);
    }

    #[tokio::test]
    async fn test_blank_message_is_rejected_without_mutation() {
        let p = EchoProvider::new(false);
        let orch = orchestrator(p.clone());
        let mut s = session_in("G1");
        let err = orch.send(&mut s, "   ").await.unwrap_err();
        assert!(matches!(err, ChatError::Rejected(TransitionError::EmptyMessage)));
        assert!(s.transcript().is_empty());
        assert!(p.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_without_group_is_rejected() {
        let p = EchoProvider::new(false);
        let orch = orchestrator(p);
        let mut s = ParticipantSession::new();
        let err = orch.send(&mut s, "hello").await.unwrap_err();
        assert!(matches!(err, ChatError::Rejected(TransitionError::NotLoggedIn)));
        assert!(s.transcript().is_empty());
    }

    proptest::proptest! {
        #[test]
        fn prop_exchanges_alternate(texts in proptest::collection::vec("[a-z]{1,12}", 0..8)) {
            let p = EchoProvider::new(false);
            let orch = orchestrator(p);
            let mut s = session_in("G1");
            tokio_test::block_on(async {
                for t in &texts {
                    orch.send(&mut s, t).await.unwrap();
                }
            });
            proptest::prop_assert_eq!(s.transcript().len(), texts.len() * 2);
            for (i, turn) in s.transcript().iter().enumerate() {
                let expected = if i % 2 == 0 { Role::User } else { Role::Assistant };
                proptest::prop_assert_eq!(turn.role, expected);
            }
            for (i, t) in texts.iter().enumerate() {
                proptest::prop_assert_eq!(&s.transcript()[2 * i].content, t);
            }
        }
    }
}
