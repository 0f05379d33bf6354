//! Chat controller
//!
//! Drives the active conversation: stores the user's turn, asks the responder
//! for a reply on a background task, and applies the reply once the
//! interactive task receives it.
//!
//! Replies travel back over a channel that only the owner of the controller
//! reads, so every store mutation happens on the interactive task. Turns
//! submitted before an earlier reply arrived are answered in completion
//! order, which may differ from submission order.

use std::collections::HashMap;
use std::sync::Arc;

use tokio::sync::mpsc::{self, UnboundedReceiver, UnboundedSender};

use crate::error::ChatError;
use crate::responder::{Responder, ResponderError};
use crate::storage::conversations::{ConversationStore, Recorded};
use crate::types::{ConversationId, Sender};

/// Reply state of one conversation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnState {
    Idle,
    /// At least one responder call is still running
    AwaitingReply,
}

/// Result of a responder call, delivered to the interactive task
#[derive(Debug)]
pub struct ReplyEvent {
    pub conversation_id: ConversationId,
    pub result: Result<String, ResponderError>,
}

struct ActiveSession<S> {
    conversation_id: ConversationId,
    session: Arc<S>,
}

pub struct ChatController<R: Responder> {
    store: Arc<ConversationStore>,
    responder: Arc<R>,
    active_conversation: Option<ConversationId>,
    session: Option<ActiveSession<R::Session>>,
    pending: HashMap<ConversationId, usize>,
    reply_tx: UnboundedSender<ReplyEvent>,
    reply_rx: UnboundedReceiver<ReplyEvent>,
}

impl<R: Responder> ChatController<R> {
    pub fn new(store: Arc<ConversationStore>, responder: Arc<R>) -> Self {
        let (reply_tx, reply_rx) = mpsc::unbounded_channel();
        Self {
            store,
            responder,
            active_conversation: None,
            session: None,
            pending: HashMap::new(),
            reply_tx,
            reply_rx,
        }
    }

    pub fn store(&self) -> &Arc<ConversationStore> {
        &self.store
    }

    pub fn active_conversation(&self) -> Option<&str> {
        self.active_conversation.as_deref()
    }

    /// Create an empty conversation and make it the active one.
    pub fn new_conversation(&mut self) -> Result<ConversationId, ChatError> {
        let id = self.store.create_conversation()?;
        self.select_conversation(&id)?;
        Ok(id)
    }

    /// Make `conversation_id` the active conversation.
    ///
    /// Switching to a different conversation drops the responder session; the
    /// next turn starts a fresh one.
    pub fn select_conversation(&mut self, conversation_id: &str) -> Result<(), ChatError> {
        if !self.store.contains(conversation_id) {
            return Err(ChatError::InvalidInput(format!(
                "unknown conversation: {}",
                conversation_id
            )));
        }

        if self.active_conversation.as_deref() != Some(conversation_id) {
            tracing::info!("Switched to conversation {}", conversation_id);
            self.active_conversation = Some(conversation_id.to_string());
            self.session = None;
        }
        Ok(())
    }

    /// Responder session for the active conversation, started on first use.
    pub fn start_or_resume_responder_session(&mut self) -> Result<Arc<R::Session>, ChatError> {
        let conversation_id = self
            .active_conversation
            .clone()
            .ok_or_else(|| ChatError::InvalidInput("no active conversation".into()))?;

        if let Some(active) = &self.session {
            if active.conversation_id == conversation_id {
                return Ok(Arc::clone(&active.session));
            }
        }

        tracing::debug!("Starting responder session for {}", conversation_id);
        let session = Arc::new(self.responder.start_session());
        self.session = Some(ActiveSession {
            conversation_id,
            session: Arc::clone(&session),
        });
        Ok(session)
    }

    /// Store the user's turn and ask the responder for a reply.
    ///
    /// Returns once the user message is in the store; the reply arrives later
    /// as a [`ReplyEvent`]. The conversation becomes the active one. A failed
    /// history write is reported in [`Recorded::saved`] and does not stop the
    /// responder call.
    pub fn submit_user_turn(
        &mut self,
        conversation_id: &str,
        text: &str,
    ) -> Result<Recorded, ChatError> {
        let text = text.trim();
        let recorded = self
            .store
            .record_message(conversation_id, text, Sender::User)?;

        self.select_conversation(conversation_id)?;
        let session = self.start_or_resume_responder_session()?;

        let responder = Arc::clone(&self.responder);
        let reply_tx = self.reply_tx.clone();
        let conversation_id = conversation_id.to_string();
        let text = text.to_string();
        *self.pending.entry(conversation_id.clone()).or_insert(0) += 1;

        tokio::spawn(async move {
            let result = responder.send(&session, &text).await;
            if let Err(e) = &result {
                tracing::error!("Responder call for {} failed: {}", conversation_id, e);
            }
            // The receiver lives as long as the controller
            let _ = reply_tx.send(ReplyEvent {
                conversation_id,
                result,
            });
        });

        Ok(recorded)
    }

    /// Wait for the next finished responder call.
    pub async fn next_event(&mut self) -> Option<ReplyEvent> {
        self.reply_rx.recv().await
    }

    /// Finished responder call, if one is ready.
    pub fn try_next_event(&mut self) -> Option<ReplyEvent> {
        self.reply_rx.try_recv().ok()
    }

    /// Record a finished responder call.
    ///
    /// A successful reply is appended as an assistant message. A failed call
    /// appends nothing and is returned as [`ChatError::ExternalService`]; the
    /// user has to send the turn again. As with the user's turn, a failed
    /// history write is reported in [`Recorded::saved`].
    pub fn apply_reply(&mut self, event: ReplyEvent) -> Result<Recorded, ChatError> {
        let ReplyEvent {
            conversation_id,
            result,
        } = event;

        if let Some(count) = self.pending.get_mut(&conversation_id) {
            *count -= 1;
            if *count == 0 {
                self.pending.remove(&conversation_id);
            }
        }

        let reply = result?;
        self.store
            .record_message(&conversation_id, &reply, Sender::Assistant)
    }

    pub fn state(&self, conversation_id: &str) -> TurnState {
        if self.pending.contains_key(conversation_id) {
            TurnState::AwaitingReply
        } else {
            TurnState::Idle
        }
    }

    /// Responder calls still running across all conversations
    pub fn pending_replies(&self) -> usize {
        self.pending.values().sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::conversations::load;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;
    use tokio::sync::Notify;

    /// Echoes the text back. Turns containing "fail" error out, turns
    /// containing "slow" wait until `gate` is notified.
    #[derive(Default)]
    struct EchoResponder {
        sessions_started: AtomicUsize,
        gate: Notify,
    }

    struct EchoSession {
        number: usize,
    }

    #[async_trait]
    impl Responder for EchoResponder {
        type Session = EchoSession;

        fn start_session(&self) -> EchoSession {
            let number = self.sessions_started.fetch_add(1, Ordering::SeqCst) + 1;
            EchoSession { number }
        }

        async fn send(&self, session: &EchoSession, text: &str) -> Result<String, ResponderError> {
            if text.contains("slow") {
                self.gate.notified().await;
            }
            if text.contains("fail") {
                return Err(ResponderError::Http("connection refused".into()));
            }
            Ok(format!("[{}] echo: {}", session.number, text))
        }
    }

    fn controller(dir: &tempfile::TempDir) -> ChatController<EchoResponder> {
        let store = Arc::new(ConversationStore::open(dir.path().join("history.json")));
        ChatController::new(store, Arc::new(EchoResponder::default()))
    }

    fn texts(controller: &ChatController<EchoResponder>, id: &str) -> Vec<(Sender, String)> {
        controller
            .store()
            .messages(id)
            .unwrap()
            .into_iter()
            .map(|(_, m)| (m.sender, m.text))
            .collect()
    }

    async fn apply_next(controller: &mut ChatController<EchoResponder>) -> Result<Recorded, ChatError> {
        let event = controller.next_event().await.expect("reply channel closed");
        controller.apply_reply(event)
    }

    #[tokio::test]
    async fn test_successful_turn_appends_reply() {
        let dir = tempdir().unwrap();
        let mut controller = controller(&dir);
        let id = controller.new_conversation().unwrap();

        controller.submit_user_turn(&id, "  Hello  ").unwrap();
        assert_eq!(controller.state(&id), TurnState::AwaitingReply);

        apply_next(&mut controller).await.unwrap();
        assert_eq!(controller.state(&id), TurnState::Idle);
        assert_eq!(
            texts(&controller, &id),
            vec![
                (Sender::User, "Hello".to_string()),
                (Sender::Assistant, "[1] echo: Hello".to_string()),
            ]
        );

        let on_disk = load(controller.store().path());
        assert_eq!(on_disk[&id].messages.len(), 2);
        assert_eq!(on_disk[&id].title, "Hello");
    }

    #[tokio::test]
    async fn test_failed_turn_appends_nothing() {
        let dir = tempdir().unwrap();
        let mut controller = controller(&dir);
        let id = controller.new_conversation().unwrap();

        controller.submit_user_turn(&id, "please fail").unwrap();
        let err = apply_next(&mut controller).await.unwrap_err();

        assert!(matches!(err, ChatError::ExternalService(_)));
        assert_eq!(controller.state(&id), TurnState::Idle);
        assert_eq!(texts(&controller, &id).len(), 1);
    }

    #[tokio::test]
    async fn test_blank_turn_is_rejected_before_responder() {
        let dir = tempdir().unwrap();
        let mut controller = controller(&dir);
        let id = controller.new_conversation().unwrap();

        let err = controller.submit_user_turn(&id, " \n\t ").unwrap_err();
        assert!(matches!(err, ChatError::InvalidInput(_)));
        assert_eq!(controller.pending_replies(), 0);
        assert!(controller.try_next_event().is_none());
        assert!(texts(&controller, &id).is_empty());
    }

    #[tokio::test]
    async fn test_unknown_conversation_is_rejected() {
        let dir = tempdir().unwrap();
        let mut controller = controller(&dir);

        assert!(matches!(
            controller.select_conversation("nonexistent-id"),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            controller.submit_user_turn("nonexistent-id", "hi"),
            Err(ChatError::InvalidInput(_))
        ));
        assert!(matches!(
            controller.start_or_resume_responder_session(),
            Err(ChatError::InvalidInput(_))
        ));
    }

    #[tokio::test]
    async fn test_session_follows_active_conversation() {
        let dir = tempdir().unwrap();
        let mut controller = controller(&dir);

        let first = controller.new_conversation().unwrap();
        controller.submit_user_turn(&first, "one").unwrap();
        apply_next(&mut controller).await.unwrap();
        controller.submit_user_turn(&first, "two").unwrap();
        apply_next(&mut controller).await.unwrap();
        assert_eq!(controller.responder.sessions_started.load(Ordering::SeqCst), 1);

        let second = controller.new_conversation().unwrap();
        controller.submit_user_turn(&second, "three").unwrap();
        apply_next(&mut controller).await.unwrap();
        assert_eq!(controller.responder.sessions_started.load(Ordering::SeqCst), 2);

        // Coming back does not resume the old session
        controller.select_conversation(&first).unwrap();
        controller.submit_user_turn(&first, "four").unwrap();
        apply_next(&mut controller).await.unwrap();
        assert_eq!(controller.responder.sessions_started.load(Ordering::SeqCst), 3);

        let replies: Vec<_> = texts(&controller, &first)
            .into_iter()
            .filter(|(sender, _)| *sender == Sender::Assistant)
            .map(|(_, text)| text)
            .collect();
        assert_eq!(replies, vec!["[1] echo: one", "[1] echo: two", "[3] echo: four"]);
    }

    #[tokio::test]
    async fn test_failed_save_still_requests_reply() {
        let dir = tempdir().unwrap();
        let mut controller = controller(&dir);
        let id = controller.new_conversation().unwrap();

        // A directory in place of the history file makes every write fail
        let path = controller.store().path().to_path_buf();
        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir_all(path.join("occupied")).unwrap();

        let submitted = controller.submit_user_turn(&id, "hello").unwrap();
        assert!(submitted.saved.is_err());
        assert_eq!(controller.pending_replies(), 1);
        assert_eq!(controller.state(&id), TurnState::AwaitingReply);

        let applied = apply_next(&mut controller).await.unwrap();
        assert!(applied.saved.is_err());
        assert_eq!(controller.state(&id), TurnState::Idle);

        let messages = controller.store().messages(&id).unwrap();
        assert_eq!(messages.len(), 2);
        assert_eq!(messages[0].0, submitted.message_id);
        assert_eq!(messages[1].0, applied.message_id);
        assert_eq!(messages[1].1.text, "[1] echo: hello");

        // The next successful write brings the file up to date
        std::fs::remove_dir_all(&path).unwrap();
        controller.store().persist().unwrap();
        assert_eq!(load(&path)[&id].messages.len(), 2);
    }

    #[tokio::test]
    async fn test_overlapping_turns_apply_in_completion_order() {
        let dir = tempdir().unwrap();
        let mut controller = controller(&dir);
        let id = controller.new_conversation().unwrap();

        controller.submit_user_turn(&id, "slow question").unwrap();
        controller.submit_user_turn(&id, "quick question").unwrap();
        assert_eq!(controller.pending_replies(), 2);

        apply_next(&mut controller).await.unwrap();
        assert_eq!(controller.state(&id), TurnState::AwaitingReply);

        controller.responder.gate.notify_one();
        apply_next(&mut controller).await.unwrap();
        assert_eq!(controller.state(&id), TurnState::Idle);

        let order: Vec<_> = texts(&controller, &id).into_iter().map(|(_, t)| t).collect();
        assert_eq!(
            order,
            vec![
                "slow question",
                "quick question",
                "[1] echo: quick question",
                "[1] echo: slow question",
            ]
        );
        assert_eq!(load(controller.store().path())[&id].messages.len(), 4);
    }
}
