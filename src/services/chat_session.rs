// src/services/chat_session.rs
use std::{fmt::Debug, sync::Arc};

use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

use crate::{
    message::Message,
    services::{
        metrics_manager::{MetricEvent, MetricsManager},
        model_client::RemoteModelClient,
        topic::{ChatPolicy, matched_keywords},
    },
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IgnoreReason {
    Empty,
    Busy,
}

/// What a call to [`ChatSession::send`] did to the conversation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SendOutcome {
    /// Nothing was appended.
    Ignored(IgnoreReason),
    /// Off-topic input answered locally, no remote call.
    Redirected(Message),
    Replied(Message),
    /// The remote call failed and the fallback message was appended.
    Failed(Message),
    /// The request was cancelled before it settled; only the user message remains.
    Cancelled,
}

impl SendOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            SendOutcome::Ignored(IgnoreReason::Empty) => "empty",
            SendOutcome::Ignored(IgnoreReason::Busy) => "busy",
            SendOutcome::Redirected(_) => "redirected",
            SendOutcome::Replied(_) => "replied",
            SendOutcome::Failed(_) => "failed",
            SendOutcome::Cancelled => "cancelled",
        }
    }

    pub fn reply(&self) -> Option<&Message> {
        match self {
            SendOutcome::Redirected(m) | SendOutcome::Replied(m) | SendOutcome::Failed(m) => Some(m),
            _ => None,
        }
    }
}

struct InFlight {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct ConversationState {
    history: Vec<Message>,
    in_flight: Option<InFlight>,
    next_id: u64,
}

enum Step {
    Redirect(Message),
    Forward {
        prior: Vec<Message>,
        id: u64,
        token: CancellationToken,
    },
}

/// A single conversation with at most one request in flight.
#[derive(Clone)]
pub struct ChatSession {
    state: Arc<Mutex<ConversationState>>,
    model: Arc<RemoteModelClient>,
    policy: ChatPolicy,
    metrics: MetricsManager,
}

impl Debug for ChatSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChatSession")
            .field("policy", &self.policy)
            .finish()
    }
}

impl ChatSession {
    pub fn new(model: Arc<RemoteModelClient>, policy: ChatPolicy, metrics: MetricsManager) -> Self {
        Self {
            state: Arc::new(Mutex::new(ConversationState::default())),
            model,
            policy,
            metrics,
        }
    }

    pub fn welcome(&self) -> Message {
        self.policy.welcome()
    }

    pub async fn history(&self) -> Vec<Message> {
        self.state.lock().await.history.clone()
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.history.len()
    }

    pub async fn is_pending(&self) -> bool {
        self.state.lock().await.in_flight.is_some()
    }

    /// Appends `text` and the answer to it. Empty input, or input arriving
    /// while another request is pending, leaves the history untouched.
    pub async fn send(&self, text: &str) -> SendOutcome {
        let text = text.trim();
        if text.is_empty() {
            return SendOutcome::Ignored(IgnoreReason::Empty);
        }

        let step = {
            let mut state = self.state.lock().await;
            if state.in_flight.is_some() {
                debug!("chat request already pending, ignoring input");
                return SendOutcome::Ignored(IgnoreReason::Busy);
            }
            let prior = state.history.clone();
            state.history.push(Message::user(text));

            if self.policy.accepts(text) {
                state.next_id += 1;
                let id = state.next_id;
                let token = CancellationToken::new();
                state.in_flight = Some(InFlight { id, token: token.clone() });
                Step::Forward { prior, id, token }
            } else {
                let reply = self.policy.redirect();
                state.history.push(reply.clone());
                Step::Redirect(reply)
            }
        };

        let (prior, id, token) = match step {
            Step::Redirect(reply) => {
                self.metrics.record(MetricEvent::ChatRequest).await;
                self.metrics.record(MetricEvent::OffTopicRedirect).await;
                return SendOutcome::Redirected(reply);
            }
            Step::Forward { prior, id, token } => (prior, id, token),
        };

        // `in_flight` is set: spawn before any await so a dropped caller
        // cannot leave the session pending.
        let session = self.clone();
        let prompt = text.to_string();
        let task = tokio::spawn(async move { session.complete(id, token, prompt, prior).await });

        match task.await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(error = %e, "chat task aborted");
                self.release(id).await;
                SendOutcome::Cancelled
            }
        }
    }

    /// Cancels the pending request, if any. The session accepts input again
    /// right away.
    pub async fn cancel(&self) -> bool {
        let mut state = self.state.lock().await;
        match state.in_flight.take() {
            Some(in_flight) => {
                in_flight.token.cancel();
                true
            }
            None => false,
        }
    }

    async fn complete(
        self,
        id: u64,
        token: CancellationToken,
        prompt: String,
        prior: Vec<Message>,
    ) -> SendOutcome {
        self.metrics.record(MetricEvent::ChatRequest).await;
        self.metrics.increment_keywords(&matched_keywords(&prompt)).await;

        let result = tokio::select! {
            _ = token.cancelled() => None,
            result = self.model.chat(&prompt, &prior) => Some(result),
        };

        let mut state = self.state.lock().await;
        if !state.in_flight.as_ref().is_some_and(|f| f.id == id) {
            debug!(id, "discarding outcome of cancelled chat request");
            return SendOutcome::Cancelled;
        }
        state.in_flight = None;

        match result {
            None => SendOutcome::Cancelled,
            Some(Ok(text)) => {
                let reply = self.policy.reply(text);
                state.history.push(reply.clone());
                drop(state);
                self.metrics.record(MetricEvent::ChatReply).await;
                SendOutcome::Replied(reply)
            }
            Some(Err(e)) => {
                warn!(error = %e, "chat request failed");
                let reply = self.policy.fallback();
                state.history.push(reply.clone());
                drop(state);
                self.metrics.record(MetricEvent::ChatFailure).await;
                SendOutcome::Failed(reply)
            }
        }
    }

    async fn release(&self, id: u64) {
        let mut state = self.state.lock().await;
        if state.in_flight.as_ref().is_some_and(|f| f.id == id) {
            state.in_flight = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::model_client::ModelSettings;
    use std::time::Duration;

    #[tokio::test]
    async fn dropped_caller_does_not_leave_session_pending() {
        let metrics = MetricsManager::new();
        let model = Arc::new(RemoteModelClient::new(ModelSettings::default()));
        let chat = ChatSession::new(model, ChatPolicy::radiology(), metrics.clone());

        // Another request holds the metrics lock while this caller gives up.
        let guard = metrics.hold_write().await;
        let dropped = tokio::time::timeout(Duration::from_millis(50), chat.send("Is an MRI safe?")).await;
        assert!(dropped.is_err());
        drop(guard);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(!chat.is_pending().await);
        assert_eq!(chat.len().await, 2);
        assert!(!matches!(
            chat.send("And a CT?").await,
            SendOutcome::Ignored(IgnoreReason::Busy)
        ));
    }
}
