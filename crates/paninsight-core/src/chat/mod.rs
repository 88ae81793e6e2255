//! The floating health-assistant chat: transcript, panel state and one request at a time.

mod backend;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;
use tracing::{debug, instrument, warn};

pub use backend::{
    backend_from_settings, BackendError, ChatBackend, ChatRequest, CompletionChatBackend,
    ProxyChatBackend,
};

pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are a specialized pancreatic health assistant. Provide concise, clear, and direct answers. Keep responses brief but informative. For simple questions, give short answers (1-2 sentences). For complex topics, provide comprehensive but concise explanations (2-3 sentences maximum). Always emphasize that information is for educational purposes only and users should consult healthcare professionals for medical advice.";

pub const ASSISTANT_GREETING: &str = "Hello! I'm PanInsight's AI assistant, specialized in pancreatic health. I can help you learn about pancreatic anatomy, diseases, symptoms, and treatments. How can I assist you today?";

pub const OPEN_GREETING: &str = "Hello there!, How can I assist you today?";

pub const LOGIN_PROMPT: &str = "Please log in to your PanInsight account to access the AI health assistant. The chatbot is only available for authenticated users.";

/// Fixed bot texts used when the backend cannot answer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FallbackTexts {
    pub status_error: String,
    pub transport_error: String,
    pub empty_reply: String,
}

impl Default for FallbackTexts {
    fn default() -> Self {
        Self {
            status_error: "I'm having trouble connecting to the AI service right now. Please try again in a moment.".into(),
            transport_error: "I'm having trouble connecting right now. Please try again in a moment.".into(),
            empty_reply: "I apologize, but I couldn't process your request. Please try again.".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatConfig {
    pub system_prompt: String,
    /// Only signed-in users may send messages.
    pub auth_required: bool,
    pub greeting: String,
    pub login_prompt: String,
    pub fallbacks: FallbackTexts,
}

impl ChatConfig {
    /// The sign-in gated pancreatic health assistant.
    pub fn assistant() -> Self {
        Self {
            system_prompt: ASSISTANT_SYSTEM_PROMPT.into(),
            auth_required: true,
            greeting: ASSISTANT_GREETING.into(),
            login_prompt: LOGIN_PROMPT.into(),
            fallbacks: FallbackTexts::default(),
        }
    }

    /// An ungated widget that greets every visitor.
    pub fn open() -> Self {
        Self {
            auth_required: false,
            greeting: OPEN_GREETING.into(),
            ..Self::assistant()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: u64,
    pub text: String,
    pub is_user: bool,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Activity {
    Idle,
    Sending,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PanelState {
    Closed,
    Open(Activity),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChatError {
    #[error("a message is already being sent")]
    Busy,
    #[error("the chat panel is closed")]
    Closed,
}

/// A question that has been appended to the transcript and awaits its reply.
#[derive(Debug)]
#[must_use]
pub struct PendingRequest {
    request: ChatRequest,
}

impl PendingRequest {
    pub fn request(&self) -> &ChatRequest {
        &self.request
    }
}

/// Per-session conversation id: `session_<unix millis>_<9 lowercase alphanumerics>`.
pub fn new_session_id() -> String {
    let suffix: String = uuid::Uuid::new_v4()
        .simple()
        .to_string()
        .chars()
        .take(9)
        .collect();
    format!("session_{}_{}", Utc::now().timestamp_millis(), suffix)
}

pub struct ChatWidget {
    config: ChatConfig,
    session_id: String,
    open: bool,
    activity: Activity,
    authenticated: bool,
    transcript: Vec<ChatMessage>,
    next_id: u64,
}

impl ChatWidget {
    pub fn new(config: ChatConfig) -> Self {
        Self {
            config,
            session_id: new_session_id(),
            open: false,
            activity: Activity::Idle,
            authenticated: false,
            transcript: Vec::new(),
            next_id: 1,
        }
    }

    pub fn config(&self) -> &ChatConfig {
        &self.config
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    pub fn state(&self) -> PanelState {
        if self.open {
            PanelState::Open(self.activity)
        } else {
            PanelState::Closed
        }
    }

    /// Whether a request is in flight. Panel visibility does not affect this.
    pub fn activity(&self) -> Activity {
        self.activity
    }

    pub fn transcript(&self) -> &[ChatMessage] {
        &self.transcript
    }

    pub fn is_open(&self) -> bool {
        self.open
    }

    fn may_chat(&self) -> bool {
        !self.config.auth_required || self.authenticated
    }

    /// Apply a sign-in state change. Signing out clears the conversation.
    pub fn set_authenticated(&mut self, authenticated: bool) {
        self.authenticated = authenticated;
        if !self.may_chat() {
            self.transcript.clear();
        } else if self.is_open() {
            self.greet();
        }
    }

    pub fn open(&mut self) {
        if self.is_open() {
            return;
        }
        self.open = true;
        if self.may_chat() {
            self.greet();
        }
    }

    /// Closing hides the panel; the transcript and any pending request survive.
    pub fn close(&mut self) {
        if self.activity == Activity::Sending {
            debug!("closing while a reply is pending");
        }
        self.open = false;
    }

    pub fn toggle(&mut self) {
        if self.is_open() {
            self.close();
        } else {
            self.open();
        }
    }

    fn greet(&mut self) {
        if self.transcript.is_empty() {
            let greeting = self.config.greeting.clone();
            self.push(greeting, false);
        }
    }

    fn push(&mut self, text: String, is_user: bool) {
        let id = self.next_id;
        self.next_id += 1;
        self.transcript.push(ChatMessage {
            id,
            text,
            is_user,
            timestamp: Utc::now(),
        });
    }

    /// Append the user's message and enter `Sending`.
    ///
    /// Blank input is ignored. A signed-out user on a gated widget gets the login
    /// prompt instead and no request is produced.
    pub fn begin_submit(&mut self, input: &str) -> Result<Option<PendingRequest>, ChatError> {
        if !self.open {
            return Err(ChatError::Closed);
        }
        if self.activity == Activity::Sending {
            return Err(ChatError::Busy);
        }
        let text = input.trim();
        if text.is_empty() {
            return Ok(None);
        }
        if !self.may_chat() {
            let prompt = self.config.login_prompt.clone();
            self.push(prompt, false);
            return Ok(None);
        }
        self.push(text.to_string(), true);
        self.activity = Activity::Sending;
        Ok(Some(PendingRequest {
            request: ChatRequest {
                message: text.to_string(),
                system_prompt: self.config.system_prompt.clone(),
                session_id: self.session_id.clone(),
            },
        }))
    }

    /// Append exactly one bot message for `pending` and return to `Idle`.
    pub fn complete(
        &mut self,
        _pending: PendingRequest,
        outcome: Result<Option<String>, BackendError>,
    ) -> &ChatMessage {
        let fallbacks = &self.config.fallbacks;
        let text = match outcome {
            Ok(Some(reply)) if !reply.trim().is_empty() => reply,
            Ok(_) => fallbacks.empty_reply.clone(),
            Err(BackendError::Status(status)) => {
                warn!(status, "chat service rejected the request");
                fallbacks.status_error.clone()
            }
            Err(BackendError::Transport(err)) => {
                warn!(error = %err, "chat request failed");
                fallbacks.transport_error.clone()
            }
        };
        self.push(text, false);
        self.activity = Activity::Idle;
        &self.transcript[self.transcript.len() - 1]
    }

    /// Submit `input` and wait for the reply.
    ///
    /// Returns the bot message appended, or `None` when the input was blank.
    #[instrument(skip_all, fields(session = %self.session_id))]
    pub async fn submit(
        &mut self,
        backend: &dyn ChatBackend,
        input: &str,
    ) -> Result<Option<ChatMessage>, ChatError> {
        let before = self.transcript.len();
        let Some(pending) = self.begin_submit(input)? else {
            return Ok(self.transcript[before..].last().cloned());
        };
        let outcome = backend.complete(pending.request()).await;
        Ok(Some(self.complete(pending, outcome).clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::anyhow;
    use async_trait::async_trait;
    use futures::executor::block_on;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct StubBackend {
        reply: fn() -> Result<Option<String>, BackendError>,
        calls: AtomicUsize,
    }

    impl StubBackend {
        fn new(reply: fn() -> Result<Option<String>, BackendError>) -> Self {
            Self {
                reply,
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl ChatBackend for StubBackend {
        async fn complete(&self, _request: &ChatRequest) -> Result<Option<String>, BackendError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            (self.reply)()
        }
    }

    fn open_widget(config: ChatConfig, authenticated: bool) -> ChatWidget {
        let mut widget = ChatWidget::new(config);
        widget.set_authenticated(authenticated);
        widget.open();
        widget
    }

    #[test]
    fn signed_out_user_gets_login_prompt_without_backend_call() {
        let backend = StubBackend::new(|| Ok(Some("unused".into())));
        let mut widget = open_widget(ChatConfig::assistant(), false);
        assert!(widget.transcript().is_empty());

        let reply = block_on(widget.submit(&backend, "What is the pancreas?"))
            .unwrap()
            .unwrap();
        assert_eq!(reply.text, LOGIN_PROMPT);
        assert!(!reply.is_user);
        assert_eq!(widget.transcript().len(), 1);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn reply_is_appended_after_user_message() {
        let backend = StubBackend::new(|| Ok(Some("X".into())));
        let mut widget = open_widget(ChatConfig::assistant(), true);
        assert_eq!(widget.transcript()[0].text, ASSISTANT_GREETING);

        block_on(widget.submit(&backend, "  hello  ")).unwrap();
        let texts: Vec<_> = widget
            .transcript()
            .iter()
            .map(|m| (m.text.as_str(), m.is_user))
            .collect();
        assert_eq!(
            texts,
            vec![(ASSISTANT_GREETING, false), ("hello", true), ("X", false)]
        );
        assert_eq!(widget.state(), PanelState::Open(Activity::Idle));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn blank_input_is_ignored() {
        let backend = StubBackend::new(|| Ok(Some("X".into())));
        let mut widget = open_widget(ChatConfig::open(), false);
        let before = widget.transcript().len();
        assert_eq!(block_on(widget.submit(&backend, "   \n")).unwrap(), None);
        assert_eq!(widget.transcript().len(), before);
        assert_eq!(backend.calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn failures_map_to_fixed_fallbacks() {
        let fallbacks = FallbackTexts::default();
        let cases: [(fn() -> Result<Option<String>, BackendError>, &str); 4] = [
            (|| Err(BackendError::Status(500)), &fallbacks.status_error),
            (
                || Err(BackendError::Transport(anyhow!("connection refused"))),
                &fallbacks.transport_error,
            ),
            (|| Ok(None), &fallbacks.empty_reply),
            (|| Ok(Some("  ".into())), &fallbacks.empty_reply),
        ];
        for (reply, expected) in cases {
            let backend = StubBackend::new(reply);
            let mut widget = open_widget(ChatConfig::open(), false);
            let message = block_on(widget.submit(&backend, "hi")).unwrap().unwrap();
            assert_eq!(message.text, expected);
        }
    }

    #[test]
    fn sending_rejects_second_submit() {
        let mut widget = open_widget(ChatConfig::open(), false);
        let pending = widget.begin_submit("first").unwrap().unwrap();
        assert_eq!(widget.begin_submit("second").unwrap_err(), ChatError::Busy);
        widget.complete(pending, Ok(Some("done".into())));
        assert!(widget.begin_submit("third").unwrap().is_some());
    }

    #[test]
    fn reopening_panel_keeps_pending_request_lock() {
        let mut widget = open_widget(ChatConfig::open(), false);
        let pending = widget.begin_submit("first").unwrap().unwrap();
        widget.close();
        assert_eq!(widget.state(), PanelState::Closed);
        assert_eq!(widget.activity(), Activity::Sending);

        widget.open();
        assert_eq!(widget.state(), PanelState::Open(Activity::Sending));
        assert_eq!(widget.begin_submit("second").unwrap_err(), ChatError::Busy);

        let reply = widget.complete(pending, Ok(Some("done".into())));
        assert_eq!(reply.text, "done");
        assert_eq!(widget.activity(), Activity::Idle);
        assert!(widget.begin_submit("third").unwrap().is_some());
    }

    #[test]
    fn closed_panel_rejects_submit() {
        let mut widget = ChatWidget::new(ChatConfig::open());
        assert_eq!(widget.begin_submit("hi").unwrap_err(), ChatError::Closed);
        widget.toggle();
        assert!(widget.is_open());
        assert_eq!(widget.transcript()[0].text, OPEN_GREETING);
        widget.toggle();
        assert_eq!(widget.state(), PanelState::Closed);
    }

    #[test]
    fn sign_out_clears_transcript_and_sign_in_greets() {
        let mut widget = open_widget(ChatConfig::assistant(), true);
        assert_eq!(widget.transcript().len(), 1);
        widget.set_authenticated(false);
        assert!(widget.transcript().is_empty());
        widget.set_authenticated(true);
        assert_eq!(widget.transcript()[0].text, ASSISTANT_GREETING);
    }

    #[test]
    fn message_ids_strictly_increase() {
        let mut widget = open_widget(ChatConfig::open(), false);
        for text in ["a", "b", "c"] {
            let pending = widget.begin_submit(text).unwrap().unwrap();
            widget.complete(pending, Ok(Some("ok".into())));
        }
        let ids: Vec<u64> = widget.transcript().iter().map(|m| m.id).collect();
        assert!(ids.windows(2).all(|pair| pair[0] < pair[1]));
    }

    #[test]
    fn session_id_format() {
        let id = new_session_id();
        let parts: Vec<&str> = id.split('_').collect();
        assert_eq!(parts.len(), 3);
        assert_eq!(parts[0], "session");
        assert!(parts[1].parse::<i64>().is_ok());
        assert_eq!(parts[2].len(), 9);
        assert!(parts[2]
            .chars()
            .all(|c| c.is_ascii_digit() || c.is_ascii_lowercase()));
    }
}
