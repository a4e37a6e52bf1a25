// src/widget/mod.rs
//! Client side of the conversation: the chat widget's session state and the
//! controller that moves it between `Idle` and `Sending`.

pub mod render;
pub mod transport;

use crate::message::{ApiResponse, ChatAnswer, ChatRequest, Turn};
pub use transport::{ConversationTransport, HttpTransport, TransportError};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Ai,
    System,
}

/// A transcript entry. `html` is what a view inserts as markup; it is always
/// sanitized.
#[derive(Debug, Clone, PartialEq)]
pub struct Message {
    pub content: String,
    pub role: Role,
    pub html: String,
}

impl Message {
    fn plain(role: Role, content: impl Into<String>) -> Self {
        let content = content.into();
        let html = render::escape_text(&content);
        Self { content, role, html }
    }

    fn rich(content: impl Into<String>) -> Self {
        let content = content.into();
        let html = render::markdown_to_html(&content);
        Self { content, role: Role::Ai, html }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WidgetState {
    Idle,
    Sending,
}

/// System notes shown when a turn fails.
#[derive(Debug, Clone)]
pub struct Notices {
    pub application_error: String,
    pub communication_error: String,
}

impl Default for Notices {
    fn default() -> Self {
        Self {
            application_error: "Sorry, an error occurred while generating the answer. Please try again."
                .to_string(),
            communication_error: "Could not reach the server. Please check your connection and try again."
                .to_string(),
        }
    }
}

/// Everything the widget knows for one page session. Nothing is persisted.
#[derive(Debug, Clone)]
pub struct ChatSession {
    history: Vec<Turn>,
    transcript: Vec<Message>,
    input: String,
    state: WidgetState,
    typing: bool,
    notices: Notices,
}

impl Default for ChatSession {
    fn default() -> Self {
        Self::with_notices(Notices::default())
    }
}

impl ChatSession {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_notices(notices: Notices) -> Self {
        Self {
            history: Vec::new(),
            transcript: Vec::new(),
            input: String::new(),
            state: WidgetState::Idle,
            typing: false,
            notices,
        }
    }

    pub fn history(&self) -> &[Turn] {
        &self.history
    }

    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    pub fn state(&self) -> WidgetState {
        self.state
    }

    pub fn input(&self) -> &str {
        &self.input
    }

    pub fn set_input(&mut self, text: impl Into<String>) {
        self.input = text.into();
    }

    /// Input field and send control are enabled only while idle.
    pub fn input_enabled(&self) -> bool {
        self.state == WidgetState::Idle
    }

    pub fn typing_indicator(&self) -> bool {
        self.typing
    }
}

/// Proof that a request was started; consumed by [`ChatController::complete`].
#[derive(Debug)]
pub struct PendingTurn {
    query: String,
    request: ChatRequest,
}

impl PendingTurn {
    pub fn query(&self) -> &str {
        &self.query
    }

    pub fn request(&self) -> &ChatRequest {
        &self.request
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    Application,
    Transport,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SubmitOutcome {
    /// Empty message or a request already in flight; nothing happened.
    Ignored,
    Answered,
    Failed(FailureKind),
}

pub struct ChatController<T> {
    session: ChatSession,
    transport: T,
}

impl<T: ConversationTransport> ChatController<T> {
    pub fn new(transport: T) -> Self {
        Self::with_session(ChatSession::new(), transport)
    }

    pub fn with_session(session: ChatSession, transport: T) -> Self {
        Self { session, transport }
    }

    pub fn session(&self) -> &ChatSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut ChatSession {
        &mut self.session
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `Idle -> Sending`. Returns `None` (and changes nothing) for blank
    /// messages or while another request is outstanding.
    pub fn begin_submit(&mut self, message: &str) -> Option<PendingTurn> {
        let query = message.trim();
        if query.is_empty() || self.session.state == WidgetState::Sending {
            return None;
        }

        let request = ChatRequest {
            query: query.to_string(),
            history: Some(self.session.history.clone()),
        };
        self.session.transcript.push(Message::plain(Role::User, query));
        self.session.input.clear();
        self.session.state = WidgetState::Sending;
        self.session.typing = true;

        Some(PendingTurn { query: query.to_string(), request })
    }

    /// `Sending -> Idle`. History grows only on a successful answer.
    pub fn complete(
        &mut self,
        pending: PendingTurn,
        outcome: Result<ApiResponse<ChatAnswer>, TransportError>,
    ) -> SubmitOutcome {
        self.session.typing = false;
        self.session.state = WidgetState::Idle;

        match outcome {
            Ok(ApiResponse { success: true, data: Some(data), .. }) => {
                self.session.transcript.push(Message::rich(data.answer.clone()));
                self.session.history.push(Turn::new(pending.query, data.answer));
                SubmitOutcome::Answered
            }
            Ok(response) => {
                if let Some(error) = &response.error {
                    tracing::warn!(kind = %error.kind, message = %error.message, "conversation request failed");
                }
                let note = self.session.notices.application_error.clone();
                self.session.transcript.push(Message::plain(Role::System, note));
                SubmitOutcome::Failed(FailureKind::Application)
            }
            Err(err) => {
                tracing::warn!(error = %err, "conversation request could not be delivered");
                let note = self.session.notices.communication_error.clone();
                self.session.transcript.push(Message::plain(Role::System, note));
                SubmitOutcome::Failed(FailureKind::Transport)
            }
        }
    }

    /// Run one full turn: start it, make the single network call, finish it.
    pub async fn submit(&mut self, message: &str) -> SubmitOutcome {
        let Some(pending) = self.begin_submit(message) else {
            return SubmitOutcome::Ignored;
        };
        let outcome = self.transport.send(pending.request()).await;
        self.complete(pending, outcome)
    }

    /// Submit whatever is currently in the input field.
    pub async fn submit_input(&mut self) -> SubmitOutcome {
        let message = self.session.input.clone();
        self.submit(&message).await
    }
}
