use crate::chat_api::{ChatError, ChatReply, ChatTransport};
use crate::documents::{DocumentRef, DocumentStore};

pub const GREETING: &str =
    "Hello! I'm here to help answer your questions. What would you like to know?";
pub const APOLOGY: &str =
    "I'm sorry, I couldn't process your request at the moment. Please try again later.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatMessage {
    pub sender: Sender,
    pub text: Option<String>,
    pub is_document: bool,
    pub document: Option<DocumentRef>,
}

impl ChatMessage {
    pub fn user(text: impl Into<String>) -> Self {
        ChatMessage {
            sender: Sender::User,
            text: Some(text.into()),
            is_document: false,
            document: None,
        }
    }

    pub fn bot(text: impl Into<String>) -> Self {
        ChatMessage {
            sender: Sender::Bot,
            text: Some(text.into()),
            is_document: false,
            document: None,
        }
    }

    pub fn document(document: DocumentRef) -> Self {
        ChatMessage {
            sender: Sender::User,
            text: None,
            is_document: true,
            document: Some(document),
        }
    }
}

pub fn document_ack(name: &str) -> String {
    format!(
        "I've received your document \"{}\". You can click on it to preview or download it.",
        name
    )
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Welcome,
    Active,
}

/// The one conversation of this run. Messages only ever get appended, and
/// at most one chat request is outstanding.
#[derive(Debug, Default)]
pub struct Conversation {
    messages: Vec<ChatMessage>,
    phase: Phase,
    pending: bool,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn is_pending(&self) -> bool {
        self.pending
    }

    /// Leaves the welcome screen and seeds the greeting. Does nothing once
    /// the session is active.
    pub fn start_session(&mut self) {
        if self.phase == Phase::Active {
            return;
        }
        self.phase = Phase::Active;
        self.messages.push(ChatMessage::bot(GREETING));
        tracing::info!("session started");
    }

    /// First half of a send: records the user's message and marks the
    /// conversation pending. Returns the text to hand to the transport, or
    /// `None` when nothing should be sent.
    pub fn begin_send(&mut self, text: &str) -> Option<String> {
        if text.trim().is_empty() {
            return None;
        }
        if self.pending {
            tracing::warn!("send ignored, a reply is still pending");
            return None;
        }

        self.start_session();
        self.messages.push(ChatMessage::user(text));
        self.pending = true;
        Some(text.to_string())
    }

    /// Second half of a send: appends exactly one bot message for the
    /// outstanding request.
    pub fn finish_send(&mut self, result: Result<ChatReply, ChatError>) {
        if !self.pending {
            tracing::warn!("reply arrived with no pending request, dropped");
            return;
        }

        let text = match result {
            Ok(reply) => reply.answer,
            Err(e) => {
                tracing::error!(error = %e, "chat error");
                APOLOGY.to_string()
            }
        };
        self.messages.push(ChatMessage::bot(text));
        self.pending = false;
    }

    /// Sends `text` through `transport` and records both sides of the
    /// exchange. Returns whether anything was sent.
    pub async fn append_user_text<T: ChatTransport>(&mut self, text: &str, transport: &T) -> bool {
        let Some(outgoing) = self.begin_send(text) else {
            return false;
        };
        let result = transport.send_chat_message(&outgoing).await;
        self.finish_send(result);
        true
    }

    /// Records an uploaded document, caches its bytes under its file name
    /// and acknowledges it.
    pub fn append_document(&mut self, document: DocumentRef, store: &dyn DocumentStore) {
        self.start_session();

        let name = document.name().to_string();
        if !document.data().is_empty() {
            if let Err(e) = store.put(&name, document.data()) {
                tracing::warn!(name = %name, error = %e, "could not cache document");
            }
        }

        self.messages.push(ChatMessage::document(document));
        self.messages.push(ChatMessage::bot(document_ack(&name)));
    }
}
