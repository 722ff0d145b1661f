use uuid::Uuid;

use crate::history::Transcript;

/// Per-client state: who is logged in and what has been said so far.
/// Dropped with the connection that owns it.
#[derive(Debug, Clone)]
pub struct Session {
    id: Uuid,
    user: Option<String>,
    transcript: Transcript,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            user: None,
            transcript: Transcript::new(),
        }
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn user(&self) -> Option<&str> {
        self.user.as_deref()
    }

    pub fn is_authenticated(&self) -> bool {
        self.user.is_some()
    }

    pub fn login(&mut self, email: impl Into<String>) {
        self.user = Some(email.into());
    }

    pub fn logout(&mut self) {
        self.user = None;
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub(crate) fn record_turn(&mut self, question: &str, answer: &str) {
        self.transcript.push_turn(question, answer);
    }
}
