use crate::models::chat::{ ConversationMessage, Role };

pub const DEFAULT_HISTORY_FOR_PROMPT_LEN: usize = 5;

/// Ordered, append-only record of one session's conversation.
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ConversationMessage>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a completed turn. User and assistant messages always land together.
    pub fn push_turn(&mut self, question: &str, answer: &str) {
        self.messages.push(ConversationMessage::new(Role::User, question));
        self.messages.push(ConversationMessage::new(Role::Assistant, answer));
    }

    pub fn messages(&self) -> &[ConversationMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    /// The last `limit` messages, oldest first.
    pub fn recent(&self, limit: usize) -> &[ConversationMessage] {
        let start = self.messages.len().saturating_sub(limit);
        &self.messages[start..]
    }
}

pub fn format_history_for_prompt(header: &str, messages: &[ConversationMessage]) -> String {
    if messages.is_empty() {
        return String::new();
    }
    let mut result = format!("{}\n", header);
    for msg in messages {
        result.push_str(&format!("{}: {}\n", msg.role, msg.content));
    }
    result.push('\n');
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn turns_alternate_user_then_assistant() {
        let mut transcript = Transcript::new();
        transcript.push_turn("q1", "a1");
        transcript.push_turn("q2", "a2");

        let roles: Vec<Role> = transcript.messages().iter().map(|m| m.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User, Role::Assistant]);
        assert_eq!(transcript.len(), 4);
    }

    #[test]
    fn recent_keeps_the_tail_in_order() {
        let mut transcript = Transcript::new();
        for i in 0..4 {
            transcript.push_turn(&format!("q{}", i), &format!("a{}", i));
        }

        let recent = transcript.recent(5);
        assert_eq!(recent.len(), 5);
        assert_eq!(recent[0].content, "a1");
        assert_eq!(recent[4].content, "a3");
        assert_eq!(transcript.recent(100).len(), 8);
    }

    #[test]
    fn formats_role_prefixed_lines() {
        let mut transcript = Transcript::new();
        transcript.push_turn("Apa itu foton?", "Partikel cahaya.");

        let block = format_history_for_prompt("Riwayat Percakapan:", transcript.messages());
        assert_eq!(block, "Riwayat Percakapan:\nUser: Apa itu foton?\nAssistant: Partikel cahaya.\n\n");
    }

    #[test]
    fn empty_history_formats_to_nothing() {
        assert_eq!(format_history_for_prompt("Riwayat Percakapan:", &[]), "");
    }
}
