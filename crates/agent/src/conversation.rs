//! Bounded, ordered log of dialogue turns for one session.

use mindthread_core::message::ConversationMessage;

/// FIFO conversation log. Appending past the cap drops the oldest turns,
/// so `len() <= max_history()` always holds.
#[derive(Debug, Clone)]
pub struct ConversationManager {
    messages: Vec<ConversationMessage>,
    max_history: usize,
}

impl ConversationManager {
    /// A cap of zero is raised to one; an empty log could not hold the
    /// turn being processed.
    pub fn new(max_history: usize) -> Self {
        Self {
            messages: Vec::new(),
            max_history: max_history.max(1),
        }
    }

    pub fn add_message(&mut self, message: ConversationMessage) {
        self.messages.push(message);
        if self.messages.len() > self.max_history {
            let excess = self.messages.len() - self.max_history;
            self.messages.drain(..excess);
        }
    }

    /// All retained turns, oldest first.
    pub fn history(&self) -> &[ConversationMessage] {
        &self.messages
    }

    /// The last `n` turns (fewer if the log is shorter).
    pub fn recent(&self, n: usize) -> &[ConversationMessage] {
        &self.messages[self.messages.len().saturating_sub(n)..]
    }

    pub fn clear(&mut self) {
        self.messages.clear();
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn max_history(&self) -> usize {
        self.max_history
    }
}
