use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A finalized utterance for one role in one turn
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Utterance {
    pub role: Role,
    pub text: String,
    /// When the turn was finalized
    pub timestamp: DateTime<Utc>,
}

impl Utterance {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Per-turn fragment buffers, one per role
#[derive(Debug, Default)]
pub struct TranscriptAggregator {
    user: String,
    assistant: String,
}

impl TranscriptAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a fragment to the role's buffer, in arrival order
    pub fn append_fragment(&mut self, role: Role, text: &str) {
        self.buffer_mut(role).push_str(text);
    }

    pub fn buffer(&self, role: Role) -> &str {
        match role {
            Role::User => &self.user,
            Role::Assistant => &self.assistant,
        }
    }

    fn buffer_mut(&mut self, role: Role) -> &mut String {
        match role {
            Role::User => &mut self.user,
            Role::Assistant => &mut self.assistant,
        }
    }

    /// Discard one role's fragments
    pub fn clear(&mut self, role: Role) {
        self.buffer_mut(role).clear();
    }

    /// Finalize the turn: user utterance first, then assistant, each only if
    /// non-empty. Both buffers are cleared either way.
    pub fn flush_turn(&mut self) -> Vec<Utterance> {
        let user = std::mem::take(&mut self.user);
        let assistant = std::mem::take(&mut self.assistant);

        let mut utterances = Vec::with_capacity(2);
        if !user.is_empty() {
            utterances.push(Utterance::new(Role::User, user));
        }
        if !assistant.is_empty() {
            utterances.push(Utterance::new(Role::Assistant, assistant));
        }
        utterances
    }

    pub fn reset(&mut self) {
        self.user.clear();
        self.assistant.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.user.is_empty() && self.assistant.is_empty()
    }
}

/// Rolling conversation history, oldest first, evicting FIFO past its limit
#[derive(Debug)]
pub struct ConversationHistory {
    entries: VecDeque<Utterance>,
    limit: usize,
}

impl ConversationHistory {
    pub fn new(limit: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(limit),
            limit,
        }
    }

    pub fn push(&mut self, utterance: Utterance) {
        self.entries.push_back(utterance);
        while self.entries.len() > self.limit {
            self.entries.pop_front();
        }
    }

    pub fn extend(&mut self, utterances: impl IntoIterator<Item = Utterance>) {
        for utterance in utterances {
            self.push(utterance);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = &Utterance> {
        self.entries.iter()
    }

    pub fn to_vec(&self) -> Vec<Utterance> {
        self.entries.iter().cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
