//! Live transcript assembly.
//!
//! The endpoint streams transcriptions as small fragments for both speakers.
//! Each role keeps an explicit open turn that fragments are appended to; a
//! turn-complete signal finalizes the open turns and bumps the [`TurnCounter`].

use serde::{Deserialize, Serialize};

/// Who said it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Role::User => write!(f, "user"),
            Role::Model => write!(f, "model"),
        }
    }
}

/// One transcript entry. `text` may still change while `partial` is true.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: Role,
    pub text: String,
    pub partial: bool,
}

impl ChatMessage {
    fn open(role: Role) -> Self {
        Self { id: uuid::Uuid::new_v4().to_string(), role, text: String::new(), partial: true }
    }
}

/// Reasoning markup the model may emit ahead of its spoken text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ThoughtMarkers {
    pub prefix: String,
    pub delimiter: String,
}

impl Default for ThoughtMarkers {
    fn default() -> Self {
        Self { prefix: "<thought>".to_string(), delimiter: "</thought>".to_string() }
    }
}

impl ThoughtMarkers {
    pub fn new(prefix: impl Into<String>, delimiter: impl Into<String>) -> Self {
        Self { prefix: prefix.into(), delimiter: delimiter.into() }
    }

    /// Part of the accumulated model text that may be shown.
    ///
    /// Text opening with the prefix stays hidden up to and including the first
    /// delimiter. Text that could still grow into the prefix is hidden as well.
    pub fn visible<'a>(&self, raw: &'a str) -> &'a str {
        if self.prefix.is_empty() {
            return raw;
        }
        let text = raw.trim_start();
        if text.starts_with(&self.prefix) {
            return match text.find(&self.delimiter) {
                Some(pos) if !self.delimiter.is_empty() => {
                    text[pos + self.delimiter.len()..].trim_start()
                }
                _ => "",
            };
        }
        if !text.is_empty() && self.prefix.starts_with(text) {
            return "";
        }
        raw
    }
}

/// Completed turns reported by the endpoint.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TurnCounter(u32);

impl TurnCounter {
    pub fn get(&self) -> u32 {
        self.0
    }

    fn increment(&mut self) -> u32 {
        self.0 = self.0.saturating_add(1);
        self.0
    }

    /// Whether at least `threshold` turns have completed.
    pub fn reached(&self, threshold: u32) -> bool {
        self.0 >= threshold
    }
}

#[derive(Debug, Clone)]
struct OpenTurn {
    index: usize,
    raw: String,
}

/// Builds the ordered [`ChatMessage`] list from transcription fragments.
#[derive(Debug, Clone, Default)]
pub struct TranscriptAssembler {
    messages: Vec<ChatMessage>,
    open_user: Option<OpenTurn>,
    open_model: Option<OpenTurn>,
    markers: ThoughtMarkers,
    last_active: Option<Role>,
    turns: TurnCounter,
}

impl TranscriptAssembler {
    pub fn new(markers: ThoughtMarkers) -> Self {
        Self { markers, ..Default::default() }
    }

    pub fn push_user(&mut self, fragment: &str) -> Option<&ChatMessage> {
        self.push(Role::User, fragment)
    }

    pub fn push_model(&mut self, fragment: &str) -> Option<&ChatMessage> {
        self.push(Role::Model, fragment)
    }

    /// Append a fragment to the open turn of `role`, opening one if needed.
    ///
    /// Returns the updated message. Empty fragments are ignored.
    pub fn push(&mut self, role: Role, fragment: &str) -> Option<&ChatMessage> {
        if fragment.is_empty() {
            return None;
        }
        self.last_active = Some(role);

        let slot = match role {
            Role::User => &mut self.open_user,
            Role::Model => &mut self.open_model,
        };
        let turn = slot.get_or_insert_with(|| {
            self.messages.push(ChatMessage::open(role));
            OpenTurn { index: self.messages.len() - 1, raw: String::new() }
        });
        turn.raw.push_str(fragment);

        let text = match role {
            Role::User => turn.raw.clone(),
            Role::Model => self.markers.visible(&turn.raw).to_string(),
        };
        let message = &mut self.messages[turn.index];
        message.text = text;
        Some(&*message)
    }

    /// Finalize the open turns and count the turn.
    ///
    /// Model messages that never produced visible text are dropped.
    pub fn turn_complete(&mut self) -> u32 {
        let mut hidden = Vec::new();
        for turn in [self.open_user.take(), self.open_model.take()].into_iter().flatten() {
            let message = &mut self.messages[turn.index];
            message.partial = false;
            if message.text.is_empty() {
                hidden.push(turn.index);
            }
        }
        hidden.sort_unstable_by(|a, b| b.cmp(a));
        for index in hidden {
            self.messages.remove(index);
        }
        self.turns.increment()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn turns(&self) -> TurnCounter {
        self.turns
    }

    pub fn last_active(&self) -> Option<Role> {
        self.last_active
    }

    /// Whether `role` currently has a partial message.
    pub fn has_open_turn(&self, role: Role) -> bool {
        match role {
            Role::User => self.open_user.is_some(),
            Role::Model => self.open_model.is_some(),
        }
    }
}
