//! Session-scoped conversation history
//!
//! This module holds the turn history of one chat session. It is shared between
//! the controller (the only writer) and whatever front end renders it.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// One message in a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub role: Role,
    pub content: String,
}

/// The role of a message sender
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl Turn {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(Uuid);

impl SessionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Copy of the history taken at a point in time, tagged with the epoch it was
/// taken in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub turns: Vec<Turn>,
    pub epoch: u64,
}

/// Ordered turn history of one session.
///
/// Turns are only ever appended; the only way to remove them is [`reset`],
/// which clears everything and bumps the epoch so results computed against
/// the old history can be recognised as stale.
///
/// [`reset`]: SessionState::reset
#[derive(Debug, Clone, Default)]
pub struct SessionState {
    id: SessionId,
    turns: Vec<Turn>,
    epoch: u64,
}

impl SessionState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id(&self) -> SessionId {
        self.id
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn turn_count(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    /// Number of answered user turns.
    pub fn exchange_count(&self) -> usize {
        self.turns
            .iter()
            .filter(|turn| turn.role == Role::Assistant)
            .count()
    }

    pub fn last(&self) -> Option<&Turn> {
        self.turns.last()
    }

    pub(crate) fn append(&mut self, turn: Turn) {
        debug_assert!(turn.role != Role::System, "system turns are never stored");
        self.turns.push(turn);
    }

    pub(crate) fn reset(&mut self) {
        self.turns.clear();
        self.epoch += 1;
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            turns: self.turns.clone(),
            epoch: self.epoch,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_preserves_order() {
        let mut session = SessionState::new();
        session.append(Turn::user("hello"));
        session.append(Turn::assistant("hi there"));
        session.append(Turn::user("how are you?"));

        let roles: Vec<Role> = session.turns().iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::User, Role::Assistant, Role::User]);
        assert_eq!(session.turn_count(), 3);
        assert_eq!(session.exchange_count(), 1);
        assert_eq!(session.last().map(|t| t.content.as_str()), Some("how are you?"));
    }

    #[test]
    fn test_reset_clears_and_bumps_epoch() {
        let mut session = SessionState::new();
        for i in 0..5 {
            session.append(Turn::user(format!("q{i}")));
            session.append(Turn::assistant(format!("a{i}")));
        }

        let before = session.epoch();
        session.reset();
        assert_eq!(session.turn_count(), 0);
        assert!(session.epoch() > before);

        // Resetting an empty history still advances the epoch
        let before = session.epoch();
        session.reset();
        assert_eq!(session.turn_count(), 0);
        assert!(session.epoch() > before);
    }

    #[test]
    fn test_snapshot_is_detached() {
        let mut session = SessionState::new();
        session.append(Turn::user("first"));

        let snapshot = session.snapshot();
        session.append(Turn::assistant("second"));
        session.reset();

        assert_eq!(snapshot.turns, vec![Turn::user("first")]);
        assert_eq!(snapshot.epoch, 0);
        assert_ne!(snapshot.epoch, session.epoch());
    }

    #[test]
    fn test_role_serializes_lowercase() {
        let json = serde_json::to_string(&Turn::assistant("ok")).unwrap();
        assert_eq!(json, r#"{"role":"assistant","content":"ok"}"#);
    }

    #[test]
    fn test_sessions_get_distinct_ids() {
        assert_ne!(SessionState::new().id(), SessionState::new().id());
    }
}
