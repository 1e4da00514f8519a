//! Chat instruction queue.
//!
//! Players type instructions into game chat; controllers poll and consume
//! them one at a time.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{SystemTime, UNIX_EPOCH};

/// One queued chat line
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatInstruction {
    pub username: String,
    pub message: String,
    /// Milliseconds since the Unix epoch
    pub timestamp: u64,
}

/// What [`InstructionQueue::on_chat`] did with a message
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatAction {
    Ignored,
    Queued,
    Reset,
}

#[derive(Debug, Default)]
pub struct InstructionQueue {
    own_name: Option<String>,
    pending: VecDeque<ChatInstruction>,
    current: Option<ChatInstruction>,
}

pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

impl InstructionQueue {
    pub fn new(own_name: Option<String>) -> Self {
        Self {
            own_name,
            ..Self::default()
        }
    }

    pub fn set_own_name(&mut self, name: Option<String>) {
        self.own_name = name;
    }

    /// Handle an incoming chat line. The agent's own messages are dropped;
    /// `reset` clears everything.
    pub fn on_chat(&mut self, username: &str, message: &str, timestamp: u64) -> ChatAction {
        if self.own_name.as_deref() == Some(username) {
            return ChatAction::Ignored;
        }
        if message.trim().eq_ignore_ascii_case("reset") {
            log::info!("chat reset from {}", username);
            self.pending.clear();
            self.current = None;
            return ChatAction::Reset;
        }
        log::debug!("queued instruction from {}: {:?}", username, message);
        self.pending.push_back(ChatInstruction {
            username: username.to_string(),
            message: message.to_string(),
            timestamp,
        });
        ChatAction::Queued
    }

    pub fn pending(&self) -> impl Iterator<Item = &ChatInstruction> {
        self.pending.iter()
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn current(&self) -> Option<&ChatInstruction> {
        self.current.as_ref()
    }

    /// Move the oldest pending instruction into `current`. Leaves `current`
    /// untouched when nothing is pending.
    pub fn start_next(&mut self) -> Option<&ChatInstruction> {
        let next = self.pending.pop_front()?;
        self.current = Some(next);
        self.current.as_ref()
    }

    pub fn clear_current(&mut self) {
        self.current = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut q = InstructionQueue::new(Some("Agent".into()));
        assert_eq!(q.on_chat("alice", "chop a tree", 1), ChatAction::Queued);
        assert_eq!(q.on_chat("bob", "build a hut", 2), ChatAction::Queued);
        assert_eq!(q.start_next().unwrap().message, "chop a tree");
        assert_eq!(q.current().unwrap().username, "alice");
        assert_eq!(q.len(), 1);
        assert_eq!(q.start_next().unwrap().message, "build a hut");
        assert!(q.start_next().is_none());
        assert_eq!(q.current().unwrap().message, "build a hut");
    }

    #[test]
    fn own_messages_are_ignored() {
        let mut q = InstructionQueue::new(Some("Agent".into()));
        assert_eq!(q.on_chat("Agent", "on my way", 1), ChatAction::Ignored);
        assert!(q.is_empty());
    }

    #[test]
    fn reset_clears_queue_and_current() {
        let mut q = InstructionQueue::new(None);
        q.on_chat("alice", "dig", 1);
        q.on_chat("alice", "mine", 2);
        q.start_next();
        assert_eq!(q.on_chat("bob", "  ReSeT ", 3), ChatAction::Reset);
        assert!(q.is_empty());
        assert!(q.current().is_none());
    }

    #[test]
    fn clear_current_keeps_pending() {
        let mut q = InstructionQueue::new(None);
        q.on_chat("alice", "a", 1);
        q.on_chat("alice", "b", 2);
        q.start_next();
        q.clear_current();
        assert!(q.current().is_none());
        assert_eq!(q.pending().next().unwrap().message, "b");
    }
}
