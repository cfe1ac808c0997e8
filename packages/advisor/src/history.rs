//! Bounded conversation history.
//!
//! Holds the last N user/assistant exchanges for prompt context. The bound is
//! an invariant: a push that would exceed it evicts the oldest exchange, so
//! the history can never grow past its configured maximum.

use std::collections::VecDeque;

use serde::Serialize;

/// One user message and the response it received.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Exchange {
    pub user: String,
    pub assistant: String,
}

/// Fixed-capacity exchange ring. Oldest exchanges are evicted first.
#[derive(Debug, Clone)]
pub struct ConversationHistory {
    exchanges: VecDeque<Exchange>,
    max_exchanges: usize,
}

impl ConversationHistory {
    /// `max_exchanges` of zero keeps no history at all.
    pub fn new(max_exchanges: usize) -> Self {
        Self {
            exchanges: VecDeque::with_capacity(max_exchanges),
            max_exchanges,
        }
    }

    /// Record an exchange, evicting the oldest if the ring is full.
    pub fn push(&mut self, user: impl Into<String>, assistant: impl Into<String>) {
        if self.max_exchanges == 0 {
            return;
        }
        if self.exchanges.len() == self.max_exchanges {
            self.exchanges.pop_front();
        }
        self.exchanges.push_back(Exchange {
            user: user.into(),
            assistant: assistant.into(),
        });
    }

    /// The most recent `n` exchanges, oldest first.
    pub fn recent(&self, n: usize) -> impl Iterator<Item = &Exchange> {
        let skip = self.exchanges.len().saturating_sub(n);
        self.exchanges.iter().skip(skip)
    }

    /// Every retained exchange, oldest first.
    pub fn snapshot(&self) -> Vec<Exchange> {
        self.exchanges.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn clear(&mut self) {
        self.exchanges.clear();
    }
}
