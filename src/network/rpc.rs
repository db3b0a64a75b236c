//! Reply correlation
//!
//! Events that await an answer carry a correlation id. The table below maps
//! each outstanding id to the caller waiting on it, together with the
//! deadline after which the caller is failed with a timeout.

use std::collections::HashMap;
use std::time::Duration;

use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;

use super::client::{ClientError, ClientResult};
use crate::protocol::{CorrelationId, EventId};

/// Completion handle for one call
pub type ReplySender = oneshot::Sender<ClientResult<Option<Value>>>;

struct PendingReply {
    event: EventId,
    deadline: Instant,
    reply: ReplySender,
}

/// Outstanding calls keyed by correlation id.
///
/// Owned by the connection driver; nothing else mutates it.
pub struct PendingReplies {
    next_id: CorrelationId,
    timeout: Duration,
    pending: HashMap<CorrelationId, PendingReply>,
}

impl PendingReplies {
    pub fn new(timeout: Duration) -> Self {
        Self {
            next_id: 0,
            timeout,
            pending: HashMap::new(),
        }
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Id the next registration will receive
    pub fn peek_next_id(&self) -> CorrelationId {
        self.next_id
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn contains(&self, id: CorrelationId) -> bool {
        self.pending.contains_key(&id)
    }

    /// Register a call awaiting a reply, with its deadline measured from now
    pub fn register(&mut self, event: EventId, reply: ReplySender) -> CorrelationId {
        self.register_at(event, reply, Instant::now())
    }

    /// Register a call awaiting a reply, with its deadline measured from `now`
    pub fn register_at(&mut self, event: EventId, reply: ReplySender, now: Instant) -> CorrelationId {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);

        let entry = PendingReply {
            event,
            deadline: now + self.timeout,
            reply,
        };
        if let Some(displaced) = self.pending.insert(id, entry) {
            tracing::warn!(
                "Correlation id {} reused while event {} was still pending",
                id,
                displaced.event
            );
        }
        id
    }

    /// Complete the call waiting on `id`. Returns false for unknown ids.
    pub fn resolve(&mut self, id: CorrelationId, payload: Value) -> bool {
        match self.pending.remove(&id) {
            Some(entry) => {
                let _ = entry.reply.send(Ok(Some(payload)));
                true
            }
            None => false,
        }
    }

    /// Fail the call waiting on `id` with `error`
    pub fn reject(&mut self, id: CorrelationId, error: ClientError) -> bool {
        match self.pending.remove(&id) {
            Some(entry) => {
                let _ = entry.reply.send(Err(error));
                true
            }
            None => false,
        }
    }

    /// Earliest deadline among outstanding calls
    pub fn next_deadline(&self) -> Option<Instant> {
        self.pending.values().map(|entry| entry.deadline).min()
    }

    /// Fail every call whose deadline is at or before `now`
    pub fn expire(&mut self, now: Instant) -> usize {
        let due: Vec<CorrelationId> = self
            .pending
            .iter()
            .filter(|(_, entry)| entry.deadline <= now)
            .map(|(id, _)| *id)
            .collect();

        for id in &due {
            if let Some(entry) = self.pending.remove(id) {
                tracing::debug!("Reply to event {} (id {}) timed out", entry.event, id);
                let _ = entry.reply.send(Err(ClientError::ReplyTimeout {
                    event: entry.event,
                    id: *id,
                    timeout: self.timeout,
                }));
            }
        }
        due.len()
    }

    /// Fail every outstanding call
    pub fn reject_all<F>(&mut self, error: F) -> usize
    where
        F: Fn() -> ClientError,
    {
        let count = self.pending.len();
        for (_, entry) in self.pending.drain() {
            let _ = entry.reply.send(Err(error()));
        }
        count
    }
}
