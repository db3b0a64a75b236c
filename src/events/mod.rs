//! Events module - Listener registration for the client
//!
//! Lifecycle events (`open`, `close`, `connect`, ...) are keyed by their
//! literal name. Every other event name is keyed by its [`EventId`], which is
//! also the identifier carried on the wire, so incoming event frames dispatch
//! without ever knowing the name it was registered under.

mod dispatcher;

pub use dispatcher::*;

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use bytes::Bytes;
use serde_json::Value;

use crate::network::ClientError;
use crate::protocol::EventId;

/// Events raised by the client itself, never hashed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Open,
    Close,
    Connect,
    Disconnect,
    Ping,
    Pong,
    Message,
    Binary,
    Error,
}

impl Lifecycle {
    pub const ALL: [Lifecycle; 9] = [
        Lifecycle::Open,
        Lifecycle::Close,
        Lifecycle::Connect,
        Lifecycle::Disconnect,
        Lifecycle::Ping,
        Lifecycle::Pong,
        Lifecycle::Message,
        Lifecycle::Binary,
        Lifecycle::Error,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Close => "close",
            Self::Connect => "connect",
            Self::Disconnect => "disconnect",
            Self::Ping => "ping",
            Self::Pong => "pong",
            Self::Message => "message",
            Self::Binary => "binary",
            Self::Error => "error",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|event| event.name() == name)
    }
}

impl fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Key under which listeners are stored
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DispatchKey {
    Lifecycle(Lifecycle),
    Event(EventId),
}

impl DispatchKey {
    /// Resolve an event name to its dispatch key
    pub fn for_name(name: &str) -> Self {
        match Lifecycle::from_name(name) {
            Some(event) => Self::Lifecycle(event),
            None => Self::Event(EventId::of(name)),
        }
    }
}

/// Argument passed to listeners
#[derive(Debug, Clone)]
pub enum EventData {
    /// No argument (`open`, `close`, `connect`, `disconnect`)
    Empty,
    /// Decoded payload of a message or event
    Value(Value),
    /// Timestamp carried by an incoming ping
    Ping { timestamp: u64 },
    /// Round-trip time measured from a pong
    Pong { latency_ms: i64 },
    /// Raw binary frame
    Binary(Bytes),
    /// Failure reported on the `error` channel
    Error(Arc<ClientError>),
}

impl EventData {
    pub fn as_value(&self) -> Option<&Value> {
        match self {
            Self::Value(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_binary(&self) -> Option<&Bytes> {
        match self {
            Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn as_error(&self) -> Option<&ClientError> {
        match self {
            Self::Error(error) => Some(error),
            _ => None,
        }
    }
}

struct Registry {
    dispatcher: Dispatcher<DispatchKey, EventData>,
    /// First name registered under each event id
    names: HashMap<EventId, String>,
}

/// Name-aware front of the listener table.
///
/// Listeners are called outside the internal lock, so a listener may register
/// or remove listeners itself.
pub struct EventFacade {
    registry: Mutex<Registry>,
}

impl EventFacade {
    pub fn new() -> Self {
        Self {
            registry: Mutex::new(Registry {
                dispatcher: Dispatcher::new(),
                names: HashMap::new(),
            }),
        }
    }

    /// Register a listener for `name`
    pub fn on<F>(&self, name: &str, listener: F) -> ListenerId
    where
        F: Fn(&EventData) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let key = registry.key_for_registration(name);
        registry.dispatcher.on(key, Arc::new(listener))
    }

    /// Register a listener for a single emission of `name`
    pub fn once<F>(&self, name: &str, listener: F) -> ListenerId
    where
        F: Fn(&EventData) + Send + Sync + 'static,
    {
        let mut registry = self.lock();
        let key = registry.key_for_registration(name);
        registry.dispatcher.once(key, Arc::new(listener))
    }

    /// Remove a listener previously registered for `name`
    pub fn off(&self, name: &str, id: ListenerId) -> bool {
        let key = DispatchKey::for_name(name);
        let mut registry = self.lock();
        let removed = registry.dispatcher.off(&key, id);
        registry.forget_if_unused(&key);
        removed
    }

    /// Remove every listener for `name`
    pub fn remove_all_listeners(&self, name: &str) -> usize {
        let key = DispatchKey::for_name(name);
        let mut registry = self.lock();
        let removed = registry.dispatcher.remove_all(&key);
        registry.forget_if_unused(&key);
        removed
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.lock().dispatcher.listener_count(&DispatchKey::for_name(name))
    }

    /// Emit locally by name
    pub fn emit_local(&self, name: &str, data: &EventData) -> usize {
        self.dispatch(DispatchKey::for_name(name), data)
    }

    /// Emit a lifecycle event
    pub fn emit_lifecycle(&self, event: Lifecycle, data: &EventData) -> usize {
        self.dispatch(DispatchKey::Lifecycle(event), data)
    }

    /// Call the listeners registered under `key`
    pub fn dispatch(&self, key: DispatchKey, data: &EventData) -> usize {
        let listeners = {
            let mut registry = self.lock();
            let listeners = registry.dispatcher.take_for_emit(&key);
            registry.forget_if_unused(&key);
            listeners
        };
        for listener in &listeners {
            listener(data);
        }
        listeners.len()
    }

    #[cfg(test)]
    fn remembered_names(&self) -> usize {
        self.lock().names.len()
    }

    fn lock(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for EventFacade {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    fn key_for_registration(&mut self, name: &str) -> DispatchKey {
        let key = DispatchKey::for_name(name);
        if let DispatchKey::Event(id) = key {
            match self.names.get(&id) {
                Some(existing) if existing != name => {
                    tracing::warn!(
                        "Event name {:?} collides with {:?} (id {}); listeners share the slot",
                        name,
                        existing,
                        id
                    );
                }
                Some(_) => {}
                None => {
                    self.names.insert(id, name.to_string());
                }
            }
        }
        key
    }

    /// Drop the remembered name once no listener is left under `key`
    fn forget_if_unused(&mut self, key: &DispatchKey) {
        if let DispatchKey::Event(id) = key {
            if self.dispatcher.listener_count(key) == 0 {
                self.names.remove(id);
            }
        }
    }
}
