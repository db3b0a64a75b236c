//! Connection state machine
//!
//! Tracks the handshake over an opened transport:
//! - `Init` until the transport reports open
//! - `Open` until the server sends the version token
//! - `Connected` while protocol frames flow
//! - `Closed` once the transport is gone (terminal)

use std::fmt;

use super::transport::WireFrame;
use crate::protocol::HANDSHAKE_TOKEN;

/// State of a client connection
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Constructed, transport not yet open
    Init,
    /// Transport open, awaiting the version token
    Open,
    /// Handshake complete
    Connected,
    /// Transport closed
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Open => "open",
            Self::Connected => "connected",
            Self::Closed => "closed",
        };
        f.write_str(name)
    }
}

/// What to do with a frame delivered by the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Gate {
    /// The frame was the handshake token; the connection is now established
    Connected,
    /// A frame other than the token arrived during the handshake
    VersionMismatch(WireFrame),
    /// Protocol frame to decode and route
    Deliver(WireFrame),
    /// No frames are accepted in the current state
    Dropped(WireFrame),
}

/// Handshake progress of one client
#[derive(Debug)]
pub struct ConnectionMachine {
    state: ConnectionState,
}

impl ConnectionMachine {
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Init,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    /// Transport reported open. Returns whether the state changed.
    pub fn on_open(&mut self) -> bool {
        if self.state != ConnectionState::Init {
            return false;
        }
        self.state = ConnectionState::Open;
        true
    }

    /// Route a frame delivered by the transport
    pub fn on_frame(&mut self, frame: WireFrame) -> Gate {
        match self.state {
            ConnectionState::Open => match &frame {
                WireFrame::Text(text) if text == HANDSHAKE_TOKEN => {
                    self.state = ConnectionState::Connected;
                    Gate::Connected
                }
                _ => Gate::VersionMismatch(frame),
            },
            ConnectionState::Connected => Gate::Deliver(frame),
            ConnectionState::Init | ConnectionState::Closed => Gate::Dropped(frame),
        }
    }

    /// Transport reported close. Returns the state that was left, if any.
    pub fn on_close(&mut self) -> Option<ConnectionState> {
        match self.state {
            ConnectionState::Closed => None,
            previous => {
                self.state = ConnectionState::Closed;
                Some(previous)
            }
        }
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }
}

impl Default for ConnectionMachine {
    fn default() -> Self {
        Self::new()
    }
}
