// Copyright 2026 rfchat contributors
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Chat transcript.

use parking_lot::RwLock;
use std::fmt;

use crate::bluetooth::ConnectionRole;

/// Chat-level role of a peer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    Server,
    Client,
}

impl Role {
    pub fn opposite(&self) -> Self {
        match self {
            Self::Server => Self::Client,
            Self::Client => Self::Server,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Server => "Server",
            Self::Client => "Client",
        }
    }
}

impl From<ConnectionRole> for Role {
    fn from(role: ConnectionRole) -> Self {
        match role {
            ConnectionRole::Listener => Self::Server,
            ConnectionRole::Dialer => Self::Client,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One transcript entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Role of the peer that sent the frame.
    pub origin: Role,
    pub text: String,
}

impl Message {
    pub fn new(origin: Role, text: impl Into<String>) -> Self {
        Self {
            origin,
            text: text.into(),
        }
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.origin, self.text)
    }
}

/// Append-only, ordered list of messages.
#[derive(Debug, Default)]
pub struct Transcript {
    entries: RwLock<Vec<Message>>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `message`, returning its position.
    pub fn append(&self, message: Message) -> usize {
        let mut entries = self.entries.write();
        entries.push(message);
        entries.len() - 1
    }

    /// Copy of every entry so far.
    pub fn snapshot(&self) -> Vec<Message> {
        self.entries.read().clone()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn last(&self) -> Option<Message> {
        self.entries.read().last().cloned()
    }

    /// Whether any entry matches `origin` and `text`.
    pub fn contains(&self, origin: Role, text: &str) -> bool {
        self.entries
            .read()
            .iter()
            .any(|m| m.origin == origin && m.text == text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_roles() {
        assert_eq!(Role::Server.opposite(), Role::Client);
        assert_eq!(Role::from(ConnectionRole::Listener), Role::Server);
        assert_eq!(Role::from(ConnectionRole::Dialer), Role::Client);
    }

    #[test]
    fn test_message_display() {
        let msg = Message::new(Role::Client, "Ping");
        assert_eq!(msg.to_string(), "Client: Ping");
    }

    #[test]
    fn test_append_extends_prefix() {
        let transcript = Transcript::new();
        assert!(transcript.is_empty());

        assert_eq!(transcript.append(Message::new(Role::Server, "Ping")), 0);
        let before = transcript.snapshot();
        assert_eq!(transcript.append(Message::new(Role::Client, "Pong")), 1);
        let after = transcript.snapshot();

        assert_eq!(&after[..before.len()], &before[..]);
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript.last(), Some(Message::new(Role::Client, "Pong")));
        assert!(transcript.contains(Role::Server, "Ping"));
        assert!(!transcript.contains(Role::Client, "Ping"));
    }
}
