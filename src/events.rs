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

//! Event processing for the terminal front-end.

use std::io::{self, Write};
use tracing::{debug, error, info};

use crate::chat::{EndReason, SessionEvent};

/// Human-readable reason a chat stopped.
pub fn describe(reason: EndReason) -> &'static str {
    match reason {
        EndReason::LocalBye => "you said goodbye",
        EndReason::RemoteBye => "peer said goodbye",
        EndReason::PeerDisconnected => "peer disconnected",
        EndReason::Closed => "connection closed",
        EndReason::TransportFailure => "connection lost",
    }
}

/// Renders session events as chat lines.
pub struct EventProcessor<W: Write> {
    out: W,
    messages: usize,
    ended: Option<EndReason>,
}

impl<W: Write> EventProcessor<W> {
    pub fn new(out: W) -> Self {
        Self {
            out,
            messages: 0,
            ended: None,
        }
    }

    /// Process a single event. Returns `false` once the session is over.
    pub fn process_event(&mut self, event: SessionEvent) -> io::Result<bool> {
        match event {
            SessionEvent::MessageAppended(message) => {
                debug!("Transcript entry {}: {}", self.messages, message);
                self.messages += 1;
                writeln!(self.out, "{}", message)?;
            }
            SessionEvent::Error(e) => {
                error!("Session error: {}", e);
                writeln!(self.out, "!! {}", e)?;
            }
            SessionEvent::Ended(reason) => {
                info!("Session ended: {:?}", reason);
                self.ended = Some(reason);
                writeln!(self.out, "-- chat ended ({})", describe(reason))?;
            }
        }
        self.out.flush()?;
        Ok(self.ended.is_none())
    }

    /// Messages rendered so far.
    pub fn message_count(&self) -> usize {
        self.messages
    }

    pub fn end_reason(&self) -> Option<EndReason> {
        self.ended
    }

    pub fn into_inner(self) -> W {
        self.out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::{Message, Role};

    #[test]
    fn test_renders_transcript_lines() {
        let mut processor = EventProcessor::new(Vec::new());

        let events = [
            SessionEvent::MessageAppended(Message::new(Role::Client, "Ping")),
            SessionEvent::MessageAppended(Message::new(Role::Server, "Pong")),
            SessionEvent::Error("Transport error: reset".to_string()),
        ];
        for event in events {
            assert!(processor.process_event(event).unwrap());
        }
        assert!(!processor
            .process_event(SessionEvent::Ended(EndReason::RemoteBye))
            .unwrap());

        assert_eq!(processor.message_count(), 2);
        assert_eq!(processor.end_reason(), Some(EndReason::RemoteBye));
        let text = String::from_utf8(processor.into_inner()).unwrap();
        assert_eq!(
            text,
            "Client: Ping\nServer: Pong\n!! Transport error: reset\n-- chat ended (peer said goodbye)\n"
        );
    }
}
