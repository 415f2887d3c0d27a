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

//! Chat session over an established connection.

use std::sync::Arc;
use tokio::sync::{mpsc, watch, Mutex as AsyncMutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::protocol::{encode_frame, ControlFrame, FrameDecoder, MAX_FRAME_LEN};
use super::transcript::{Message, Role, Transcript};
use crate::bluetooth::{ConnectionManager, PeerAddress};
use crate::error::{Error, Result};

/// Why a session stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndReason {
    /// We sent `Bye`.
    LocalBye,
    /// The peer sent `Bye`.
    RemoteBye,
    /// The peer closed the stream without saying goodbye.
    PeerDisconnected,
    /// The connection was closed underneath the session.
    Closed,
    /// Reading or writing failed.
    TransportFailure,
}

/// Events emitted by a session.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// A message was added to the transcript.
    MessageAppended(Message),
    /// The session is over.
    Ended(EndReason),
    /// Error occurred.
    Error(String),
}

/// State shared between the session handle and its receive task.
struct Shared {
    manager: Arc<ConnectionManager>,
    role: Role,
    transcript: Transcript,
    max_frame_len: usize,
    connected: watch::Sender<bool>,
    /// Held across a send and its transcript entry.
    send_lock: AsyncMutex<()>,
    event_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl Shared {
    fn record(&self, message: Message) {
        self.transcript.append(message.clone());
        self.emit(SessionEvent::MessageAppended(message));
    }

    fn emit(&self, event: SessionEvent) {
        let _ = self.event_tx.send(event);
    }

    /// Clear the connected flag; returns whether it was set.
    fn disconnect(&self) -> bool {
        self.connected.send_replace(false)
    }

    fn is_connected(&self) -> bool {
        *self.connected.borrow()
    }
}

/// Ping/pong chat running over one [`ConnectionManager`].
pub struct ChatSession {
    shared: Arc<Shared>,
    event_rx: Option<mpsc::UnboundedReceiver<SessionEvent>>,
    reader: JoinHandle<()>,
}

impl ChatSession {
    /// Start the receive loop. The connection must be established.
    pub fn start(manager: Arc<ConnectionManager>, role: Role) -> Result<Self> {
        Self::start_with_max_frame_len(manager, role, MAX_FRAME_LEN)
    }

    /// Like [`ChatSession::start`] with a custom inbound frame limit.
    pub fn start_with_max_frame_len(
        manager: Arc<ConnectionManager>,
        role: Role,
        max_frame_len: usize,
    ) -> Result<Self> {
        if !manager.is_established() {
            return Err(Error::NotConnected);
        }

        let (connected, _) = watch::channel(true);
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            manager,
            role,
            transcript: Transcript::new(),
            max_frame_len,
            connected,
            send_lock: AsyncMutex::new(()),
            event_tx,
        });

        info!("Chat session started as {}", role);
        let reader = tokio::spawn(receive_loop(shared.clone(), max_frame_len));

        Ok(Self {
            shared,
            event_rx: Some(event_rx),
            reader,
        })
    }

    /// Take the event receiver (can only be called once).
    pub fn take_event_receiver(&mut self) -> Option<mpsc::UnboundedReceiver<SessionEvent>> {
        self.event_rx.take()
    }

    pub fn role(&self) -> Role {
        self.shared.role
    }

    pub fn peer(&self) -> Option<PeerAddress> {
        self.shared.manager.peer()
    }

    pub fn is_connected(&self) -> bool {
        self.shared.is_connected()
    }

    /// Copy of the transcript so far.
    pub fn transcript(&self) -> Vec<Message> {
        self.shared.transcript.snapshot()
    }

    pub async fn send_ping(&self) -> Result<()> {
        self.send_text(ControlFrame::Ping.as_str()).await
    }

    pub async fn send_pong(&self) -> Result<()> {
        self.send_text(ControlFrame::Pong.as_str()).await
    }

    /// Send one frame and record it under the local role once written.
    ///
    /// `Bye` ends the session the same way [`ChatSession::end`] does.
    pub async fn send_text(&self, text: &str) -> Result<()> {
        if ControlFrame::parse(text) == Some(ControlFrame::Bye) {
            if !self.shared.is_connected() {
                return Err(Error::NotConnected);
            }
            return self.end().await;
        }

        let frame = encode_frame(text, self.shared.max_frame_len)?;

        // Held until the entry is recorded, so transcript order matches wire order.
        let _guard = self.shared.send_lock.lock().await;
        if !self.shared.is_connected() || !self.shared.manager.is_established() {
            return Err(Error::NotConnected);
        }

        if let Err(e) = self.shared.manager.send(&frame).await {
            warn!("Send failed: {}", e);
            // Closes from elsewhere are reported by the receive loop.
            if matches!(e, Error::Transport(_)) && self.shared.disconnect() {
                self.shared.emit(SessionEvent::Error(e.to_string()));
                self.shared
                    .emit(SessionEvent::Ended(EndReason::TransportFailure));
            }
            return Err(e);
        }

        debug!("Sent: {}", text);
        self.shared.record(Message::new(self.shared.role, text));
        Ok(())
    }

    /// Say goodbye and close the connection. Idempotent.
    pub async fn end(&self) -> Result<()> {
        let was_connected = self.shared.disconnect();
        if !was_connected {
            self.shared.manager.close();
            return Ok(());
        }

        let mut result = Ok(());
        if self.shared.manager.is_established() {
            let _guard = self.shared.send_lock.lock().await;
            let bye = ControlFrame::Bye.as_str();
            match encode_frame(bye, self.shared.max_frame_len) {
                Ok(frame) => match self.shared.manager.send(&frame).await {
                    Ok(()) => self.shared.record(Message::new(self.shared.role, bye)),
                    Err(e) => {
                        warn!("Failed to send {}: {}", bye, e);
                        result = Err(e);
                    }
                },
                Err(e) => result = Err(e),
            }
        }

        self.shared.manager.close();
        self.shared.emit(SessionEvent::Ended(EndReason::LocalBye));
        info!("Chat session ended");
        result
    }

    /// Resolves once the session is no longer connected.
    pub async fn wait_ended(&self) {
        let mut rx = self.shared.connected.subscribe();
        let _ = rx.wait_for(|connected| !*connected).await;
    }
}

impl Drop for ChatSession {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn wait_until_cleared(alive: &mut watch::Receiver<bool>) {
    let _ = alive.wait_for(|connected| !*connected).await;
}

/// Append every inbound frame until `Bye`, end of stream, or the flag clears.
async fn receive_loop(shared: Arc<Shared>, max_frame_len: usize) {
    let mut decoder = FrameDecoder::with_max_frame_len(max_frame_len);
    let mut alive = shared.connected.subscribe();
    let remote = shared.role.opposite();

    loop {
        let received = tokio::select! {
            biased;
            _ = wait_until_cleared(&mut alive) => {
                debug!("Receive loop stopped");
                return;
            }
            res = shared.manager.receive() => res,
        };

        match received {
            Ok(bytes) => {
                for text in decoder.push(&bytes) {
                    let control = ControlFrame::parse(&text);
                    info!("{}: {}", remote, text);
                    shared.record(Message::new(remote, text));

                    if control == Some(ControlFrame::Bye) {
                        shared.manager.close();
                        if shared.disconnect() {
                            shared.emit(SessionEvent::Ended(EndReason::RemoteBye));
                        }
                        return;
                    }
                }
            }
            Err(Error::EndOfStream) => {
                if shared.disconnect() {
                    shared.emit(SessionEvent::Ended(EndReason::PeerDisconnected));
                }
                return;
            }
            Err(Error::Cancelled) | Err(Error::NotConnected) => {
                // A failing send closes the manager too; let it report first.
                let _guard = shared.send_lock.lock().await;
                if shared.disconnect() {
                    shared.emit(SessionEvent::Ended(EndReason::Closed));
                }
                return;
            }
            Err(e) => {
                warn!("Receive failed: {}", e);
                shared.manager.close();
                if shared.disconnect() {
                    shared.emit(SessionEvent::Error(e.to_string()));
                    shared.emit(SessionEvent::Ended(EndReason::TransportFailure));
                }
                return;
            }
        }
    }
}
