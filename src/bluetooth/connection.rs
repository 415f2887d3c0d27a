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

//! Single-peer connection manager.
//!
//! The manager owns at most one stream. Its lifecycle is an explicit state
//! machine:
//!
//! ```text
//! Idle -> Listening -> Established -> Closed
//! Idle -> Dialing   -> Established -> Closed
//! ```
//!
//! `Closed` is terminal and reachable from every state through
//! [`ConnectionManager::close`], which may be called from any task and wakes
//! whatever operation is pending.

use parking_lot::Mutex;
use std::fmt;
use std::io;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::sync::{watch, Mutex as AsyncMutex};
use tracing::{debug, error, info, warn};

use super::authorization::Authorizer;
use super::discovery::Discovery;
use super::service::{PeerAddress, ServiceRecord, READ_BUFFER_SIZE};
use super::transport::{Acceptor, BoxedStream, Transport};
use crate::error::{Error, Result};

/// Which side of the connection we are.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionRole {
    /// Waited for the peer to connect.
    Listener,
    /// Opened the connection to the peer.
    Dialer,
}

/// State of the manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    Listening,
    Dialing,
    Established,
    Closed,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Idle => "Idle",
            Self::Listening => "Listening",
            Self::Dialing => "Dialing",
            Self::Established => "Established",
            Self::Closed => "Closed",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The established stream, split so reads and writes do not contend.
struct Link {
    peer: PeerAddress,
    reader: AsyncMutex<ReadHalf<BoxedStream>>,
    writer: AsyncMutex<WriteHalf<BoxedStream>>,
}

impl Link {
    fn new(stream: BoxedStream, peer: PeerAddress) -> Self {
        let (reader, writer) = tokio::io::split(stream);
        Self {
            peer,
            reader: AsyncMutex::new(reader),
            writer: AsyncMutex::new(writer),
        }
    }
}

/// Resources held in each state.
enum Slot {
    Idle,
    /// `acceptor` is `None` while the endpoint is opening or an accept is
    /// in flight.
    Listening {
        acceptor: Option<Box<dyn Acceptor>>,
        local: Option<PeerAddress>,
    },
    Dialing,
    Established(Arc<Link>),
    Closed,
}

impl Slot {
    fn state(&self) -> ConnectionState {
        match self {
            Self::Idle => ConnectionState::Idle,
            Self::Listening { .. } => ConnectionState::Listening,
            Self::Dialing => ConnectionState::Dialing,
            Self::Established(_) => ConnectionState::Established,
            Self::Closed => ConnectionState::Closed,
        }
    }
}

struct Inner {
    slot: Slot,
    role: Option<ConnectionRole>,
}

/// Owner of the one connection to the remote peer.
pub struct ConnectionManager {
    transport: Arc<dyn Transport>,
    authorizer: Arc<dyn Authorizer>,
    discovery: Option<Arc<dyn Discovery>>,
    service: ServiceRecord,
    read_buffer_size: usize,
    inner: Mutex<Inner>,
    closed: watch::Sender<bool>,
}

impl ConnectionManager {
    /// Create an idle manager for the default service.
    pub fn new(transport: Arc<dyn Transport>, authorizer: Arc<dyn Authorizer>) -> Self {
        let (closed, _) = watch::channel(false);
        Self {
            transport,
            authorizer,
            discovery: None,
            service: ServiceRecord::default(),
            read_buffer_size: READ_BUFFER_SIZE,
            inner: Mutex::new(Inner {
                slot: Slot::Idle,
                role: None,
            }),
            closed,
        }
    }

    /// Discovery to pause before dialing.
    pub fn with_discovery(mut self, discovery: Arc<dyn Discovery>) -> Self {
        self.discovery = Some(discovery);
        self
    }

    pub fn with_service(mut self, service: ServiceRecord) -> Self {
        self.service = service;
        self
    }

    /// Upper bound on the bytes returned by one [`ConnectionManager::receive`].
    pub fn with_read_buffer_size(mut self, size: usize) -> Self {
        self.read_buffer_size = size.max(1);
        self
    }

    pub fn state(&self) -> ConnectionState {
        self.inner.lock().slot.state()
    }

    pub fn is_established(&self) -> bool {
        self.state() == ConnectionState::Established
    }

    /// Role chosen by the last listen or dial, if any.
    pub fn role(&self) -> Option<ConnectionRole> {
        self.inner.lock().role
    }

    /// Remote peer while established.
    pub fn peer(&self) -> Option<PeerAddress> {
        match &self.inner.lock().slot {
            Slot::Established(link) => Some(link.peer.clone()),
            _ => None,
        }
    }

    /// Address of the listening endpoint, when the transport reports one.
    pub fn listening_address(&self) -> Option<PeerAddress> {
        match &self.inner.lock().slot {
            Slot::Listening { local, .. } => local.clone(),
            _ => None,
        }
    }

    pub fn service(&self) -> &ServiceRecord {
        &self.service
    }

    /// Open the passive endpoint. Valid only from `Idle`.
    pub async fn start_listening(&self) -> Result<()> {
        self.expect_state(ConnectionState::Idle, "start listening")?;
        self.check_radio_access().await?;
        self.begin(ConnectionState::Listening, ConnectionRole::Listener, "start listening")?;
        let setup = SetupGuard::new(self, ConnectionState::Listening);

        let opened = tokio::select! {
            res = self.transport.listen(&self.service) => res,
            _ = self.wait_closed() => return Err(Error::Cancelled),
        };
        setup.disarm();

        let mut inner = self.inner.lock();
        match opened {
            Ok(acceptor) => match &mut inner.slot {
                Slot::Listening {
                    acceptor: slot,
                    local,
                } => {
                    *local = acceptor.local_address();
                    *slot = Some(acceptor);
                    info!(
                        "Listening for {} over {}",
                        self.service,
                        self.transport.name()
                    );
                    Ok(())
                }
                // Closed while the endpoint was opening.
                _ => Err(Error::Cancelled),
            },
            Err(e) => {
                error!("Failed to open listening endpoint: {}", e);
                if matches!(inner.slot, Slot::Listening { .. }) {
                    inner.slot = Slot::Idle;
                    inner.role = None;
                }
                Err(Error::Transport(e))
            }
        }
    }

    /// Wait for exactly one inbound connection. Valid only from `Listening`.
    ///
    /// The listening endpoint is released as soon as a peer connects. If the
    /// returned future is dropped first, the manager keeps listening.
    pub async fn accept_one(&self) -> Result<PeerAddress> {
        let acceptor = {
            let mut inner = self.inner.lock();
            match &mut inner.slot {
                Slot::Listening { acceptor, .. } => {
                    acceptor.take().ok_or(Error::InvalidState {
                        operation: "accept",
                        state: ConnectionState::Listening,
                    })?
                }
                other => {
                    return Err(Error::InvalidState {
                        operation: "accept",
                        state: other.state(),
                    })
                }
            }
        };

        let mut loan = AcceptorLoan {
            manager: self,
            acceptor: Some(acceptor),
        };

        debug!("Waiting for an inbound connection...");
        let accepted = {
            let Some(acceptor) = loan.acceptor.as_mut() else {
                return Err(Error::Cancelled);
            };
            tokio::select! {
                res = acceptor.accept() => res,
                _ = self.wait_closed() => {
                    info!("Accept cancelled");
                    return Err(Error::Cancelled);
                }
            }
        };
        drop(loan.acceptor.take());

        match accepted {
            Ok((stream, peer)) => {
                let mut inner = self.inner.lock();
                if !matches!(inner.slot, Slot::Listening { .. }) {
                    return Err(Error::Cancelled);
                }
                inner.slot = Slot::Established(Arc::new(Link::new(stream, peer.clone())));
                info!("Connection accepted from {}", peer);
                Ok(peer)
            }
            Err(e) => {
                error!("Accept error: {}", e);
                self.close();
                Err(Error::Transport(e))
            }
        }
    }

    /// Connect to `peer`. Valid only from `Idle`.
    ///
    /// Any running discovery scan is stopped first. On failure, or if the
    /// returned future is dropped, the manager returns to `Idle`.
    pub async fn dial(&self, peer: &PeerAddress) -> Result<()> {
        self.expect_state(ConnectionState::Idle, "dial")?;
        self.check_radio_access().await?;
        self.begin(ConnectionState::Dialing, ConnectionRole::Dialer, "dial")?;
        let setup = SetupGuard::new(self, ConnectionState::Dialing);

        if let Some(discovery) = &self.discovery {
            debug!("Stopping discovery before dialing");
            discovery.stop_scan().await;
        }

        info!("Dialing {} for {}", peer, self.service);
        let dialed = tokio::select! {
            res = self.transport.connect(peer, &self.service) => res,
            _ = self.wait_closed() => {
                info!("Dial to {} cancelled", peer);
                return Err(Error::Cancelled);
            }
        };
        setup.disarm();

        let mut inner = self.inner.lock();
        match dialed {
            Ok(stream) => {
                if !matches!(inner.slot, Slot::Dialing) {
                    return Err(Error::Cancelled);
                }
                inner.slot = Slot::Established(Arc::new(Link::new(stream, peer.clone())));
                info!("Connected to {}", peer);
                Ok(())
            }
            Err(e) => {
                warn!("Connection to {} failed: {}", peer, e);
                if matches!(inner.slot, Slot::Dialing) {
                    inner.slot = Slot::Idle;
                    inner.role = None;
                }
                Err(Error::Transport(e))
            }
        }
    }

    /// Write `bytes` to the peer. Concurrent senders are serialized.
    pub async fn send(&self, bytes: &[u8]) -> Result<()> {
        let link = self.link()?;

        let written = tokio::select! {
            res = write_all(&link, bytes) => res,
            _ = self.wait_closed() => return Err(Error::Cancelled),
        };

        match written {
            Ok(()) => {
                debug!("Sent {} bytes to {}", bytes.len(), link.peer);
                Ok(())
            }
            Err(e) => {
                error!("Write error: {}", e);
                self.close();
                Err(Error::Transport(e))
            }
        }
    }

    /// Wait until the peer sends something.
    ///
    /// Returns between one and `read_buffer_size` bytes, or
    /// [`Error::EndOfStream`] once the peer has closed the stream.
    pub async fn receive(&self) -> Result<Vec<u8>> {
        let link = self.link()?;
        let mut buf = vec![0u8; self.read_buffer_size];

        let read = tokio::select! {
            res = read_some(&link, &mut buf) => res,
            _ = self.wait_closed() => return Err(Error::Cancelled),
        };

        match read {
            Ok(0) => {
                info!("Connection closed by {}", link.peer);
                self.close();
                Err(Error::EndOfStream)
            }
            Ok(n) => {
                buf.truncate(n);
                Ok(buf)
            }
            Err(e) => {
                error!("Read error: {}", e);
                self.close();
                Err(Error::Transport(e))
            }
        }
    }

    /// Release the stream and any listening endpoint. Idempotent.
    pub fn close(&self) {
        let previous = {
            let mut inner = self.inner.lock();
            std::mem::replace(&mut inner.slot, Slot::Closed)
        };
        self.closed.send_replace(true);

        match previous.state() {
            ConnectionState::Closed => debug!("Connection already closed"),
            state => info!("Connection closed (was {})", state),
        }
    }

    fn link(&self) -> Result<Arc<Link>> {
        match &self.inner.lock().slot {
            Slot::Established(link) => Ok(link.clone()),
            _ => Err(Error::NotConnected),
        }
    }

    fn expect_state(&self, expected: ConnectionState, operation: &'static str) -> Result<()> {
        let state = self.state();
        if state == expected {
            Ok(())
        } else {
            Err(Error::InvalidState { operation, state })
        }
    }

    /// Leave `Idle` for `next`, unless something else got there first.
    fn begin(
        &self,
        next: ConnectionState,
        role: ConnectionRole,
        operation: &'static str,
    ) -> Result<()> {
        let mut inner = self.inner.lock();
        let state = inner.slot.state();
        if state != ConnectionState::Idle {
            return Err(Error::InvalidState { operation, state });
        }
        inner.slot = match next {
            ConnectionState::Listening => Slot::Listening {
                acceptor: None,
                local: None,
            },
            _ => Slot::Dialing,
        };
        inner.role = Some(role);
        Ok(())
    }

    async fn check_radio_access(&self) -> Result<()> {
        if !self.authorizer.has_required_permissions() {
            warn!("Missing Bluetooth permissions");
            return Err(Error::PermissionDenied);
        }
        if !self.transport.radio_available().await {
            warn!("{} radio unavailable", self.transport.name());
            return Err(Error::RadioUnavailable);
        }
        Ok(())
    }

    async fn wait_closed(&self) {
        let mut rx = self.closed.subscribe();
        let _ = rx.wait_for(|closed| *closed).await;
    }
}

/// Rolls a listen or dial that never finished back to `Idle`.
struct SetupGuard<'a> {
    manager: &'a ConnectionManager,
    state: ConnectionState,
    armed: bool,
}

impl<'a> SetupGuard<'a> {
    fn new(manager: &'a ConnectionManager, state: ConnectionState) -> Self {
        Self {
            manager,
            state,
            armed: true,
        }
    }

    /// The operation reached its own result handling.
    fn disarm(mut self) {
        self.armed = false;
    }
}

impl Drop for SetupGuard<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let mut inner = self.manager.inner.lock();
        let pending = match &inner.slot {
            Slot::Listening { acceptor: None, .. } => self.state == ConnectionState::Listening,
            Slot::Dialing => self.state == ConnectionState::Dialing,
            _ => false,
        };
        if pending {
            debug!("Abandoned {} returned to Idle", self.state);
            inner.slot = Slot::Idle;
            inner.role = None;
        }
    }
}

/// Acceptor taken out of the slot by a running `accept_one`.
///
/// Put back if the accept is abandoned while the manager is still listening.
struct AcceptorLoan<'a> {
    manager: &'a ConnectionManager,
    acceptor: Option<Box<dyn Acceptor>>,
}

impl Drop for AcceptorLoan<'_> {
    fn drop(&mut self) {
        let Some(acceptor) = self.acceptor.take() else {
            return;
        };
        let leftover = {
            let mut inner = self.manager.inner.lock();
            match &mut inner.slot {
                Slot::Listening { acceptor: slot, .. } if slot.is_none() => {
                    debug!("Accept abandoned, keeping the listening endpoint");
                    *slot = Some(acceptor);
                    None
                }
                _ => Some(acceptor),
            }
        };
        drop(leftover);
    }
}

async fn write_all(link: &Link, bytes: &[u8]) -> io::Result<()> {
    let mut writer = link.writer.lock().await;
    writer.write_all(bytes).await?;
    writer.flush().await
}

async fn read_some(link: &Link, buf: &mut [u8]) -> io::Result<usize> {
    let mut reader = link.reader.lock().await;
    reader.read(buf).await
}
