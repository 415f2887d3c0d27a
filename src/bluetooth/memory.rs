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

//! In-process radio.
//!
//! A [`MemoryEther`] stands in for the air between radios: every
//! [`MemoryRadio`] created from the same ether can discover and dial the
//! others. Streams are `tokio::io::duplex` pipes. Used by the test suite and
//! the `demo` command.

use futures::future::BoxFuture;
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::io::DuplexStream;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info};
use uuid::Uuid;

use super::discovery::{Discovery, PeerRegistry};
use super::service::{PeerAddress, ServiceRecord};
use super::transport::{Acceptor, BoxedStream, Transport};
use crate::error::{Error, Result};

/// Bytes buffered in each direction of an in-memory stream.
const STREAM_BUFFER: usize = 64 * 1024;

/// Connection waiting for the listener to pick it up.
struct PendingConnection {
    stream: DuplexStream,
    from: PeerAddress,
    accepted: oneshot::Sender<()>,
}

struct RadioInfo {
    name: String,
    powered: bool,
}

#[derive(Default)]
struct EtherState {
    radios: HashMap<String, RadioInfo>,
    listeners: HashMap<(String, Uuid), mpsc::Sender<PendingConnection>>,
}

/// Shared medium connecting in-memory radios.
#[derive(Clone, Default)]
pub struct MemoryEther {
    state: Arc<Mutex<EtherState>>,
}

impl MemoryEther {
    pub fn new() -> Self {
        Self::default()
    }

    /// Power up a new radio at `address`.
    pub fn radio(&self, address: impl Into<String>, name: impl Into<String>) -> MemoryRadio {
        let address = address.into();
        let name = name.into();
        self.state.lock().radios.insert(
            address.clone(),
            RadioInfo {
                name: name.clone(),
                powered: true,
            },
        );
        debug!("Memory radio up: {} ({})", name, address);

        MemoryRadio {
            ether: self.clone(),
            local: PeerAddress::new(address).with_name(name),
            peers: PeerRegistry::new(),
            scanning: AtomicBool::new(false),
        }
    }
}

/// One radio attached to a [`MemoryEther`].
pub struct MemoryRadio {
    ether: MemoryEther,
    local: PeerAddress,
    peers: PeerRegistry,
    scanning: AtomicBool,
}

impl MemoryRadio {
    /// Address other radios dial to reach this one.
    pub fn address(&self) -> PeerAddress {
        self.local.clone()
    }

    pub fn set_powered(&self, powered: bool) {
        if let Some(info) = self.ether.state.lock().radios.get_mut(&self.local.address) {
            info.powered = powered;
        }
    }

    pub fn is_powered(&self) -> bool {
        self.ether
            .state
            .lock()
            .radios
            .get(&self.local.address)
            .map(|info| info.powered)
            .unwrap_or(false)
    }

    pub fn is_scanning(&self) -> bool {
        self.scanning.load(Ordering::SeqCst)
    }
}

fn refused(peer: &PeerAddress, service: &ServiceRecord) -> io::Error {
    io::Error::new(
        io::ErrorKind::ConnectionRefused,
        format!("{} does not accept {}", peer, service.name),
    )
}

impl Transport for MemoryRadio {
    fn name(&self) -> &'static str {
        "memory"
    }

    fn radio_available(&self) -> BoxFuture<'_, bool> {
        let powered = self.is_powered();
        Box::pin(async move { powered })
    }

    fn listen<'a>(
        &'a self,
        service: &'a ServiceRecord,
    ) -> BoxFuture<'a, io::Result<Box<dyn Acceptor>>> {
        Box::pin(async move {
            let key = (self.local.address.clone(), service.uuid);
            let (tx, rx) = mpsc::channel(4);

            {
                let mut state = self.ether.state.lock();
                if state.listeners.contains_key(&key) {
                    return Err(io::Error::new(
                        io::ErrorKind::AddrInUse,
                        format!("{} already listening on {}", self.local, service.name),
                    ));
                }
                state.listeners.insert(key.clone(), tx);
            }

            info!("Memory endpoint open: {} on {}", service, self.local);
            Ok(Box::new(MemoryAcceptor {
                ether: self.ether.clone(),
                key,
                local: self.local.clone(),
                rx,
            }) as Box<dyn Acceptor>)
        })
    }

    fn connect<'a>(
        &'a self,
        peer: &'a PeerAddress,
        service: &'a ServiceRecord,
    ) -> BoxFuture<'a, io::Result<BoxedStream>> {
        Box::pin(async move {
            let listener = {
                let state = self.ether.state.lock();
                let target_powered = state
                    .radios
                    .get(&peer.address)
                    .map(|info| info.powered)
                    .unwrap_or(false);
                if !target_powered {
                    None
                } else {
                    state
                        .listeners
                        .get(&(peer.address.clone(), service.uuid))
                        .cloned()
                }
            };
            let listener = listener.ok_or_else(|| refused(peer, service))?;

            let (local_end, remote_end) = tokio::io::duplex(STREAM_BUFFER);
            let (accepted_tx, accepted_rx) = oneshot::channel();

            listener
                .send(PendingConnection {
                    stream: remote_end,
                    from: self.local.clone(),
                    accepted: accepted_tx,
                })
                .await
                .map_err(|_| refused(peer, service))?;

            // Blocks until the remote side accepts, like an RFCOMM connect.
            accepted_rx.await.map_err(|_| refused(peer, service))?;

            debug!("Memory stream {} -> {}", self.local, peer);
            Ok(Box::new(local_end) as BoxedStream)
        })
    }
}

impl Discovery for MemoryRadio {
    fn start_scan(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.is_powered() {
                return Err(Error::RadioUnavailable);
            }
            self.scanning.store(true, Ordering::SeqCst);

            let visible: Vec<PeerAddress> = self
                .ether
                .state
                .lock()
                .radios
                .iter()
                .filter(|(address, info)| info.powered && **address != self.local.address)
                .map(|(address, info)| PeerAddress::new(address.clone()).with_name(info.name.clone()))
                .collect();

            for peer in visible {
                self.peers.insert(peer);
            }
            Ok(())
        })
    }

    fn stop_scan(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            if self.scanning.swap(false, Ordering::SeqCst) {
                debug!("Memory scan stopped on {}", self.local);
            }
        })
    }

    fn discovered_peers(&self) -> HashSet<PeerAddress> {
        self.peers.snapshot()
    }

    fn subscribe(&self) -> watch::Receiver<HashSet<PeerAddress>> {
        self.peers.subscribe()
    }
}

/// Listening endpoint on the ether.
struct MemoryAcceptor {
    ether: MemoryEther,
    key: (String, Uuid),
    local: PeerAddress,
    rx: mpsc::Receiver<PendingConnection>,
}

impl Acceptor for MemoryAcceptor {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(BoxedStream, PeerAddress)>> {
        Box::pin(async move {
            loop {
                let pending = self.rx.recv().await.ok_or_else(|| {
                    io::Error::new(io::ErrorKind::BrokenPipe, "memory endpoint closed")
                })?;

                // Dialer may have given up while queued.
                if pending.accepted.send(()).is_ok() {
                    return Ok((Box::new(pending.stream) as BoxedStream, pending.from));
                }
            }
        })
    }

    fn local_address(&self) -> Option<PeerAddress> {
        Some(self.local.clone())
    }
}

impl Drop for MemoryAcceptor {
    fn drop(&mut self) {
        self.ether.state.lock().listeners.remove(&self.key);
        debug!("Memory endpoint released on {}", self.local);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    #[tokio::test]
    async fn test_listen_and_connect() {
        let ether = MemoryEther::new();
        let server = ether.radio("00:00:00:00:00:01", "server");
        let client = ether.radio("00:00:00:00:00:02", "client");
        let service = ServiceRecord::default();

        let mut acceptor = server.listen(&service).await.unwrap();
        let server_address = server.address();
        let (accepted, dialed) = tokio::join!(
            acceptor.accept(),
            client.connect(&server_address, &service)
        );
        let (mut inbound, from) = accepted.unwrap();
        let mut outbound = dialed.unwrap();
        assert_eq!(from.address, "00:00:00:00:00:02");

        outbound.write_all(b"hi").await.unwrap();
        let mut buf = [0u8; 2];
        inbound.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hi");
    }

    #[tokio::test]
    async fn test_connect_without_listener_is_refused() {
        let ether = MemoryEther::new();
        let server = ether.radio("00:00:00:00:00:01", "server");
        let client = ether.radio("00:00:00:00:00:02", "client");

        let err = client
            .connect(&server.address(), &ServiceRecord::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::ConnectionRefused);
    }

    #[tokio::test]
    async fn test_dropping_acceptor_releases_endpoint() {
        let ether = MemoryEther::new();
        let server = ether.radio("00:00:00:00:00:01", "server");
        let service = ServiceRecord::default();

        let acceptor = server.listen(&service).await.unwrap();
        assert_eq!(
            server.listen(&service).await.err().unwrap().kind(),
            io::ErrorKind::AddrInUse
        );
        drop(acceptor);
        assert!(server.listen(&service).await.is_ok());
    }

    #[tokio::test]
    async fn test_scan_sees_powered_radios() {
        let ether = MemoryEther::new();
        let me = ether.radio("00:00:00:00:00:01", "me");
        let _other = ether.radio("00:00:00:00:00:02", "other");
        let off = ether.radio("00:00:00:00:00:03", "off");
        off.set_powered(false);

        me.start_scan().await.unwrap();
        assert!(me.is_scanning());
        let peers = me.discovered_peers();
        assert_eq!(peers.len(), 1);
        assert!(peers.contains(&PeerAddress::new("00:00:00:00:00:02").with_name("other")));

        me.stop_scan().await;
        assert!(!me.is_scanning());
    }
}
