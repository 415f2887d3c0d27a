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

//! Bluetooth RFCOMM transport on BlueZ.
//!
//! Both roles register an RFCOMM profile for the service UUID. The listener
//! registers as server, which publishes an SDP record peers can look up; the
//! dialer registers as client and asks BlueZ to connect the profile on the
//! target device.

use bluer::rfcomm::{Profile, ProfileHandle, ReqError, Role, Stream};
use bluer::{Adapter, AdapterEvent, Address, Session};
use futures::future::BoxFuture;
use futures::{pin_mut, StreamExt};
use parking_lot::Mutex;
use pin_project_lite::pin_project;
use std::collections::HashSet;
use std::io;
use std::pin::Pin;
use std::str::FromStr;
use std::task::{Context, Poll};
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::discovery::{Discovery, PeerRegistry};
use super::service::{PeerAddress, ServiceRecord};
use super::transport::{Acceptor, BoxedStream, Transport};
use crate::error::{Error, Result};

/// BlueZ-backed transport and discovery for the default adapter.
pub struct RfcommTransport {
    session: Session,
    adapter: Adapter,
    peers: PeerRegistry,
    scan: Mutex<Option<JoinHandle<()>>>,
}

impl RfcommTransport {
    /// Connect to BlueZ and pick the default adapter.
    pub async fn new() -> bluer::Result<Self> {
        info!("Initializing Bluetooth transport...");

        let session = Session::new().await?;
        info!("BlueZ session created");

        let adapter = session.default_adapter().await?;
        info!("Using Bluetooth adapter: {}", adapter.name());

        Ok(Self {
            session,
            adapter,
            peers: PeerRegistry::new(),
            scan: Mutex::new(None),
        })
    }

    /// Set the name other devices see.
    pub async fn set_name(&self, name: &str) -> bluer::Result<()> {
        self.adapter.set_alias(name.to_string()).await?;
        info!("Bluetooth name set to: {}", name);
        Ok(())
    }

    /// Power the adapter and make it discoverable.
    pub async fn make_discoverable(&self) -> bluer::Result<()> {
        if !self.adapter.is_powered().await? {
            info!("Powering on Bluetooth adapter...");
            self.adapter.set_powered(true).await?;
        }
        self.adapter.set_discoverable(true).await?;
        self.adapter.set_pairable(true).await?;
        info!("Adapter is discoverable and pairable");
        Ok(())
    }

    pub async fn address(&self) -> bluer::Result<Address> {
        self.adapter.address().await
    }

    async fn register(&self, service: &ServiceRecord, role: Role) -> io::Result<ProfileHandle> {
        let profile = Profile {
            uuid: service.uuid,
            name: Some(service.name.clone()),
            role: Some(role),
            require_authentication: Some(false),
            require_authorization: Some(false),
            auto_connect: Some(false),
            ..Default::default()
        };
        debug!("Registering RFCOMM profile {:?} for {}", role, service);
        self.session
            .register_profile(profile)
            .await
            .map_err(io::Error::other)
    }
}

fn parse_address(peer: &PeerAddress) -> io::Result<Address> {
    Address::from_str(&peer.address).map_err(|e| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("Invalid Bluetooth address '{}': {}", peer.address, e),
        )
    })
}

fn profile_closed() -> io::Error {
    io::Error::new(io::ErrorKind::BrokenPipe, "Profile handle closed")
}

impl Transport for RfcommTransport {
    fn name(&self) -> &'static str {
        "rfcomm"
    }

    fn radio_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async move { self.adapter.is_powered().await.unwrap_or(false) })
    }

    fn listen<'a>(
        &'a self,
        service: &'a ServiceRecord,
    ) -> BoxFuture<'a, io::Result<Box<dyn Acceptor>>> {
        Box::pin(async move {
            let handle = self.register(service, Role::Server).await?;
            info!("RFCOMM service registered: {}", service);
            Ok(Box::new(RfcommAcceptor { handle }) as Box<dyn Acceptor>)
        })
    }

    fn connect<'a>(
        &'a self,
        peer: &'a PeerAddress,
        service: &'a ServiceRecord,
    ) -> BoxFuture<'a, io::Result<BoxedStream>> {
        Box::pin(async move {
            let addr = parse_address(peer)?;
            let device = self.adapter.device(addr).map_err(io::Error::other)?;
            let mut handle = self.register(service, Role::Client).await?;

            let connect = device.connect_profile(&service.uuid);
            pin_mut!(connect);
            let mut requested = false;

            // BlueZ hands the stream back through the profile handle.
            let request = loop {
                tokio::select! {
                    res = &mut connect, if !requested => {
                        res.map_err(io::Error::other)?;
                        requested = true;
                    }
                    req = handle.next() => {
                        let req = req.ok_or_else(profile_closed)?;
                        if req.device() == addr {
                            break req;
                        }
                        debug!("Rejecting unexpected connection from {}", req.device());
                        req.reject(ReqError::Rejected);
                    }
                }
            };

            let stream = request.accept().map_err(io::Error::other)?;
            info!("RFCOMM stream open to {}", addr);
            Ok(Box::new(ProfileStream {
                stream,
                _profile: handle,
            }) as BoxedStream)
        })
    }
}

impl Discovery for RfcommTransport {
    fn start_scan(&self) -> BoxFuture<'_, Result<()>> {
        Box::pin(async move {
            if !self.adapter.is_powered().await.unwrap_or(false) {
                return Err(Error::RadioUnavailable);
            }

            let events = self
                .adapter
                .discover_devices()
                .await
                .map_err(io::Error::other)?;
            let adapter = self.adapter.clone();
            let peers = self.peers.clone();

            let task = tokio::spawn(async move {
                pin_mut!(events);
                while let Some(event) = events.next().await {
                    if let AdapterEvent::DeviceAdded(addr) = event {
                        let name = match adapter.device(addr) {
                            Ok(device) => device.alias().await.ok(),
                            Err(_) => None,
                        };
                        let mut peer = PeerAddress::new(addr.to_string());
                        peer.name = name;
                        peers.insert(peer);
                    }
                }
            });

            if let Some(previous) = self.scan.lock().replace(task) {
                previous.abort();
            }
            info!("Bluetooth discovery started");
            Ok(())
        })
    }

    fn stop_scan(&self) -> BoxFuture<'_, ()> {
        Box::pin(async move {
            // Dropping the event stream ends discovery on the adapter.
            if let Some(task) = self.scan.lock().take() {
                task.abort();
                info!("Bluetooth discovery stopped");
            }
        })
    }

    fn discovered_peers(&self) -> HashSet<PeerAddress> {
        self.peers.snapshot()
    }

    fn subscribe(&self) -> watch::Receiver<HashSet<PeerAddress>> {
        self.peers.subscribe()
    }

    fn paired_peers(&self) -> BoxFuture<'_, Result<Vec<PeerAddress>>> {
        Box::pin(async move {
            let mut peers = Vec::new();
            let addresses = self
                .adapter
                .device_addresses()
                .await
                .map_err(io::Error::other)?;

            for addr in addresses {
                let device = self.adapter.device(addr).map_err(io::Error::other)?;
                if device.is_paired().await.unwrap_or(false) {
                    let name = device.alias().await.unwrap_or_else(|_| addr.to_string());
                    peers.push(PeerAddress::new(addr.to_string()).with_name(name));
                }
            }

            Ok(peers)
        })
    }
}

struct RfcommAcceptor {
    handle: ProfileHandle,
}

impl Acceptor for RfcommAcceptor {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(BoxedStream, PeerAddress)>> {
        Box::pin(async move {
            let req = self.handle.next().await.ok_or_else(profile_closed)?;
            let device = req.device();
            info!("Connection request from device: {}", device);

            let stream = req.accept().map_err(|e| {
                warn!("Failed to accept RFCOMM connection: {}", e);
                io::Error::other(e)
            })?;
            Ok((
                Box::new(stream) as BoxedStream,
                PeerAddress::new(device.to_string()),
            ))
        })
    }
}

pin_project! {
    /// Client stream that keeps its profile registered while open.
    struct ProfileStream {
        #[pin]
        stream: Stream,
        _profile: ProfileHandle,
    }
}

impl AsyncRead for ProfileStream {
    fn poll_read(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        self.project().stream.poll_read(cx, buf)
    }
}

impl AsyncWrite for ProfileStream {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.project().stream.poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().stream.poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        self.project().stream.poll_shutdown(cx)
    }
}
