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

//! TCP stand-in for RFCOMM.
//!
//! Peers are addressed as `host:port`. There is no service directory over
//! TCP, so the service record only shows up in logs.

use futures::future::BoxFuture;
use std::io;
use std::net::SocketAddr;
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, info};

use super::service::{PeerAddress, ServiceRecord};
use super::transport::{Acceptor, BoxedStream, Transport};

/// Transport over plain TCP sockets.
#[derive(Debug, Clone)]
pub struct TcpTransport {
    bind: SocketAddr,
}

impl TcpTransport {
    /// `bind` is where [`Transport::listen`] opens its socket.
    pub fn new(bind: SocketAddr) -> Self {
        Self { bind }
    }
}

impl Transport for TcpTransport {
    fn name(&self) -> &'static str {
        "tcp"
    }

    fn radio_available(&self) -> BoxFuture<'_, bool> {
        Box::pin(async { true })
    }

    fn listen<'a>(
        &'a self,
        service: &'a ServiceRecord,
    ) -> BoxFuture<'a, io::Result<Box<dyn Acceptor>>> {
        Box::pin(async move {
            let listener = TcpListener::bind(self.bind).await?;
            let local_addr = listener.local_addr()?;
            info!("TCP endpoint for {} listening on {}", service, local_addr);
            Ok(Box::new(TcpAcceptor {
                listener,
                local_addr,
            }) as Box<dyn Acceptor>)
        })
    }

    fn connect<'a>(
        &'a self,
        peer: &'a PeerAddress,
        service: &'a ServiceRecord,
    ) -> BoxFuture<'a, io::Result<BoxedStream>> {
        Box::pin(async move {
            let addr: SocketAddr = peer.address.parse().map_err(|e| {
                io::Error::new(
                    io::ErrorKind::InvalidInput,
                    format!("Invalid TCP address '{}': {}", peer.address, e),
                )
            })?;

            debug!("Connecting to {} for {}", addr, service.name);
            let stream = TcpStream::connect(addr).await?;
            stream.set_nodelay(true)?;
            Ok(Box::new(stream) as BoxedStream)
        })
    }
}

struct TcpAcceptor {
    listener: TcpListener,
    local_addr: SocketAddr,
}

impl Acceptor for TcpAcceptor {
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(BoxedStream, PeerAddress)>> {
        Box::pin(async move {
            let (stream, remote) = self.listener.accept().await?;
            stream.set_nodelay(true)?;
            Ok((
                Box::new(stream) as BoxedStream,
                PeerAddress::new(remote.to_string()),
            ))
        })
    }

    fn local_address(&self) -> Option<PeerAddress> {
        Some(PeerAddress::new(self.local_addr.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_invalid_address() {
        let transport = TcpTransport::new("127.0.0.1:0".parse().unwrap());
        let err = transport
            .connect(&PeerAddress::new("AA:BB:CC:DD:EE:FF"), &ServiceRecord::default())
            .await
            .err()
            .unwrap();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[tokio::test]
    async fn test_ephemeral_port_reported() {
        let transport = TcpTransport::new("127.0.0.1:0".parse().unwrap());
        let acceptor = transport.listen(&ServiceRecord::default()).await.unwrap();
        let addr = acceptor.local_address().unwrap();
        assert!(addr.address.starts_with("127.0.0.1:"));
        assert!(!addr.address.ends_with(":0"));
    }
}
