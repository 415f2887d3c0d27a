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

//! Stream transport abstraction.
//!
//! A transport knows how to open a passive endpoint for a service record and
//! how to dial a peer that offers it. The connection manager only sees the
//! resulting duplex byte stream.

use futures::future::BoxFuture;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

use super::service::{PeerAddress, ServiceRecord};

/// Reliable, ordered, bidirectional byte stream.
pub trait AsyncStream: AsyncRead + AsyncWrite + Send + Unpin {}

impl<T: AsyncRead + AsyncWrite + Send + Unpin> AsyncStream for T {}

/// Type-erased stream handed out by transports.
pub type BoxedStream = Box<dyn AsyncStream>;

/// Passive endpoint waiting for inbound connections.
///
/// Dropping the acceptor releases the endpoint.
pub trait Acceptor: Send {
    /// Wait for the next inbound connection.
    fn accept(&mut self) -> BoxFuture<'_, io::Result<(BoxedStream, PeerAddress)>>;

    /// Address the endpoint is reachable on, when the transport knows it.
    fn local_address(&self) -> Option<PeerAddress> {
        None
    }
}

/// Radio or network stack able to carry RFCOMM-style streams.
pub trait Transport: Send + Sync {
    /// Short name for logs.
    fn name(&self) -> &'static str;

    /// Whether the local radio is powered and usable.
    fn radio_available(&self) -> BoxFuture<'_, bool>;

    /// Open a passive endpoint bound to `service`.
    fn listen<'a>(
        &'a self,
        service: &'a ServiceRecord,
    ) -> BoxFuture<'a, io::Result<Box<dyn Acceptor>>>;

    /// Open an outbound stream to `peer`'s instance of `service`.
    fn connect<'a>(
        &'a self,
        peer: &'a PeerAddress,
        service: &'a ServiceRecord,
    ) -> BoxFuture<'a, io::Result<BoxedStream>>;
}
