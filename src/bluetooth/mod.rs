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

//! Bluetooth connection layer.
//!
//! Owns the single stream to a remote peer and the collaborators needed to
//! get one: discovery, authorization and the transport itself.

mod authorization;
mod connection;
mod discovery;
mod memory;
#[cfg(feature = "bluez")]
mod rfcomm;
mod service;
mod tcp;
mod transport;

pub use authorization::{
    Authorizer, Permission, PermissionGrants, StaticAuthorizer, REQUIRED_PERMISSIONS,
};
pub use connection::{ConnectionManager, ConnectionRole, ConnectionState};
pub use discovery::{scan_for, Discovery, PeerRegistry, DEFAULT_SCAN_DURATION};
pub use memory::{MemoryEther, MemoryRadio};
#[cfg(feature = "bluez")]
pub use rfcomm::RfcommTransport;
pub use service::{name_uuid, PeerAddress, ServiceRecord, DEFAULT_SERVICE_NAME, READ_BUFFER_SIZE};
pub use tcp::TcpTransport;
pub use transport::{Acceptor, AsyncStream, BoxedStream, Transport};
