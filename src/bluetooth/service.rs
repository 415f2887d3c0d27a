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

//! Service identity and peer addressing.

use md5::{Digest, Md5};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::{Builder, Uuid};

/// Service name both peers advertise and look up.
pub const DEFAULT_SERVICE_NAME: &str = "CoinCraze";

/// Size of the read buffer used for a single receive call.
pub const READ_BUFFER_SIZE: usize = 2048;

/// Derive a name-based UUID from raw name bytes.
///
/// Version 3 (MD5) with no namespace prefix, matching
/// `java.util.UUID.nameUUIDFromBytes` on Android peers.
pub fn name_uuid(name: &[u8]) -> Uuid {
    let digest: [u8; 16] = Md5::digest(name).into();
    Builder::from_md5_bytes(digest).into_uuid()
}

/// Well-known service identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ServiceRecord {
    pub name: String,
    pub uuid: Uuid,
}

impl ServiceRecord {
    /// Build a record whose UUID is derived from `name`.
    pub fn from_name(name: impl Into<String>) -> Self {
        let name = name.into();
        let uuid = name_uuid(name.as_bytes());
        Self { name, uuid }
    }
}

impl Default for ServiceRecord {
    fn default() -> Self {
        Self::from_name(DEFAULT_SERVICE_NAME)
    }
}

impl fmt::Display for ServiceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.name, self.uuid)
    }
}

/// Identifier of a remote endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PeerAddress {
    /// Hardware address (or host:port for the TCP transport).
    pub address: String,
    /// Display name, when the discovery layer knows one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl PeerAddress {
    pub fn new(address: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }
}

impl fmt::Display for PeerAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.name {
            Some(name) => write!(f, "{} ({})", name, self.address),
            None => f.write_str(&self.address),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_service_uuid() {
        // Same value Android computes for UUID.nameUUIDFromBytes("CoinCraze".toByteArray())
        let record = ServiceRecord::default();
        assert_eq!(record.name, "CoinCraze");
        assert_eq!(
            record.uuid.to_string(),
            "830fa924-e4b5-33f8-a123-c295e271c0db"
        );
        assert_eq!(record.uuid.get_version_num(), 3);
    }

    #[test]
    fn test_uuid_is_deterministic() {
        let a = ServiceRecord::from_name("rfchat-test");
        let b = ServiceRecord::from_name(String::from("rfchat-test"));
        assert_eq!(a, b);
        assert_eq!(a.uuid.to_string(), "6a9881c9-40f3-38d0-a550-2d91c02124de");
        assert_ne!(a.uuid, ServiceRecord::default().uuid);
    }

    #[test]
    fn test_peer_display() {
        let peer = PeerAddress::new("AA:BB:CC:DD:EE:FF");
        assert_eq!(peer.to_string(), "AA:BB:CC:DD:EE:FF");
        let named = peer.with_name("Pixel");
        assert_eq!(named.to_string(), "Pixel (AA:BB:CC:DD:EE:FF)");
    }
}
