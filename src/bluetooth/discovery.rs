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

//! Nearby peer discovery.

use futures::future::{self, BoxFuture};
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info};

use super::authorization::{Authorizer, Permission};
use super::service::PeerAddress;
use crate::error::{Error, Result};

/// Default length of a scan window.
pub const DEFAULT_SCAN_DURATION: Duration = Duration::from_millis(8000);

/// Collaborator that finds peers advertising over the radio.
pub trait Discovery: Send + Sync {
    /// Begin scanning. Peers found are added to [`Discovery::discovered_peers`].
    fn start_scan(&self) -> BoxFuture<'_, Result<()>>;

    /// Stop scanning. No-op when no scan is running.
    fn stop_scan(&self) -> BoxFuture<'_, ()>;

    /// Peers seen so far.
    fn discovered_peers(&self) -> HashSet<PeerAddress>;

    /// Watch the discovered set grow.
    fn subscribe(&self) -> watch::Receiver<HashSet<PeerAddress>>;

    /// Peers already bonded with the local radio.
    fn paired_peers(&self) -> BoxFuture<'_, Result<Vec<PeerAddress>>> {
        Box::pin(future::ready(Ok(Vec::new())))
    }
}

/// Set of discovered peers that only grows.
#[derive(Debug, Clone)]
pub struct PeerRegistry {
    tx: Arc<watch::Sender<HashSet<PeerAddress>>>,
}

impl PeerRegistry {
    pub fn new() -> Self {
        let (tx, _) = watch::channel(HashSet::new());
        Self { tx: Arc::new(tx) }
    }

    /// Record a peer; returns `true` if it was not known yet.
    pub fn insert(&self, peer: PeerAddress) -> bool {
        self.tx.send_if_modified(|peers| {
            let added = peers.insert(peer.clone());
            if added {
                debug!("Discovered peer: {}", peer);
            }
            added
        })
    }

    pub fn snapshot(&self) -> HashSet<PeerAddress> {
        self.tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<HashSet<PeerAddress>> {
        self.tx.subscribe()
    }
}

impl Default for PeerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Scan for `duration` and return what was found.
pub async fn scan_for(
    discovery: &dyn Discovery,
    authorizer: &dyn Authorizer,
    duration: Duration,
) -> Result<HashSet<PeerAddress>> {
    if !authorizer.is_granted(Permission::Scan) {
        return Err(Error::PermissionDenied);
    }

    info!("Scanning for peers ({} ms)...", duration.as_millis());
    discovery.start_scan().await?;
    tokio::time::sleep(duration).await;
    discovery.stop_scan().await;

    let peers = discovery.discovered_peers();
    info!("Scan finished, {} peer(s) found", peers.len());
    Ok(peers)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_grows_monotonically() {
        let registry = PeerRegistry::new();
        let mut rx = registry.subscribe();

        assert!(registry.insert(PeerAddress::new("AA")));
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        assert!(!registry.insert(PeerAddress::new("AA")));
        assert!(!rx.has_changed().unwrap());

        assert!(registry.insert(PeerAddress::new("BB")));
        assert_eq!(registry.snapshot().len(), 2);
    }
}
