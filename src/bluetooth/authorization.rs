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

//! Radio authorization.

use futures::future::{self, BoxFuture};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use tracing::info;

/// Permissions touching the radio.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Permission {
    Connect,
    Scan,
    Advertise,
}

impl Permission {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Connect => "BLUETOOTH_CONNECT",
            Self::Scan => "BLUETOOTH_SCAN",
            Self::Advertise => "BLUETOOTH_ADVERTISE",
        }
    }
}

/// Every permission needed to listen, dial and scan.
pub const REQUIRED_PERMISSIONS: [Permission; 3] =
    [Permission::Connect, Permission::Scan, Permission::Advertise];

/// Outcome of a permission request, per permission.
pub type PermissionGrants = HashMap<Permission, bool>;

/// Source of truth for whether the caller may use the radio.
pub trait Authorizer: Send + Sync {
    /// Whether `permission` is currently granted.
    fn is_granted(&self, permission: Permission) -> bool;

    /// Ask the user for the required permissions.
    fn request_permissions(&self) -> BoxFuture<'_, PermissionGrants>;

    /// Whether every permission in [`REQUIRED_PERMISSIONS`] is granted.
    fn has_required_permissions(&self) -> bool {
        REQUIRED_PERMISSIONS.iter().all(|p| self.is_granted(*p))
    }
}

/// Authorizer backed by a fixed grant set.
///
/// On Linux, BlueZ access is governed by D-Bus policy rather than runtime
/// prompts, so the binary uses [`StaticAuthorizer::granted`].
#[derive(Debug)]
pub struct StaticAuthorizer {
    granted: RwLock<HashSet<Permission>>,
    grant_on_request: bool,
}

impl StaticAuthorizer {
    /// Everything granted up front.
    pub fn granted() -> Self {
        Self {
            granted: RwLock::new(REQUIRED_PERMISSIONS.into_iter().collect()),
            grant_on_request: true,
        }
    }

    /// Nothing granted; `grant_on_request` decides what a request yields.
    pub fn denied(grant_on_request: bool) -> Self {
        Self {
            granted: RwLock::new(HashSet::new()),
            grant_on_request,
        }
    }

    pub fn grant(&self, permission: Permission) {
        self.granted.write().insert(permission);
    }

    pub fn revoke(&self, permission: Permission) {
        self.granted.write().remove(&permission);
    }
}

impl Authorizer for StaticAuthorizer {
    fn is_granted(&self, permission: Permission) -> bool {
        self.granted.read().contains(&permission)
    }

    fn request_permissions(&self) -> BoxFuture<'_, PermissionGrants> {
        if self.grant_on_request {
            self.granted.write().extend(REQUIRED_PERMISSIONS);
        }
        let granted = self.granted.read();
        let grants: PermissionGrants = REQUIRED_PERMISSIONS
            .iter()
            .map(|p| (*p, granted.contains(p)))
            .collect();
        info!(
            "Permission request resolved: {}/{} granted",
            grants.values().filter(|g| **g).count(),
            grants.len()
        );
        Box::pin(future::ready(grants))
    }
}
