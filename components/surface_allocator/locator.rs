/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::time::Duration;

use parking_lot::Mutex;
use surface_allocator_traits::{
    AllocatorLocator, ProcessRole, RemoteSurfaceAllocator, SurfaceAllocatorSender, TransportError,
};

use crate::prefs::SurfaceAllocatorPrefs;

/// Locates the allocator service over `ipc-channel`.
///
/// The parent process learns about the service when it spawns it; a child process
/// receives the service channel from its parent during startup. Whoever learns about
/// a (new) service installs its channel here, and the next connection attempt of the
/// allocator picks it up.
pub struct IpcAllocatorLocator {
    role: ProcessRole,
    timeout: Duration,
    parent: Mutex<Option<SurfaceAllocatorSender>>,
    child: Mutex<Option<SurfaceAllocatorSender>>,
}

impl IpcAllocatorLocator {
    pub fn new(role: ProcessRole, prefs: &SurfaceAllocatorPrefs) -> IpcAllocatorLocator {
        IpcAllocatorLocator {
            role,
            timeout: prefs.rpc_timeout(),
            parent: Mutex::new(None),
            child: Mutex::new(None),
        }
    }

    /// Install the channel to the service spawned by the process manager.
    pub fn set_parent_sender(&self, sender: Option<SurfaceAllocatorSender>) {
        *self.parent.lock() = sender;
    }

    /// Install the channel handed to this child process by its parent.
    pub fn set_child_sender(&self, sender: Option<SurfaceAllocatorSender>) {
        *self.child.lock() = sender;
    }

    fn proxy_for(
        &self,
        sender: &Mutex<Option<SurfaceAllocatorSender>>,
    ) -> Option<Box<dyn RemoteSurfaceAllocator>> {
        let sender = sender.lock();
        let proxy = sender.as_ref()?.to_proxy(self.timeout);
        Some(Box::new(proxy))
    }
}

impl AllocatorLocator for IpcAllocatorLocator {
    fn process_role(&self) -> ProcessRole {
        self.role
    }

    fn parent_allocator(&self) -> Result<Option<Box<dyn RemoteSurfaceAllocator>>, TransportError> {
        Ok(self.proxy_for(&self.parent))
    }

    fn child_allocator(&self) -> Result<Option<Box<dyn RemoteSurfaceAllocator>>, TransportError> {
        Ok(self.proxy_for(&self.child))
    }
}
