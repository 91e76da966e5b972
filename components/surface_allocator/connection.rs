/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use log::{debug, warn};
use surface_allocator_traits::{
    AllocatorLocator, DeathLink, DeathRecipient, ProcessRole, RemoteSurfaceAllocator,
};

use crate::registry::{RegisteredSurface, SurfaceRegistry};

/// Identifies one established connection. A death notification carries the epoch of
/// the connection it was registered for, so that a late notification can never tear
/// down a newer connection.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct ConnectionEpoch(u64);

impl ConnectionEpoch {
    fn next(&mut self) {
        self.0 += 1;
    }
}

/// Builds the callback run when the connection of the given epoch dies.
pub(crate) type DeathCallbackFactory<'a> =
    &'a dyn Fn(ConnectionEpoch) -> Box<dyn FnOnce() + Send + 'static>;

struct LiveConnection {
    epoch: ConnectionEpoch,
    remote: Box<dyn RemoteSurfaceAllocator>,
    /// Dropping the link together with the channel unregisters the death observer.
    _death_link: DeathLink,
}

/// The channel to the remote allocator service. Holding a channel is what being
/// connected means; a dead channel is discarded, never repaired, and the next caller
/// establishes a fresh one.
pub(crate) struct RemoteAllocatorConnection {
    locator: Arc<dyn AllocatorLocator>,
    live: Option<LiveConnection>,
    next_epoch: ConnectionEpoch,
}

impl RemoteAllocatorConnection {
    pub(crate) fn new(locator: Arc<dyn AllocatorLocator>) -> RemoteAllocatorConnection {
        RemoteAllocatorConnection {
            locator,
            live: None,
            next_epoch: ConnectionEpoch(0),
        }
    }

    /// Return the current channel, establishing one first if needed. `None` means the
    /// service could not be reached this time; the next call tries again.
    pub(crate) fn ensure_connection(
        &mut self,
        on_death: DeathCallbackFactory,
    ) -> Option<&dyn RemoteSurfaceAllocator> {
        if self.live.is_none() {
            self.live = self.connect(on_death);
        }
        self.remote()
    }

    fn connect(&mut self, on_death: DeathCallbackFactory) -> Option<LiveConnection> {
        let role = self.locator.process_role();
        let lookup = match role {
            ProcessRole::Parent => self.locator.parent_allocator(),
            ProcessRole::Child => self.locator.child_allocator(),
        };
        let remote = match lookup {
            Ok(Some(remote)) => remote,
            Ok(None) => {
                warn!("Failed to connect to the remote surface allocator from {role:?} process");
                return None;
            },
            Err(error) => {
                warn!("Failed to connect to the remote surface allocator: {error}");
                return None;
            },
        };

        let epoch = self.next_epoch;
        self.next_epoch.next();
        let (recipient, death_link) = DeathRecipient::new(on_death(epoch));
        if let Err(error) = remote.link_to_death(recipient) {
            warn!("Failed to watch the remote surface allocator: {error}");
            return None;
        }

        debug!("Connected to the remote surface allocator ({epoch:?})");
        Some(LiveConnection {
            epoch,
            remote,
            _death_link: death_link,
        })
    }

    pub(crate) fn remote(&self) -> Option<&dyn RemoteSurfaceAllocator> {
        self.live.as_ref().map(|live| &*live.remote)
    }

    pub(crate) fn is_connected(&self) -> bool {
        self.live.is_some()
    }

    /// Tear down the connection of `epoch` after its remote end died: every registered
    /// surface is invalidated and the channel is dropped. Returns the entries this call
    /// tore down, including those whose surface was already dropped by its owner, or
    /// `None` if `epoch` is not the current connection.
    pub(crate) fn on_remote_died(
        &mut self,
        epoch: ConnectionEpoch,
        registry: &mut SurfaceRegistry,
    ) -> Option<Vec<RegisteredSurface>> {
        if self.live.as_ref().map(|live| live.epoch) != Some(epoch) {
            debug!("Ignoring death of stale surface allocator connection ({epoch:?})");
            return None;
        }

        warn!("Remote surface allocator died");
        let mut entries = registry.drain_all();
        entries.retain(|entry| entry.surface().is_none_or(|surface| surface.invalidate()));
        self.live = None;
        Some(entries)
    }
}
