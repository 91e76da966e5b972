/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::io;
use std::time::Duration;

use crate::{
    DeathRecipient, ImageReaderDescriptor, ProcessRole, SurfaceDescriptor, SurfaceHandle,
    SyncConfig,
};

/// A failed round trip to the remote allocator.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("the remote allocator is gone")]
    Disconnected,
    #[error("no reply from the remote allocator within {0:?}")]
    Timeout(Duration),
    #[error("could not send to the remote allocator: {0}")]
    Send(String),
    #[error("could not receive from the remote allocator: {0}")]
    Receive(String),
    #[error("could not create a reply channel")]
    ChannelCreation(#[from] io::Error),
}

/// The RPC surface of the remote allocator service. Acquisitions answer `Ok(None)`
/// when the service is up but refuses to hand out a surface, e.g. because it ran out
/// of buffers.
pub trait RemoteSurfaceAllocator: Send {
    fn acquire_surface_texture(
        &self,
        width: u32,
        height: u32,
        single_buffer_mode: bool,
    ) -> Result<Option<SurfaceDescriptor>, TransportError>;

    fn acquire_image_reader(
        &self,
        descriptor: ImageReaderDescriptor,
    ) -> Result<Option<SurfaceDescriptor>, TransportError>;

    fn release_surface_texture(&self, handle: SurfaceHandle) -> Result<(), TransportError>;

    fn release_image_reader(&self, handle: SurfaceHandle) -> Result<(), TransportError>;

    fn configure_sync(&self, config: SyncConfig) -> Result<(), TransportError>;

    fn sync(&self, upstream: SurfaceHandle) -> Result<(), TransportError>;

    /// Ask to be told when the remote end of this channel terminates. The recipient
    /// is notified from a transport thread, at most once.
    fn link_to_death(&self, recipient: DeathRecipient) -> Result<(), TransportError>;
}

/// The process-management layer: knows which role this process plays and how each
/// role reaches the allocator service. `Ok(None)` means the service is not
/// available right now.
pub trait AllocatorLocator: Send + Sync {
    fn process_role(&self) -> ProcessRole;

    fn parent_allocator(&self) -> Result<Option<Box<dyn RemoteSurfaceAllocator>>, TransportError>;

    fn child_allocator(&self) -> Result<Option<Box<dyn RemoteSurfaceAllocator>>, TransportError>;
}

/// The local graphics platform, as far as surface bookkeeping is concerned.
pub trait SurfacePlatform: Send + Sync {
    /// The platform API level, compared against the minimum level that supports
    /// converting image-reader buffers into windows.
    fn api_level(&self) -> u32;

    /// Create the local sync surface for an out-of-process surface.
    fn create_sync_surface(&self, source: &SurfaceDescriptor) -> Option<SyncConfig>;

    /// Release a sync surface previously returned by `create_sync_surface`.
    fn release_sync_surface(&self, config: &SyncConfig);
}
