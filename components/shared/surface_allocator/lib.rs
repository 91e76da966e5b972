/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! Types shared between the client side of the surface allocator and the remote
//! allocator service, together with the interfaces of the collaborators that the
//! allocator consumes: the process manager that locates the service, the platform
//! that owns local sync primitives, and the remote RPC surface itself.

mod death;
mod proxy;
mod remote;

use std::fmt;

use serde::{Deserialize, Serialize};

pub use crate::death::{DeathLink, DeathRecipient};
pub use crate::proxy::{SurfaceAllocatorMsg, SurfaceAllocatorProxy, SurfaceAllocatorSender};
pub use crate::remote::{
    AllocatorLocator, RemoteSurfaceAllocator, SurfacePlatform, TransportError,
};

/// An opaque identifier correlating a client-side `Surface` with the surface that
/// the remote allocator keeps on its side of the process boundary. Handles are never
/// reused, not even across reconnections to a restarted service.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, Ord, PartialEq, PartialOrd, Serialize)]
pub struct SurfaceHandle(pub u64);

impl fmt::Display for SurfaceHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// How the buffers produced into a surface are consumed on the remote side. This
/// decides which release call applies to the surface.
#[derive(Clone, Copy, Debug, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum ConsumerKind {
    SurfaceTexture,
    ImageReader,
}

/// The remote allocator's answer to a successful acquisition.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SurfaceDescriptor {
    pub handle: SurfaceHandle,
    pub width: u32,
    pub height: u32,
    /// Whether the remote surface lives in the same process as the requester. Only
    /// surfaces living in another process need a sync configuration.
    pub in_process: bool,
}

/// Parameters of an image-reader backed surface.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct ImageReaderDescriptor {
    pub width: u32,
    pub height: u32,
    pub format: i32,
    pub max_images: u32,
    pub usage: u64,
}

/// Parameters that allow the remote side to copy the buffers of an out-of-process
/// surface into a sync surface owned by the requesting process.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct SyncConfig {
    /// The remote surface whose buffers are synchronized.
    pub source_handle: SurfaceHandle,
    /// The platform identifier of the local sync surface.
    pub target_id: u64,
    pub width: u32,
    pub height: u32,
}

/// Whether the current process is the privileged parent process or one of its
/// children. The two discover the allocator service differently.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub enum ProcessRole {
    Parent,
    Child,
}
