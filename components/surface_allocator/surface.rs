/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::OnceLock;
use std::sync::atomic::{AtomicBool, Ordering};

use euclid::default::Size2D;
use surface_allocator_traits::{ConsumerKind, SurfaceDescriptor, SurfaceHandle, SyncConfig};

/// The local shadow of a surface allocated by the remote allocator.
///
/// A surface starts out valid and becomes invalid exactly once: when it is disposed,
/// when its acquisition is rolled back, or when the connection to the allocator dies.
/// An invalid surface no longer refers to anything on the remote side, so renderers
/// must check [`Surface::is_valid`] before every frame and acquire a replacement once
/// it returns `false`.
#[derive(Debug)]
pub struct Surface {
    handle: SurfaceHandle,
    size: Size2D<u32>,
    consumer_kind: ConsumerKind,
    in_process: bool,
    valid: AtomicBool,
    sync_config: OnceLock<SyncConfig>,
}

impl Surface {
    pub(crate) fn new(descriptor: SurfaceDescriptor, consumer_kind: ConsumerKind) -> Surface {
        Surface {
            handle: descriptor.handle,
            size: Size2D::new(descriptor.width, descriptor.height),
            consumer_kind,
            in_process: descriptor.in_process,
            valid: AtomicBool::new(true),
            sync_config: OnceLock::new(),
        }
    }

    pub fn handle(&self) -> SurfaceHandle {
        self.handle
    }

    pub fn size(&self) -> Size2D<u32> {
        self.size
    }

    pub fn consumer_kind(&self) -> ConsumerKind {
        self.consumer_kind
    }

    /// Whether the remote surface lives in this process.
    pub fn is_in_process(&self) -> bool {
        self.in_process
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    pub fn sync_config(&self) -> Option<&SyncConfig> {
        self.sync_config.get()
    }

    pub(crate) fn descriptor(&self) -> SurfaceDescriptor {
        SurfaceDescriptor {
            handle: self.handle,
            width: self.size.width,
            height: self.size.height,
            in_process: self.in_process,
        }
    }

    pub(crate) fn set_sync_config(&self, config: SyncConfig) {
        if self.sync_config.set(config).is_err() {
            log::warn!("Sync config of surface {} was already set", self.handle);
        }
    }

    /// Mark the surface invalid. Returns `true` for the one call that performed the
    /// transition.
    pub(crate) fn invalidate(&self) -> bool {
        self.valid.swap(false, Ordering::AcqRel)
    }
}
