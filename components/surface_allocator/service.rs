/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::atomic::{AtomicU64, Ordering};
use std::thread;

use ipc_channel::ipc::{self, IpcReceiver, IpcSender};
use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use surface_allocator_traits::{
    ConsumerKind, SurfaceAllocatorMsg, SurfaceAllocatorSender, SurfaceDescriptor, SurfaceHandle,
    SyncConfig,
};

/// Handles are unique for the lifetime of the process that hosts the service, even
/// across service restarts, so a client can never confuse a new surface with one it
/// lost in a previous connection.
static NEXT_SURFACE_HANDLE: AtomicU64 = AtomicU64::new(1);

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct AllocatorServiceConfig {
    /// Whether the service runs in the same process as its clients.
    pub in_process: bool,
    /// Requests beyond this many live surfaces are denied.
    pub max_surfaces: usize,
}

impl Default for AllocatorServiceConfig {
    fn default() -> Self {
        AllocatorServiceConfig {
            in_process: false,
            max_surfaces: 64,
        }
    }
}

struct RemoteSurface {
    consumer_kind: ConsumerKind,
    single_buffer_mode: bool,
    sync_config: Option<SyncConfig>,
}

/// The remote end of the surface allocator. It owns the producer side of every
/// surface it hands out and keeps the death links of its clients alive until it
/// exits, which is how clients learn that it went away.
pub struct SurfaceAllocatorService {
    port: IpcReceiver<SurfaceAllocatorMsg>,
    config: AllocatorServiceConfig,
    surfaces: FxHashMap<SurfaceHandle, RemoteSurface>,
    death_links: Vec<IpcSender<()>>,
}

impl SurfaceAllocatorService {
    pub fn spawn(config: AllocatorServiceConfig) -> SurfaceAllocatorSender {
        let (sender, receiver) = ipc::channel().expect("Failed to create IPC channel");
        thread::Builder::new()
            .name("SurfaceAllocatorService".to_owned())
            .spawn(move || {
                SurfaceAllocatorService {
                    port: receiver,
                    config,
                    surfaces: FxHashMap::default(),
                    death_links: Vec::new(),
                }
                .run();
            })
            .expect("Thread spawning failed");
        SurfaceAllocatorSender(sender)
    }

    fn run(&mut self) {
        loop {
            let msg = match self.port.recv() {
                Ok(msg) => msg,
                Err(error) => {
                    debug!("Surface allocator service lost all clients ({error:?})");
                    break;
                },
            };

            match msg {
                SurfaceAllocatorMsg::AcquireSurfaceTexture {
                    width,
                    height,
                    single_buffer_mode,
                    sender,
                } => {
                    let descriptor = self.acquire(
                        ConsumerKind::SurfaceTexture,
                        width,
                        height,
                        single_buffer_mode,
                    );
                    self.reply_with_surface(&sender, descriptor);
                },
                SurfaceAllocatorMsg::AcquireImageReader(descriptor, sender) => {
                    let descriptor = self.acquire(
                        ConsumerKind::ImageReader,
                        descriptor.width,
                        descriptor.height,
                        false,
                    );
                    self.reply_with_surface(&sender, descriptor);
                },
                SurfaceAllocatorMsg::ReleaseSurfaceTexture(handle) => {
                    self.release(handle, ConsumerKind::SurfaceTexture);
                },
                SurfaceAllocatorMsg::ReleaseImageReader(handle) => {
                    self.release(handle, ConsumerKind::ImageReader);
                },
                SurfaceAllocatorMsg::ConfigureSync(config, sender) => {
                    self.configure_sync(config);
                    reply(&sender, ());
                },
                SurfaceAllocatorMsg::Sync(handle) => self.sync(handle),
                SurfaceAllocatorMsg::LinkToDeath(sender) => self.death_links.push(sender),
                SurfaceAllocatorMsg::LiveSurfaceCount(sender) => {
                    reply(&sender, self.surfaces.len());
                },
                SurfaceAllocatorMsg::Exit(sender) => {
                    self.surfaces.clear();
                    self.death_links.clear();
                    reply(&sender, ());
                    break;
                },
            }
        }
    }

    fn acquire(
        &mut self,
        consumer_kind: ConsumerKind,
        width: u32,
        height: u32,
        single_buffer_mode: bool,
    ) -> Option<SurfaceDescriptor> {
        if width == 0 || height == 0 {
            warn!("Refusing {consumer_kind:?} surface of size {width}x{height}");
            return None;
        }
        if self.surfaces.len() >= self.config.max_surfaces {
            warn!(
                "Refusing {consumer_kind:?} surface, {} surfaces are live",
                self.surfaces.len()
            );
            return None;
        }

        let handle = SurfaceHandle(NEXT_SURFACE_HANDLE.fetch_add(1, Ordering::Relaxed));
        self.surfaces.insert(
            handle,
            RemoteSurface {
                consumer_kind,
                single_buffer_mode,
                sync_config: None,
            },
        );
        debug!("Allocated {consumer_kind:?} surface {handle} ({width}x{height})");
        Some(SurfaceDescriptor {
            handle,
            width,
            height,
            in_process: self.config.in_process,
        })
    }

    /// A surface whose descriptor never reaches the client, typically because it gave
    /// up waiting, would stay allocated forever, so it is released right away.
    fn reply_with_surface(
        &mut self,
        sender: &IpcSender<Option<SurfaceDescriptor>>,
        descriptor: Option<SurfaceDescriptor>,
    ) {
        if !reply(sender, descriptor) {
            if let Some(descriptor) = descriptor {
                debug!("Dropping undelivered surface {}", descriptor.handle);
                self.surfaces.remove(&descriptor.handle);
            }
        }
    }

    fn release(&mut self, handle: SurfaceHandle, consumer_kind: ConsumerKind) {
        match self.surfaces.get(&handle) {
            Some(surface) if surface.consumer_kind == consumer_kind => {
                self.surfaces.remove(&handle);
            },
            Some(surface) => warn!(
                "Release of {consumer_kind:?} surface {handle} which is a {:?}",
                surface.consumer_kind
            ),
            None => warn!("Release of unknown surface {handle}"),
        }
    }

    fn configure_sync(&mut self, config: SyncConfig) {
        match self.surfaces.get_mut(&config.source_handle) {
            Some(surface) if surface.consumer_kind == ConsumerKind::SurfaceTexture => {
                surface.sync_config = Some(config);
            },
            _ => warn!(
                "Cannot configure sync for surface {}",
                config.source_handle
            ),
        }
    }

    fn sync(&self, handle: SurfaceHandle) {
        match self.surfaces.get(&handle) {
            Some(RemoteSurface {
                sync_config: Some(config),
                single_buffer_mode,
                ..
            }) => debug!(
                "Syncing surface {handle} into {} (single buffer: {single_buffer_mode})",
                config.target_id
            ),
            Some(_) => debug!("Surface {handle} has no sync target"),
            None => warn!("Sync of unknown surface {handle}"),
        }
    }
}

/// Returns whether the reply reached the client.
fn reply<T: Serialize>(sender: &IpcSender<T>, value: T) -> bool {
    match sender.send(value) {
        Ok(()) => true,
        Err(error) => {
            debug!("Surface allocator client stopped listening for a reply ({error:?})");
            false
        },
    }
}
