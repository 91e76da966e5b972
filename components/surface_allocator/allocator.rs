/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::Mutex;
use surface_allocator_traits::{
    AllocatorLocator, ConsumerKind, ImageReaderDescriptor, RemoteSurfaceAllocator, SurfaceHandle,
    SurfacePlatform,
};

use crate::connection::{ConnectionEpoch, RemoteAllocatorConnection};
use crate::error::AllocatorError;
use crate::prefs::SurfaceAllocatorPrefs;
use crate::registry::SurfaceRegistry;
use crate::surface::Surface;

/// Everything guarded by the allocator lock. The connection and the registry change
/// together, so that a surface can never be registered against a connection that is
/// being torn down.
struct AllocatorState {
    connection: RemoteAllocatorConnection,
    registry: SurfaceRegistry,
}

struct AllocatorInner {
    state: Mutex<AllocatorState>,
    platform: Arc<dyn SurfacePlatform>,
    prefs: SurfaceAllocatorPrefs,
}

impl AllocatorInner {
    fn handle_remote_death(&self, epoch: ConnectionEpoch) {
        let mut state = self.state.lock();
        let AllocatorState {
            connection,
            registry,
        } = &mut *state;
        let Some(torn_down) = connection.on_remote_died(epoch, registry) else {
            return;
        };
        for config in torn_down.iter().filter_map(|entry| entry.sync_config.as_ref()) {
            self.platform.release_sync_surface(config);
        }
        debug!(
            "Invalidated {} surfaces after losing the remote surface allocator",
            torn_down.len()
        );
    }

    /// Release the local sync surface and the remote surface of every surface that
    /// was dropped without being disposed of.
    fn reclaim_abandoned(&self, state: &mut AllocatorState) {
        for entry in state.registry.take_abandoned() {
            if let Some(config) = entry.sync_config {
                self.platform.release_sync_surface(&config);
            }
            if let Some(remote) = state.connection.remote() {
                release_remote_surface(remote, entry.handle, entry.consumer_kind);
            }
        }
    }
}

/// Hands out surfaces allocated by the remote allocator service and keeps track of
/// them, so that they can all be invalidated at once if the service goes away.
///
/// Allocation and release are rare compared to rendering, so every operation is
/// serialized on a single lock.
#[derive(Clone)]
pub struct SurfaceAllocator {
    inner: Arc<AllocatorInner>,
}

impl SurfaceAllocator {
    pub fn new(
        locator: Arc<dyn AllocatorLocator>,
        platform: Arc<dyn SurfacePlatform>,
        prefs: SurfaceAllocatorPrefs,
    ) -> SurfaceAllocator {
        SurfaceAllocator {
            inner: Arc::new(AllocatorInner {
                state: Mutex::new(AllocatorState {
                    connection: RemoteAllocatorConnection::new(locator),
                    registry: SurfaceRegistry::default(),
                }),
                platform,
                prefs,
            }),
        }
    }

    /// Acquire a surface consumed through a surface texture. Failures are logged and
    /// reported as `None`.
    pub fn acquire_surface_texture(
        &self,
        width: u32,
        height: u32,
        single_buffer_mode: bool,
    ) -> Option<Arc<Surface>> {
        self.try_acquire_surface_texture(width, height, single_buffer_mode)
            .inspect_err(|error| warn!("Failed to acquire surface texture: {error}"))
            .ok()
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), level = "debug"))]
    pub fn try_acquire_surface_texture(
        &self,
        width: u32,
        height: u32,
        single_buffer_mode: bool,
    ) -> Result<Arc<Surface>, AllocatorError> {
        let on_death = self.death_callback();
        let mut state = self.inner.state.lock();
        self.inner.reclaim_abandoned(&mut state);
        let AllocatorState {
            connection,
            registry,
        } = &mut *state;

        let remote = connection
            .ensure_connection(&on_death)
            .ok_or(AllocatorError::ConnectionUnavailable)?;
        let descriptor = remote
            .acquire_surface_texture(width, height, single_buffer_mode)?
            .ok_or(AllocatorError::RemoteDenied)?;

        let surface = Arc::new(Surface::new(descriptor, ConsumerKind::SurfaceTexture));
        if !registry.insert(&surface) {
            return Err(AllocatorError::DuplicateHandle(descriptor.handle));
        }

        if !surface.is_in_process() {
            if let Err(error) = self.negotiate_sync(remote, &surface) {
                self.roll_back(remote, registry, &surface);
                return Err(error);
            }
            if let Some(config) = surface.sync_config() {
                registry.record_sync_config(surface.handle(), *config);
            }
        }

        Ok(surface)
    }

    /// Acquire a surface consumed through an image reader. Failures are logged and
    /// reported as `None`.
    pub fn acquire_image_reader(
        &self,
        width: u32,
        height: u32,
        format: i32,
        max_images: u32,
        usage: u64,
    ) -> Option<Arc<Surface>> {
        self.try_acquire_image_reader(ImageReaderDescriptor {
            width,
            height,
            format,
            max_images,
            usage,
        })
        .inspect_err(|error| warn!("Failed to acquire image reader: {error}"))
        .ok()
    }

    #[cfg_attr(feature = "tracing", tracing::instrument(skip(self), level = "debug"))]
    pub fn try_acquire_image_reader(
        &self,
        descriptor: ImageReaderDescriptor,
    ) -> Result<Arc<Surface>, AllocatorError> {
        // Rendering the images needs buffer-to-window conversion, which older
        // platforms lack. Refuse before bothering the service.
        let api_level = self.inner.platform.api_level();
        let required = self.inner.prefs.image_reader_min_api_level;
        if api_level < required {
            return Err(AllocatorError::PlatformUnsupported {
                api_level,
                required,
            });
        }

        let on_death = self.death_callback();
        let mut state = self.inner.state.lock();
        self.inner.reclaim_abandoned(&mut state);
        let AllocatorState {
            connection,
            registry,
        } = &mut *state;

        let remote = connection
            .ensure_connection(&on_death)
            .ok_or(AllocatorError::ConnectionUnavailable)?;
        let remote_descriptor = remote
            .acquire_image_reader(descriptor)?
            .ok_or(AllocatorError::RemoteDenied)?;

        let surface = Arc::new(Surface::new(remote_descriptor, ConsumerKind::ImageReader));
        if !registry.insert(&surface) {
            return Err(AllocatorError::DuplicateHandle(remote_descriptor.handle));
        }
        Ok(surface)
    }

    /// Give a surface back. Disposing of a surface that is already invalid, most
    /// likely because the allocator service died, does nothing.
    #[cfg_attr(feature = "tracing", tracing::instrument(skip_all, level = "debug"))]
    pub fn dispose_surface(&self, surface: &Surface) {
        let mut state = self.inner.state.lock();
        self.inner.reclaim_abandoned(&mut state);
        if !surface.is_valid() {
            return;
        }

        state.registry.remove(surface.handle());
        if !surface.invalidate() {
            return;
        }
        if let Some(config) = surface.sync_config() {
            self.inner.platform.release_sync_surface(config);
        }

        // Without a connection there is nothing left on the other side to release.
        if let Some(remote) = state.connection.remote() {
            release_remote_surface(remote, surface.handle(), surface.consumer_kind());
        }
    }

    /// Ask the remote side to sync from the given upstream surface. Best effort.
    pub fn sync(&self, upstream: SurfaceHandle) {
        let state = self.inner.state.lock();
        let Some(remote) = state.connection.remote() else {
            return;
        };
        if let Err(error) = remote.sync(upstream) {
            warn!("Failed to sync surface {upstream}: {error}");
        }
    }

    pub fn is_connected(&self) -> bool {
        self.inner.state.lock().connection.is_connected()
    }

    /// The handles of every surface this allocator currently considers live. Surfaces
    /// dropped without being disposed of are released first and not reported.
    pub fn live_surface_handles(&self) -> Vec<SurfaceHandle> {
        let mut state = self.inner.state.lock();
        self.inner.reclaim_abandoned(&mut state);
        state.registry.handles()
    }

    pub fn live_surface_count(&self) -> usize {
        let mut state = self.inner.state.lock();
        self.inner.reclaim_abandoned(&mut state);
        state.registry.len()
    }

    fn death_callback(&self) -> impl Fn(ConnectionEpoch) -> Box<dyn FnOnce() + Send + 'static> {
        let inner: Weak<AllocatorInner> = Arc::downgrade(&self.inner);
        move |epoch: ConnectionEpoch| -> Box<dyn FnOnce() + Send + 'static> {
            let inner = inner.clone();
            Box::new(move || {
                if let Some(inner) = inner.upgrade() {
                    inner.handle_remote_death(epoch);
                }
            })
        }
    }

    /// Set up buffer synchronization for a surface living in another process. The
    /// local sync surface is created first and only forwarded if that worked; a
    /// platform unable to create one leaves the surface without sync.
    fn negotiate_sync(
        &self,
        remote: &dyn RemoteSurfaceAllocator,
        surface: &Surface,
    ) -> Result<(), AllocatorError> {
        let Some(config) = self
            .inner
            .platform
            .create_sync_surface(&surface.descriptor())
        else {
            debug!("No sync surface for {}", surface.handle());
            return Ok(());
        };

        if let Err(error) = remote.configure_sync(config) {
            self.inner.platform.release_sync_surface(&config);
            return Err(error.into());
        }
        surface.set_sync_config(config);
        Ok(())
    }

    fn roll_back(
        &self,
        remote: &dyn RemoteSurfaceAllocator,
        registry: &mut SurfaceRegistry,
        surface: &Surface,
    ) {
        registry.remove(surface.handle());
        if surface.invalidate() {
            release_remote_surface(remote, surface.handle(), surface.consumer_kind());
        }
    }
}

fn release_remote_surface(
    remote: &dyn RemoteSurfaceAllocator,
    handle: SurfaceHandle,
    consumer_kind: ConsumerKind,
) {
    let result = match consumer_kind {
        ConsumerKind::SurfaceTexture => remote.release_surface_texture(handle),
        ConsumerKind::ImageReader => remote.release_image_reader(handle),
    };
    if let Err(error) = result {
        warn!("Failed to release surface {handle}: {error}");
    }
}
