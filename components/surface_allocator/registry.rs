/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::{Arc, Weak};

use log::{debug, warn};
use rustc_hash::FxHashMap;
use surface_allocator_traits::{ConsumerKind, SurfaceHandle, SyncConfig};

use crate::surface::Surface;

/// What the registry knows about one surface. The consumer kind and sync config are
/// copied out of the surface so that the remote and local resources behind it can
/// still be released after its owner dropped it without disposing of it.
pub(crate) struct RegisteredSurface {
    pub(crate) handle: SurfaceHandle,
    pub(crate) consumer_kind: ConsumerKind,
    pub(crate) sync_config: Option<SyncConfig>,
    surface: Weak<Surface>,
}

impl RegisteredSurface {
    /// The surface itself, or `None` if its owner dropped it.
    pub(crate) fn surface(&self) -> Option<Arc<Surface>> {
        self.surface.upgrade()
    }

    fn is_abandoned(&self) -> bool {
        self.surface.strong_count() == 0
    }
}

/// The set of surfaces believed to be alive on the remote side.
///
/// The registry only keeps weak references: the caller that acquired a surface owns
/// it, and the registry merely needs to reach it to invalidate it when the connection
/// to the allocator dies. It is not synchronized itself; the allocator keeps it under
/// the same lock as the connection.
#[derive(Default)]
pub(crate) struct SurfaceRegistry {
    surfaces: FxHashMap<SurfaceHandle, RegisteredSurface>,
}

impl SurfaceRegistry {
    /// Register a freshly acquired surface. Returns `false` and leaves the registry
    /// untouched if the handle is already taken.
    pub(crate) fn insert(&mut self, surface: &Arc<Surface>) -> bool {
        debug_assert!(surface.is_valid(), "Registering an invalid surface");
        if self.surfaces.contains_key(&surface.handle()) {
            warn!("Surface handle {} is already registered", surface.handle());
            return false;
        }
        self.surfaces.insert(
            surface.handle(),
            RegisteredSurface {
                handle: surface.handle(),
                consumer_kind: surface.consumer_kind(),
                sync_config: surface.sync_config().copied(),
                surface: Arc::downgrade(surface),
            },
        );
        true
    }

    /// Remember the sync surface negotiated for a registered surface.
    pub(crate) fn record_sync_config(&mut self, handle: SurfaceHandle, config: SyncConfig) {
        match self.surfaces.get_mut(&handle) {
            Some(entry) => entry.sync_config = Some(config),
            None => warn!("Sync config for unregistered surface {handle}"),
        }
    }

    pub(crate) fn remove(&mut self, handle: SurfaceHandle) {
        self.surfaces.remove(&handle);
    }

    /// Remove and return every entry whose surface was dropped by its owner without
    /// being disposed of. The caller is responsible for releasing what they hold.
    pub(crate) fn take_abandoned(&mut self) -> Vec<RegisteredSurface> {
        let handles: Vec<_> = self
            .surfaces
            .values()
            .filter(|entry| entry.is_abandoned())
            .map(|entry| entry.handle)
            .collect();
        if !handles.is_empty() {
            debug!("Reclaiming {} abandoned surfaces", handles.len());
        }
        handles
            .into_iter()
            .filter_map(|handle| self.surfaces.remove(&handle))
            .collect()
    }

    /// Empty the registry, returning every entry, abandoned or not.
    pub(crate) fn drain_all(&mut self) -> Vec<RegisteredSurface> {
        self.surfaces.drain().map(|(_, entry)| entry).collect()
    }

    pub(crate) fn handles(&self) -> Vec<SurfaceHandle> {
        self.surfaces.keys().copied().collect()
    }

    pub(crate) fn len(&self) -> usize {
        self.surfaces.len()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use surface_allocator_traits::{ConsumerKind, SurfaceDescriptor, SurfaceHandle, SyncConfig};

    use super::SurfaceRegistry;
    use crate::surface::Surface;

    fn surface(handle: u64) -> Arc<Surface> {
        Arc::new(Surface::new(
            SurfaceDescriptor {
                handle: SurfaceHandle(handle),
                width: 64,
                height: 64,
                in_process: true,
            },
            ConsumerKind::SurfaceTexture,
        ))
    }

    fn sync_config(handle: u64) -> SyncConfig {
        SyncConfig {
            source_handle: SurfaceHandle(handle),
            target_id: 100 + handle,
            width: 64,
            height: 64,
        }
    }

    #[test]
    fn rejects_duplicate_handles() {
        let mut registry = SurfaceRegistry::default();
        let first = surface(1);
        let second = surface(1);
        assert!(registry.insert(&first));
        assert!(!registry.insert(&second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn remove_tolerates_unknown_handles() {
        let mut registry = SurfaceRegistry::default();
        let first = surface(1);
        registry.insert(&first);
        registry.remove(SurfaceHandle(1));
        registry.remove(SurfaceHandle(1));
        registry.remove(SurfaceHandle(7));
        assert_eq!(registry.len(), 0);
    }

    #[test]
    fn drain_returns_every_entry_and_empties() {
        let mut registry = SurfaceRegistry::default();
        let kept = surface(1);
        registry.insert(&kept);
        registry.insert(&surface(2));
        registry.record_sync_config(SurfaceHandle(2), sync_config(2));

        let mut drained = registry.drain_all();
        drained.sort_by_key(|entry| entry.handle.0);
        assert_eq!(drained.len(), 2);
        assert!(drained[0].surface().is_some());
        assert!(drained[1].surface().is_none());
        assert_eq!(drained[1].sync_config, Some(sync_config(2)));
        assert!(registry.handles().is_empty());
    }

    #[test]
    fn abandoned_entries_are_taken_with_their_sync_config() {
        let mut registry = SurfaceRegistry::default();
        let kept = surface(1);
        registry.insert(&kept);
        let dropped = surface(2);
        registry.insert(&dropped);
        registry.record_sync_config(SurfaceHandle(2), sync_config(2));
        drop(dropped);

        let abandoned = registry.take_abandoned();
        assert_eq!(abandoned.len(), 1);
        assert_eq!(abandoned[0].handle, SurfaceHandle(2));
        assert_eq!(abandoned[0].consumer_kind, ConsumerKind::SurfaceTexture);
        assert_eq!(abandoned[0].sync_config, Some(sync_config(2)));
        assert_eq!(registry.handles(), vec![SurfaceHandle(1)]);
        assert!(registry.take_abandoned().is_empty());
    }
}
