/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! A lookup table of native image readers, keyed by the handle their creator assigned.
//!
//! Unlike surfaces, image readers live entirely in this process, so there is no
//! remote end that could die and nothing to invalidate in bulk.

use std::sync::Arc;

use log::warn;
use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use surface_allocator_traits::ImageReaderDescriptor;

/// Creates the platform image readers stored in an [`ImageReaderTable`].
pub trait ImageReaderFactory: Send + Sync {
    type Reader: Send + Sync;

    fn create_reader(&self, descriptor: &ImageReaderDescriptor) -> Option<Self::Reader>;
}

pub struct ImageReaderTable<F: ImageReaderFactory> {
    factory: F,
    readers: Mutex<FxHashMap<u64, Arc<F::Reader>>>,
}

impl<F: ImageReaderFactory> ImageReaderTable<F> {
    pub fn new(factory: F) -> ImageReaderTable<F> {
        ImageReaderTable {
            factory,
            readers: Default::default(),
        }
    }

    /// Create a reader and make it reachable through `handle`. A reader previously
    /// registered under the same handle is replaced.
    pub fn create(
        &self,
        handle: u64,
        descriptor: ImageReaderDescriptor,
    ) -> Option<Arc<F::Reader>> {
        let Some(reader) = self.factory.create_reader(&descriptor) else {
            warn!("Failed to create image reader {handle} ({descriptor:?})");
            return None;
        };
        let reader = Arc::new(reader);
        if self.readers.lock().insert(handle, reader.clone()).is_some() {
            warn!("Replaced image reader {handle}");
        }
        Some(reader)
    }

    pub fn release(&self, handle: u64) -> Option<Arc<F::Reader>> {
        self.readers.lock().remove(&handle)
    }

    pub fn lookup(&self, handle: u64) -> Option<Arc<F::Reader>> {
        self.readers.lock().get(&handle).cloned()
    }

    pub fn len(&self) -> usize {
        self.readers.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.readers.lock().is_empty()
    }
}
