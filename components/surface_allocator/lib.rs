/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! The client side of the cross-process surface allocator.
//!
//! Drawable surfaces are allocated by a remote allocator service. The
//! [`SurfaceAllocator`] requests them, keeps a local [`Surface`] shadow of each one,
//! and invalidates all of them at once when the service goes away, after which the
//! next acquisition transparently reconnects.

mod allocator;
mod connection;
mod error;
pub mod image_reader;
mod locator;
mod prefs;
mod registry;
mod service;
mod surface;

pub use crate::allocator::SurfaceAllocator;
pub use crate::error::AllocatorError;
pub use crate::locator::IpcAllocatorLocator;
pub use crate::prefs::SurfaceAllocatorPrefs;
pub use crate::service::{AllocatorServiceConfig, SurfaceAllocatorService};
pub use crate::surface::Surface;
