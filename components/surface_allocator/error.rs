/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use surface_allocator_traits::{SurfaceHandle, TransportError};

/// Why an acquisition failed. None of these is fatal: the caller may retry or fall
/// back to a different rendering strategy.
#[derive(Debug, thiserror::Error)]
pub enum AllocatorError {
    #[error("not connected to the remote surface allocator")]
    ConnectionUnavailable,
    #[error(transparent)]
    Transport(#[from] TransportError),
    #[error("the remote surface allocator returned no surface")]
    RemoteDenied,
    #[error("image readers need platform API level {required}, found {api_level}")]
    PlatformUnsupported { api_level: u32, required: u32 },
    #[error("the remote surface allocator handed out handle {0} twice")]
    DuplicateHandle(SurfaceHandle),
}
