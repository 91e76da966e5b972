/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

//! Death notifications for remote allocator channels.
//!
//! A [`DeathRecipient`] is handed to the transport when a connection is established
//! and is consumed when the transport notices that the remote end went away, so the
//! callback can run at most once. The matching [`DeathLink`] stays with the owner of
//! the connection; unlinking it (explicitly or by dropping it) turns a later
//! notification into a no-op.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

type DeathCallback = Box<dyn FnOnce() + Send + 'static>;

pub struct DeathRecipient {
    callback: DeathCallback,
    unlinked: Arc<AtomicBool>,
}

impl DeathRecipient {
    pub fn new(callback: DeathCallback) -> (DeathRecipient, DeathLink) {
        let unlinked = Arc::new(AtomicBool::new(false));
        let recipient = DeathRecipient {
            callback,
            unlinked: unlinked.clone(),
        };
        (recipient, DeathLink { unlinked })
    }

    /// Whether the owner of the connection has already given up on it.
    pub fn is_unlinked(&self) -> bool {
        self.unlinked.load(Ordering::Acquire)
    }

    /// Report that the remote end died. Must not be called from inside an RPC issued
    /// on the same connection, since the callback takes the allocator lock.
    pub fn notify(self) {
        if self.unlinked.swap(true, Ordering::AcqRel) {
            return;
        }
        (self.callback)();
    }
}

impl fmt::Debug for DeathRecipient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeathRecipient")
            .field("unlinked", &self.is_unlinked())
            .finish()
    }
}

#[derive(Debug)]
pub struct DeathLink {
    unlinked: Arc<AtomicBool>,
}

impl DeathLink {
    pub fn unlink(&self) {
        self.unlinked.store(true, Ordering::Release);
    }

    pub fn is_unlinked(&self) -> bool {
        self.unlinked.load(Ordering::Acquire)
    }
}

impl Drop for DeathLink {
    fn drop(&mut self) {
        self.unlink();
    }
}
