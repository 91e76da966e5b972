/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

#![deny(unsafe_code)]

//! Frame timing notifications driven by the platform's one-shot frame callbacks.
//!
//! A [`FrameClock`] keeps a single callback armed with a [`FrameCallbackSource`] while
//! it is observing and turns every callback into a [`VsyncEvent`]. The
//! [`VsyncDispatcher`] shares one clock between any number of input and render
//! observers.

mod clock;
mod dispatcher;
mod prefs;
mod timeline;
mod timer_source;

use serde::{Deserialize, Serialize};

pub use crate::clock::FrameClock;
pub use crate::dispatcher::{ObserverId, ObserverKind, VsyncDispatcher};
pub use crate::prefs::FrameClockPrefs;
pub use crate::timeline::choose_timeline;
pub use crate::timer_source::TimerFrameSource;

/// One frame timing notification. The timeline fields are zero when the platform
/// only reports frame times.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
pub struct VsyncEvent {
    pub frame_time_nanos: i64,
    pub vsync_id: i64,
    pub deadline_nanos: i64,
    pub present_time_nanos: i64,
}

/// A candidate presentation deadline offered by the platform for a frame.
#[derive(Clone, Copy, Debug, Deserialize, Eq, PartialEq, Serialize)]
pub struct FrameTimeline {
    pub vsync_id: i64,
    pub deadline_nanos: i64,
    pub present_time_nanos: i64,
}

/// Which flavour of callback a [`FrameCallbackSource`] is asked to post. Newer
/// platforms offer vsync callbacks that carry frame timelines; older ones only
/// report the frame time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum CallbackKind {
    Frame,
    Vsync,
}

/// The payload a callback is invoked with.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameCallbackData {
    Frame {
        frame_time_nanos: i64,
    },
    Vsync {
        frame_time_nanos: i64,
        timelines: Vec<FrameTimeline>,
        preferred_index: usize,
    },
}

impl FrameCallbackData {
    pub fn frame_time_nanos(&self) -> i64 {
        match *self {
            FrameCallbackData::Frame { frame_time_nanos } |
            FrameCallbackData::Vsync {
                frame_time_nanos, ..
            } => frame_time_nanos,
        }
    }
}

pub type FrameCallback = Box<dyn FnOnce(FrameCallbackData) + Send + 'static>;

/// The platform's frame scheduler. Callbacks are one-shot: each posted callback runs
/// at most once, on the next frame, unless it is removed first.
///
/// Implementations must not run a callback synchronously from within
/// `post_frame_callback`.
pub trait FrameCallbackSource: Send + Sync {
    fn supports_frame_timelines(&self) -> bool;

    fn post_frame_callback(&self, kind: CallbackKind, callback: FrameCallback);

    /// Drop the outstanding callback of the given kind, if any.
    fn remove_frame_callback(&self, kind: CallbackKind);
}

pub trait VsyncObserver: Send + Sync {
    fn on_vsync(&self, event: &VsyncEvent);

    /// The display's refresh rate may have changed.
    fn on_refresh_rate_changed(&self) {}
}
