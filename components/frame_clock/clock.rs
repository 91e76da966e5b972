/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

use log::{debug, warn};
use parking_lot::Mutex;

use crate::timeline::choose_timeline;
use crate::{
    CallbackKind, FrameCallbackData, FrameCallbackSource, FrameClockPrefs, FrameTimeline,
    VsyncEvent, VsyncObserver,
};

#[derive(Default)]
struct ClockState {
    observing: bool,
    /// The generation of the callback currently posted with the source, if any.
    /// A callback whose generation does not match was removed and must not deliver.
    pending_callback: Option<u64>,
    next_generation: u64,
}

/// Turns the platform's one-shot frame callbacks into a continuous stream of
/// [`VsyncEvent`]s for a single observer, for as long as it is observing.
pub struct FrameClock {
    weak_self: Weak<FrameClock>,
    source: Arc<dyn FrameCallbackSource>,
    /// Decided once, from what the source supports.
    callback_kind: CallbackKind,
    frame_interval_nanos: i64,
    observer: Arc<dyn VsyncObserver>,
    state: Mutex<ClockState>,
    logged_timelines: AtomicBool,
}

impl FrameClock {
    pub fn new(
        source: Arc<dyn FrameCallbackSource>,
        observer: Arc<dyn VsyncObserver>,
        prefs: &FrameClockPrefs,
    ) -> Arc<FrameClock> {
        let callback_kind = if source.supports_frame_timelines() {
            CallbackKind::Vsync
        } else {
            CallbackKind::Frame
        };
        Arc::new_cyclic(|weak_self| FrameClock {
            weak_self: weak_self.clone(),
            source,
            callback_kind,
            frame_interval_nanos: prefs.frame_interval_nanos,
            observer,
            state: Default::default(),
            logged_timelines: AtomicBool::new(false),
        })
    }

    pub fn callback_kind(&self) -> CallbackKind {
        self.callback_kind
    }

    /// Start or stop delivering notifications. Returns whether the clock is observing
    /// afterwards.
    pub fn observe(&self, enable: bool) -> bool {
        let mut state = self.state.lock();
        if state.observing != enable {
            state.observing = enable;
            if enable {
                self.post_callback(&mut state);
            } else if state.pending_callback.take().is_some() {
                self.source.remove_frame_callback(self.callback_kind);
            }
        }
        state.observing
    }

    pub fn is_observing(&self) -> bool {
        self.state.lock().observing
    }

    fn post_callback(&self, state: &mut ClockState) {
        if state.pending_callback.is_some() {
            return;
        }
        let generation = state.next_generation;
        state.next_generation += 1;
        state.pending_callback = Some(generation);

        let clock = self.weak_self.clone();
        self.source.post_frame_callback(
            self.callback_kind,
            Box::new(move |data: FrameCallbackData| {
                if let Some(clock) = clock.upgrade() {
                    clock.on_frame(generation, data);
                }
            }),
        );
    }

    fn on_frame(&self, generation: u64, data: FrameCallbackData) {
        {
            let mut state = self.state.lock();
            if state.pending_callback != Some(generation) {
                debug!("Ignoring removed frame callback");
                return;
            }
            state.pending_callback = None;
            if !state.observing {
                return;
            }
            self.post_callback(&mut state);
        }

        // Observers may call back into the clock.
        let event = self.event_for(data);
        self.observer.on_vsync(&event);
    }

    fn event_for(&self, data: FrameCallbackData) -> VsyncEvent {
        let (frame_time_nanos, timelines, preferred_index) = match data {
            FrameCallbackData::Frame { frame_time_nanos } => {
                return VsyncEvent {
                    frame_time_nanos,
                    ..Default::default()
                };
            },
            FrameCallbackData::Vsync {
                frame_time_nanos,
                timelines,
                preferred_index,
            } => (frame_time_nanos, timelines, preferred_index),
        };

        let chosen = choose_timeline(
            frame_time_nanos,
            &timelines,
            preferred_index,
            self.frame_interval_nanos,
        );
        self.log_timelines_once(frame_time_nanos, &timelines, preferred_index, chosen);
        match chosen {
            Some(timeline) => VsyncEvent {
                frame_time_nanos,
                vsync_id: timeline.vsync_id,
                deadline_nanos: timeline.deadline_nanos,
                present_time_nanos: timeline.present_time_nanos,
            },
            None => {
                warn!(
                    "No frame timeline to choose from ({} candidates, preferred {preferred_index})",
                    timelines.len()
                );
                VsyncEvent {
                    frame_time_nanos,
                    ..Default::default()
                }
            },
        }
    }

    fn log_timelines_once(
        &self,
        frame_time_nanos: i64,
        timelines: &[FrameTimeline],
        preferred_index: usize,
        chosen: Option<&FrameTimeline>,
    ) {
        if self.logged_timelines.swap(true, Ordering::Relaxed) {
            return;
        }
        for timeline in timelines {
            debug!(
                "Possible frame timeline: deadline in {}ns",
                timeline.deadline_nanos - frame_time_nanos
            );
        }
        if let Some(preferred) = timelines.get(preferred_index) {
            debug!(
                "Preferred frame timeline: deadline in {}ns",
                preferred.deadline_nanos - frame_time_nanos
            );
        }
        if let Some(chosen) = chosen {
            debug!(
                "Chosen frame timeline: deadline in {}ns",
                chosen.deadline_nanos - frame_time_nanos
            );
        }
    }
}

impl Drop for FrameClock {
    fn drop(&mut self) {
        if self.state.get_mut().pending_callback.take().is_some() {
            self.source.remove_frame_callback(self.callback_kind);
        }
    }
}
