/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use log::warn;

use crate::{CallbackKind, FrameCallback, FrameCallbackData, FrameCallbackSource, FrameClockPrefs};

enum TimerMessage {
    Post(FrameCallback),
    Remove,
    Quit,
}

/// A [`FrameCallbackSource`] for platforms without a hardware vsync signal. A
/// background thread runs each posted callback at the next multiple of the frame
/// interval, counted from the creation of the source. Frame times are nanoseconds
/// since then.
pub struct TimerFrameSource {
    sender: Sender<TimerMessage>,
    join_handle: Option<JoinHandle<()>>,
}

impl TimerFrameSource {
    pub fn new(prefs: &FrameClockPrefs) -> TimerFrameSource {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let interval = prefs.frame_interval();
        let join_handle = thread::Builder::new()
            .name("FrameClockTimer".to_owned())
            .spawn(move || run_timer(receiver, interval))
            .expect("Thread spawning failed");
        TimerFrameSource {
            sender,
            join_handle: Some(join_handle),
        }
    }

    fn send(&self, message: TimerMessage) {
        if self.sender.send(message).is_err() {
            warn!("Frame clock timer thread is gone");
        }
    }
}

impl FrameCallbackSource for TimerFrameSource {
    fn supports_frame_timelines(&self) -> bool {
        false
    }

    fn post_frame_callback(&self, _: CallbackKind, callback: FrameCallback) {
        self.send(TimerMessage::Post(callback));
    }

    fn remove_frame_callback(&self, _: CallbackKind) {
        self.send(TimerMessage::Remove);
    }
}

impl Drop for TimerFrameSource {
    fn drop(&mut self) {
        let _ = self.sender.send(TimerMessage::Quit);
        if let Some(join_handle) = self.join_handle.take() {
            // The last reference may be released by a callback running on the timer
            // thread itself.
            if join_handle.thread().id() != thread::current().id() {
                let _ = join_handle.join();
            }
        }
    }
}

fn run_timer(receiver: Receiver<TimerMessage>, interval: Duration) {
    let start = Instant::now();
    let mut pending: Option<(Instant, FrameCallback)> = None;
    loop {
        let message = match pending.as_ref() {
            Some((deadline, _)) => match receiver.recv_deadline(*deadline) {
                Ok(message) => Some(message),
                Err(RecvTimeoutError::Timeout) => None,
                Err(RecvTimeoutError::Disconnected) => return,
            },
            None => match receiver.recv() {
                Ok(message) => Some(message),
                Err(_) => return,
            },
        };

        match message {
            Some(TimerMessage::Post(callback)) => {
                pending = Some((next_frame(start, interval, Instant::now()), callback));
            },
            Some(TimerMessage::Remove) => pending = None,
            Some(TimerMessage::Quit) => return,
            None => {
                if let Some((deadline, callback)) = pending.take() {
                    callback(FrameCallbackData::Frame {
                        frame_time_nanos: (deadline - start).as_nanos() as i64,
                    });
                }
            },
        }
    }
}

/// The first frame boundary strictly after `now`.
fn next_frame(start: Instant, interval: Duration, now: Instant) -> Instant {
    let interval_nanos = interval.as_nanos().max(1);
    let frames = now.saturating_duration_since(start).as_nanos() / interval_nanos + 1;
    start + Duration::from_nanos((frames * interval_nanos) as u64)
}
