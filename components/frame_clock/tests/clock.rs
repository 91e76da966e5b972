/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::sync::Arc;

use frame_clock::{CallbackKind, FrameCallbackData, FrameClock, FrameClockPrefs, VsyncEvent};
use parking_lot::Mutex;

use crate::mock::{MS, MockSource, Notification, RecordingObserver, timeline};

fn clock_with(source: &Arc<MockSource>) -> (Arc<FrameClock>, Arc<Mutex<Vec<Notification>>>) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let observer = RecordingObserver::new("clock", &log);
    let clock = FrameClock::new(source.clone(), observer, &FrameClockPrefs::default());
    (clock, log)
}

fn frame_event(frame_time_nanos: i64) -> Notification {
    Notification::Vsync(
        "clock",
        VsyncEvent {
            frame_time_nanos,
            ..Default::default()
        },
    )
}

#[test]
fn enabling_twice_posts_once() {
    let source = Arc::new(MockSource::default());
    let (clock, log) = clock_with(&source);

    assert!(clock.observe(true));
    assert!(clock.observe(true));
    assert_eq!(source.posted(), vec![CallbackKind::Frame]);

    assert!(!clock.observe(false));
    assert_eq!(source.removed(), vec![CallbackKind::Frame]);
    assert!(!clock.observe(false));
    assert_eq!(source.removed().len(), 1);

    // The platform may still run a callback it was asked to drop.
    assert!(source.fire_frame(16 * MS));
    assert!(log.lock().is_empty());
    assert_eq!(source.posted().len(), 1);
}

#[test]
fn every_frame_rearms_the_callback() {
    let source = Arc::new(MockSource::default());
    let (clock, log) = clock_with(&source);
    clock.observe(true);

    source.fire_frame(16 * MS);
    source.fire_frame(32 * MS);
    source.fire_frame(48 * MS);

    assert_eq!(source.posted().len(), 4);
    assert_eq!(
        *log.lock(),
        vec![frame_event(16 * MS), frame_event(32 * MS), frame_event(48 * MS)]
    );
    assert!(clock.is_observing());
}

#[test]
fn disabling_stops_the_stream() {
    let source = Arc::new(MockSource::default());
    let (clock, log) = clock_with(&source);
    clock.observe(true);
    source.fire_frame(16 * MS);

    clock.observe(false);
    source.fire_frame(32 * MS);

    assert_eq!(*log.lock(), vec![frame_event(16 * MS)]);
    assert_eq!(source.posted().len(), 2);
}

#[test]
fn toggling_within_a_frame_keeps_one_callback_armed() {
    let source = Arc::new(MockSource::default());
    let (clock, log) = clock_with(&source);

    clock.observe(true);
    clock.observe(false);
    clock.observe(true);
    assert_eq!(source.posted().len(), 2);
    assert_eq!(source.removed().len(), 1);

    assert!(source.fire_callback(0, FrameCallbackData::Frame { frame_time_nanos: 16 * MS }));
    assert!(log.lock().is_empty());
    assert_eq!(source.posted().len(), 2);

    assert!(source.fire_callback(1, FrameCallbackData::Frame { frame_time_nanos: 16 * MS }));
    assert_eq!(*log.lock(), vec![frame_event(16 * MS)]);
    assert_eq!(source.posted().len(), 3);
}

#[test]
fn vsync_callbacks_choose_a_timeline() {
    let source = Arc::new(MockSource::with_timelines());
    let (clock, log) = clock_with(&source);
    assert_eq!(clock.callback_kind(), CallbackKind::Vsync);
    clock.observe(true);

    let frame_time = 1000 * MS;
    source.fire(FrameCallbackData::Vsync {
        frame_time_nanos: frame_time,
        timelines: vec![
            timeline(7, frame_time + 11 * MS),
            timeline(8, frame_time + 22 * MS),
            timeline(9, frame_time + 33 * MS),
        ],
        preferred_index: 0,
    });

    assert_eq!(
        *log.lock(),
        vec![Notification::Vsync(
            "clock",
            VsyncEvent {
                frame_time_nanos: frame_time,
                vsync_id: 8,
                deadline_nanos: frame_time + 22 * MS,
                present_time_nanos: frame_time + 26 * MS,
            }
        )]
    );
    assert_eq!(source.posted(), vec![CallbackKind::Vsync, CallbackKind::Vsync]);
}

#[test]
fn short_timelines_fall_back_to_preferred() {
    let source = Arc::new(MockSource::with_timelines());
    let (clock, log) = clock_with(&source);
    clock.observe(true);

    let frame_time = 1000 * MS;
    source.fire(FrameCallbackData::Vsync {
        frame_time_nanos: frame_time,
        timelines: vec![timeline(1, frame_time + 5 * MS), timeline(2, frame_time + 11 * MS)],
        preferred_index: 1,
    });

    let Notification::Vsync(_, event) = log.lock()[0].clone() else {
        panic!("expected a vsync notification");
    };
    assert_eq!(event.vsync_id, 2);
    assert_eq!(event.deadline_nanos, frame_time + 11 * MS);
}

#[test]
fn dropping_the_clock_removes_its_callback() {
    let source = Arc::new(MockSource::default());
    let (clock, log) = clock_with(&source);
    clock.observe(true);
    drop(clock);

    assert_eq!(source.removed(), vec![CallbackKind::Frame]);
    source.fire_frame(16 * MS);
    assert!(log.lock().is_empty());
}
