/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use crate::FrameTimeline;

/// Pick the timeline a frame should target: the one with the earliest deadline that
/// still leaves at least `min_interval_nanos` after `frame_time_nanos`, or the
/// platform's preferred timeline when none leaves that much time.
///
/// Platforms with high refresh rates tend to prefer deadlines only one short frame
/// away, which a frame cannot realistically be produced in.
pub fn choose_timeline(
    frame_time_nanos: i64,
    timelines: &[FrameTimeline],
    preferred_index: usize,
    min_interval_nanos: i64,
) -> Option<&FrameTimeline> {
    timelines
        .iter()
        .filter(|timeline| {
            timeline.deadline_nanos.saturating_sub(frame_time_nanos) >= min_interval_nanos
        })
        .min_by_key(|timeline| timeline.deadline_nanos)
        .or_else(|| timelines.get(preferred_index))
}
