/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct FrameClockPrefs {
    /// The nominal frame interval. Frame timelines whose deadline is closer than
    /// this to the frame time are not chosen, and the timer source ticks at it.
    pub frame_interval_nanos: i64,
}

impl Default for FrameClockPrefs {
    fn default() -> Self {
        FrameClockPrefs {
            frame_interval_nanos: 16_000_000,
        }
    }
}

impl FrameClockPrefs {
    pub fn from_json(json: &str) -> Result<FrameClockPrefs, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// The frame interval as a duration, never shorter than a nanosecond.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_nanos(self.frame_interval_nanos.max(1) as u64)
    }
}
