/* This Source Code Form is subject to the terms of the Mozilla Public
 * License, v. 2.0. If a copy of the MPL was not distributed with this
 * file, You can obtain one at https://mozilla.org/MPL/2.0/. */

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Tunables of the surface allocator. Missing keys take their default value when
/// read from a preferences file.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
#[serde(default)]
pub struct SurfaceAllocatorPrefs {
    /// The first platform API level able to turn image-reader buffers into windows.
    /// Image-reader surfaces are refused below it.
    pub image_reader_min_api_level: u32,
    /// How long to wait for the allocator service to answer a request.
    pub rpc_timeout_ms: u64,
}

impl Default for SurfaceAllocatorPrefs {
    fn default() -> Self {
        SurfaceAllocatorPrefs {
            image_reader_min_api_level: 26,
            rpc_timeout_ms: 5000,
        }
    }
}

impl SurfaceAllocatorPrefs {
    pub fn from_json(json: &str) -> Result<SurfaceAllocatorPrefs, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::SurfaceAllocatorPrefs;

    #[test]
    fn missing_keys_use_defaults() {
        let prefs = SurfaceAllocatorPrefs::from_json(r#"{ "rpc_timeout_ms": 250 }"#).unwrap();
        assert_eq!(prefs.image_reader_min_api_level, 26);
        assert_eq!(prefs.rpc_timeout(), Duration::from_millis(250));
    }

    #[test]
    fn rejects_malformed_values() {
        assert!(SurfaceAllocatorPrefs::from_json(r#"{ "rpc_timeout_ms": "soon" }"#).is_err());
    }
}
