//! Per-device window buffer (spec.md §4.2).
//!
//! Keeps, for every device identifier, an insertion-ordered FIFO of recent
//! samples. Single-writer per device: the ingest callback is expected to
//! invoke [`DeviceWindowStore::ingest`] serially (see SPEC_FULL §5).

use std::collections::HashMap;

use crate::types::{DeviceWindow, RssiSample};

#[derive(Debug, Default)]
pub struct DeviceWindowStore {
    windows: HashMap<String, DeviceWindow>,
    window_sec: f64,
}

impl DeviceWindowStore {
    pub fn new(window_sec: f64) -> Self {
        Self {
            windows: HashMap::new(),
            window_sec,
        }
    }

    /// Append a sample to the device's window and prune entries older than
    /// `window_sec` relative to the sample's own `rx_ts`.
    pub fn ingest(&mut self, device_id: &str, sample: RssiSample) {
        let now = sample.rx_ts;
        let window = self.windows.entry(device_id.to_string()).or_default();
        window.samples.push_back(sample);
        Self::prune(window, now, self.window_sec);
    }

    fn prune(window: &mut DeviceWindow, now: f64, window_sec: f64) {
        while let Some(front) = window.samples.front() {
            if now - front.rx_ts > window_sec {
                window.samples.pop_front();
            } else {
                break;
            }
        }
    }

    /// Prune every device's window against `now`, used by session cleanup
    /// so stale buffers don't linger after a device has gone quiet.
    pub fn prune_all(&mut self, now: f64) {
        for window in self.windows.values_mut() {
            Self::prune(window, now, self.window_sec);
        }
    }

    pub fn window(&self, device_id: &str) -> Option<&DeviceWindow> {
        self.windows.get(device_id)
    }

    pub fn remove(&mut self, device_id: &str) {
        self.windows.remove(device_id);
    }

    pub fn device_count(&self) -> usize {
        self.windows.len()
    }
}
