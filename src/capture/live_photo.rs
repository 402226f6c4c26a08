// SPDX-License-Identifier: GPL-3.0-only

//! Live Photo in-progress counter
//!
//! Companion movies start and finish on the capture completion context, so
//! the counter is atomic. The published flag is `count > 0`, recomputed from
//! one read inside the watch channel's update so concurrent publishers cannot
//! leave a stale value behind.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::watch;
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct LivePhotoCounter {
    count: Arc<AtomicUsize>,
    in_progress: Arc<watch::Sender<bool>>,
}

impl Default for LivePhotoCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl LivePhotoCounter {
    pub fn new() -> Self {
        let (in_progress, _) = watch::channel(false);
        Self {
            count: Arc::new(AtomicUsize::new(0)),
            in_progress: Arc::new(in_progress),
        }
    }

    /// A companion movie started recording; returns the published flag
    pub fn companion_started(&self) -> bool {
        let previous = self.count.fetch_add(1, Ordering::AcqRel);
        debug!(in_flight = previous + 1, "Live Photo companion started");
        self.publish()
    }

    /// A companion movie finished recording; returns the published flag
    pub fn companion_finished(&self) -> bool {
        match self
            .count
            .fetch_update(Ordering::AcqRel, Ordering::Acquire, |c| c.checked_sub(1))
        {
            Ok(previous) => debug!(in_flight = previous - 1, "Live Photo companion finished"),
            Err(_) => warn!("Live Photo companion finished without a matching start"),
        }
        self.publish()
    }

    /// Number of companion movies currently recording
    pub fn in_flight(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    /// Last published flag
    pub fn is_capturing(&self) -> bool {
        *self.in_progress.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.in_progress.subscribe()
    }

    fn publish(&self) -> bool {
        let mut capturing = false;
        self.in_progress.send_if_modified(|current| {
            capturing = self.count.load(Ordering::Acquire) > 0;
            if *current == capturing {
                return false;
            }
            *current = capturing;
            true
        });
        capturing
    }
}
