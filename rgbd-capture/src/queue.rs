//! Shared frame queue filled by driver threads and drained by the capture loop.

use rgbd_data::{ProfileUid, StreamKind};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::trace;

/// Identity and format of the profile a frame was produced from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProfileDescriptor {
    pub uid: ProfileUid,
    pub kind: StreamKind,
    pub width: u32,
    pub height: u32,
    pub fps: u32,
}

/// One frame produced by a sensor.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Profile the frame was produced from.
    pub profile: ProfileDescriptor,
    /// Raw payload (RGB8 for color, little-endian Z16 for depth).
    pub data: Vec<u8>,
    /// Per-stream frame counter.
    pub frame_number: u64,
    /// Capture timestamp in seconds (relative to stream start).
    pub timestamp: f64,
}

impl Frame {
    pub fn new(
        profile: ProfileDescriptor,
        data: Vec<u8>,
        frame_number: u64,
        timestamp: f64,
    ) -> Self {
        Self {
            profile,
            data,
            frame_number,
            timestamp,
        }
    }
}

struct Inner {
    frames: Mutex<VecDeque<Frame>>,
    capacity: usize,
    dropped: AtomicU64,
}

/// Bounded multi-producer queue with a non-blocking [`poll`](FrameQueue::poll).
///
/// Clones share the same queue. When full, pushing drops the oldest frame.
#[derive(Clone)]
pub struct FrameQueue {
    inner: Arc<Inner>,
}

impl FrameQueue {
    /// Create a queue holding at most `capacity` frames (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            inner: Arc::new(Inner {
                frames: Mutex::new(VecDeque::with_capacity(capacity)),
                capacity,
                dropped: AtomicU64::new(0),
            }),
        }
    }

    fn frames(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        // A producer panicking mid-push leaves the deque itself consistent.
        self.inner
            .frames
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Enqueue a frame without blocking.
    pub fn push(&self, frame: Frame) {
        let mut frames = self.frames();
        if frames.len() == self.inner.capacity {
            if let Some(old) = frames.pop_front() {
                self.inner.dropped.fetch_add(1, Ordering::Relaxed);
                trace!(
                    "Queue full, dropped frame {} from profile {}",
                    old.frame_number, old.profile.uid
                );
            }
        }
        frames.push_back(frame);
    }

    /// Take the oldest frame if one is available.
    pub fn poll(&self) -> Option<Frame> {
        self.frames().pop_front()
    }

    pub fn len(&self) -> usize {
        self.frames().len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.inner.capacity
    }

    /// Frames discarded because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.inner.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for FrameQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameQueue")
            .field("len", &self.len())
            .field("capacity", &self.inner.capacity)
            .field("dropped", &self.dropped())
            .finish()
    }
}
