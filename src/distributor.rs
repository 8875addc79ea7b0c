//! Fan-out of camera frames to viewers
//!
//! One camera session feeds any number of viewers through a broadcast
//! channel. `Bytes` clones share the same allocation, so each frame is stored
//! once no matter how many viewers hold it. A viewer that falls behind skips
//! the oldest frames instead of stalling the camera session.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Distribution counters
#[derive(Debug, Clone, Default)]
pub struct DistributorStats {
    pub frames_published: u64,
    pub frames_unobserved: u64,
    pub viewers: usize,
    pub buffered: usize,
}

pub struct FrameDistributor {
    tx: broadcast::Sender<Bytes>,
    frames_published: AtomicU64,
    frames_unobserved: AtomicU64,
}

impl FrameDistributor {
    /// `capacity` is how many frames a viewer may fall behind before it
    /// starts skipping.
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity.max(1));

        debug!(capacity, "Frame distributor created");

        Self {
            tx,
            frames_published: AtomicU64::new(0),
            frames_unobserved: AtomicU64::new(0),
        }
    }

    /// Sends a frame to every current viewer
    ///
    /// Returns the number of viewers reached. A frame published while nobody
    /// is watching is counted and dropped.
    pub fn publish(&self, frame: Bytes) -> usize {
        self.frames_published.fetch_add(1, Ordering::Relaxed);

        match self.tx.send(frame) {
            Ok(n) => n,
            Err(_) => {
                self.frames_unobserved.fetch_add(1, Ordering::Relaxed);
                0
            }
        }
    }

    /// Callback suitable for `CameraStreamClient::start_stream`
    pub fn publisher(self: &Arc<Self>) -> impl FnMut(Bytes) + Send + 'static {
        let distributor = Arc::clone(self);
        move |frame| {
            distributor.publish(frame);
        }
    }

    pub fn subscribe(&self, name: impl Into<String>) -> Viewer {
        let viewer = Viewer {
            rx: self.tx.subscribe(),
            name: name.into(),
            frames_received: 0,
            frames_skipped: 0,
        };
        info!(viewer = %viewer.name, viewers = self.viewer_count(), "Viewer subscribed");
        viewer
    }

    pub fn viewer_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn stats(&self) -> DistributorStats {
        DistributorStats {
            frames_published: self.frames_published.load(Ordering::Relaxed),
            frames_unobserved: self.frames_unobserved.load(Ordering::Relaxed),
            viewers: self.viewer_count(),
            buffered: self.tx.len(),
        }
    }
}

/// Receiving end held by one viewer
pub struct Viewer {
    rx: broadcast::Receiver<Bytes>,
    name: String,
    frames_received: u64,
    frames_skipped: u64,
}

impl Viewer {
    /// Waits for the next frame
    ///
    /// Frames this viewer was too slow for are skipped transparently.
    /// Returns `None` once the distributor is gone.
    pub async fn recv(&mut self) -> Option<Bytes> {
        loop {
            match self.rx.recv().await {
                Ok(frame) => {
                    self.frames_received += 1;
                    return Some(frame);
                }
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    self.frames_skipped += n;
                    warn!(viewer = %self.name, skipped = n, "Viewer lagging, frames skipped");
                }
                Err(broadcast::error::RecvError::Closed) => {
                    debug!(viewer = %self.name, "Frame channel closed");
                    return None;
                }
            }
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn frames_received(&self) -> u64 {
        self.frames_received
    }

    pub fn frames_skipped(&self) -> u64 {
        self.frames_skipped
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_every_viewer_gets_the_frame() {
        let distributor = FrameDistributor::new(10);
        let mut a = distributor.subscribe("a");
        let mut b = distributor.subscribe("b");

        let frame = Bytes::from_static(b"frame");
        assert_eq!(distributor.publish(frame.clone()), 2);

        let fa = a.recv().await.unwrap();
        let fb = b.recv().await.unwrap();
        assert_eq!(fa, frame);
        assert_eq!(fb, frame);

        // Same backing storage for both viewers
        assert_eq!(fa.as_ptr(), fb.as_ptr());
    }

    #[tokio::test]
    async fn test_slow_viewer_skips() {
        let distributor = FrameDistributor::new(2);
        let mut slow = distributor.subscribe("slow");

        for i in 0..5u8 {
            distributor.publish(Bytes::from(vec![i]));
        }

        // Oldest frames were overwritten; the newest two remain
        assert_eq!(slow.recv().await.unwrap().as_ref(), &[3]);
        assert_eq!(slow.recv().await.unwrap().as_ref(), &[4]);
        assert_eq!(slow.frames_skipped(), 3);
        assert_eq!(slow.frames_received(), 2);
    }

    #[tokio::test]
    async fn test_no_viewers() {
        let distributor = FrameDistributor::new(10);
        assert_eq!(distributor.publish(Bytes::from_static(b"test")), 0);

        let stats = distributor.stats();
        assert_eq!(stats.frames_published, 1);
        assert_eq!(stats.frames_unobserved, 1);
        assert_eq!(stats.viewers, 0);
    }

    #[tokio::test]
    async fn test_publisher_callback_and_close() {
        let distributor = Arc::new(FrameDistributor::new(4));
        let mut viewer = distributor.subscribe("cb");
        let mut publish = distributor.publisher();

        publish(Bytes::from_static(b"one"));
        assert_eq!(viewer.recv().await.unwrap().as_ref(), b"one");

        drop(publish);
        drop(distributor);
        assert!(viewer.recv().await.is_none());
    }
}
