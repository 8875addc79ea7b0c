//! Camera client statistics

use serde::{Deserialize, Serialize};

/// Counters accumulated over every session of one client
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamStats {
    /// Complete JPEG frames extracted
    pub frames_received: u64,

    /// Bytes read from the camera connection
    pub bytes_received: u64,

    /// Bytes dropped when the receive buffer hit its cap
    pub bytes_discarded: u64,

    /// Connections that completed the handshake
    pub sessions_opened: u64,

    /// Sessions that ended with a transport error
    pub session_errors: u64,
}

impl StreamStats {
    /// Calculates frame rate based on delta
    pub fn calculate_fps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let frames_delta = self.frames_received.saturating_sub(previous.frames_received);
        frames_delta as f64 / elapsed_secs
    }

    /// Calculates bitrate in kbps based on delta
    pub fn calculate_bitrate_kbps(&self, previous: &Self, elapsed_secs: f64) -> f64 {
        if elapsed_secs == 0.0 {
            return 0.0;
        }

        let bytes_delta = self.bytes_received.saturating_sub(previous.bytes_received);
        (bytes_delta as f64 * 8.0) / elapsed_secs / 1000.0
    }

    /// Average size of an extracted frame in bytes
    pub fn average_frame_bytes(&self) -> u64 {
        if self.frames_received == 0 {
            return 0;
        }
        self.bytes_received / self.frames_received
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_calculate_fps() {
        let prev = StreamStats {
            frames_received: 100,
            ..Default::default()
        };

        let current = StreamStats {
            frames_received: 115,
            ..Default::default()
        };

        assert_eq!(current.calculate_fps(&prev, 1.0), 15.0);
        assert_eq!(current.calculate_fps(&prev, 0.0), 0.0);
    }

    #[test]
    fn test_calculate_bitrate() {
        let prev = StreamStats::default();
        let current = StreamStats {
            bytes_received: 125_000, // 125KB in 1 second = 1000 kbps
            ..Default::default()
        };

        assert_eq!(current.calculate_bitrate_kbps(&prev, 1.0), 1000.0);
    }

    #[test]
    fn test_average_frame_bytes() {
        let stats = StreamStats {
            frames_received: 4,
            bytes_received: 400_000,
            ..Default::default()
        };
        assert_eq!(stats.average_frame_bytes(), 100_000);
        assert_eq!(StreamStats::default().average_frame_bytes(), 0);
    }
}
