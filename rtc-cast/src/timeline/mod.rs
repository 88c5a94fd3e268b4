//! Frame Timeline Tracker.
//!
//! Remembers, for the most recently sent frames, when each was captured and
//! which media timestamp it carried, and keeps round-trip statistics.

pub mod rtt;

use crate::frame_id::FrameId;
use rtt::RttStats;
use std::time::{Duration, Instant};

#[derive(Debug, Copy, Clone)]
struct TimelineEntry {
    frame_id: FrameId,
    reference_time: Instant,
    rtp_timestamp: u32,
}

/// Bounded history mapping frame id to reference time and media timestamp.
///
/// Entries live in a ring indexed by frame id. The ring holds at least
/// `max_unacked_frames + 1` entries, rounded up to a power of two so that
/// consecutive ids stay in consecutive slots across the 32-bit wrap. Older
/// entries are overwritten as new frames are recorded.
pub struct FrameTimeline {
    entries: Vec<Option<TimelineEntry>>,
    mask: u32,
    rtt: RttStats,
}

impl FrameTimeline {
    pub fn new(max_unacked_frames: usize) -> Self {
        let size = (max_unacked_frames.max(1) + 1).next_power_of_two();
        Self {
            entries: vec![None; size],
            mask: size as u32 - 1,
            rtt: RttStats::new(),
        }
    }

    /// Number of frames the ring can remember.
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    fn slot(&self, frame_id: FrameId) -> usize {
        (frame_id.value() & self.mask) as usize
    }

    /// Record a frame that was just sent, overwriting whatever shared its slot.
    pub fn record(&mut self, frame_id: FrameId, reference_time: Instant, rtp_timestamp: u32) {
        let slot = self.slot(frame_id);
        self.entries[slot] = Some(TimelineEntry {
            frame_id,
            reference_time,
            rtp_timestamp,
        });
    }

    fn lookup(&self, frame_id: FrameId) -> Option<&TimelineEntry> {
        self.entries[self.slot(frame_id)]
            .as_ref()
            .filter(|entry| entry.frame_id == frame_id)
    }

    /// Reference time of a recently sent frame.
    ///
    /// Returns `None` when `frame_id` is not among the frames still held,
    /// which means the caller asked about a frame outside the window.
    pub fn lookup_reference_time(&self, frame_id: FrameId) -> Option<Instant> {
        self.lookup(frame_id).map(|entry| entry.reference_time)
    }

    /// Media timestamp of a recently sent frame.
    pub fn lookup_timestamp(&self, frame_id: FrameId) -> Option<u32> {
        self.lookup(frame_id).map(|entry| entry.rtp_timestamp)
    }

    pub fn is_rtt_available(&self) -> bool {
        self.rtt.is_available()
    }

    pub fn update_rtt(&mut self, sample: Duration) {
        self.rtt.update(sample);
    }

    pub fn rtt_stats(&self) -> &RttStats {
        &self.rtt
    }
}
