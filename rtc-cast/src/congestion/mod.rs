//! Congestion Controller.
//!
//! Turns send/ack telemetry and RTT samples into a bitrate recommendation.
//!
//! The estimator keeps a window of recently sent frames. Whenever frames are
//! acknowledged, the acknowledged bits are divided by the time the link was
//! actually busy delivering them (time during which nothing was outstanding
//! does not count), giving a throughput sample that is folded into a smoothed
//! estimate. A sample of the round-trip time that jumps well above the
//! smoothed RTT backs the estimate off multiplicatively.
//!
//! The recommended bitrate then asks: if every frame still in flight drains at
//! the estimated throughput, how much of the playout delay is left for the
//! next frame? A full budget permits slightly more than the estimate, an
//! exhausted one falls to the configured minimum.

use crate::frame_id::FrameId;
use crate::timeline::rtt::MAX_PLAUSIBLE_RTT;
use log::trace;
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Frames remembered for throughput estimation.
const HISTORY_SIZE: usize = 100;
/// Weight of a new throughput sample.
const THROUGHPUT_SMOOTHING: f64 = 0.1;
/// An RTT sample this much above the smoothed RTT counts as growing delay.
const RTT_GROWTH_THRESHOLD: f64 = 1.25;
/// Multiplicative decrease applied when delay grows.
const RTT_BACKOFF: f64 = 0.85;
/// Fraction of the playout delay the sender aims to keep free.
const TARGET_EMPTY_BUFFER_FRACTION: f64 = 0.9;
/// Shortest busy period used for a throughput sample.
const MIN_BUSY_TIME: Duration = Duration::from_millis(1);

#[derive(Debug, Clone)]
struct FrameStats {
    frame_id: FrameId,
    size_bits: u64,
    send_time: Instant,
    ack_time: Option<Instant>,
}

/// Bitrate recommendation bounded to `[min_bitrate, max_bitrate]`.
pub struct CongestionControl {
    min_bitrate: u32,
    max_bitrate: u32,

    history: VecDeque<FrameStats>,
    history_size: usize,

    last_acked: Option<FrameId>,
    last_ack_time: Option<Instant>,

    /// Smoothed achievable throughput in bits per second.
    throughput_estimate: f64,
    smoothed_rtt: Option<Duration>,
}

impl CongestionControl {
    pub fn new(
        min_bitrate: u32,
        max_bitrate: u32,
        start_bitrate: u32,
        max_unacked_frames: usize,
    ) -> Self {
        let max_bitrate = max_bitrate.max(min_bitrate);
        Self {
            min_bitrate,
            max_bitrate,

            history: VecDeque::new(),
            history_size: HISTORY_SIZE.max(max_unacked_frames + 1),

            last_acked: None,
            last_ack_time: None,

            throughput_estimate: start_bitrate.clamp(min_bitrate, max_bitrate) as f64,
            smoothed_rtt: None,
        }
    }

    /// Smoothed throughput estimate in bits per second.
    pub fn throughput_estimate(&self) -> f64 {
        self.throughput_estimate
    }

    pub fn smoothed_rtt(&self) -> Option<Duration> {
        self.smoothed_rtt
    }

    /// Bits sent but not yet acknowledged.
    pub fn bits_in_flight(&self) -> u64 {
        self.history
            .iter()
            .filter(|stats| stats.ack_time.is_none())
            .map(|stats| stats.size_bits)
            .sum()
    }

    fn clamp_estimate(&mut self) {
        let floor = self.min_bitrate as f64;
        let ceiling = 2.0 * self.max_bitrate as f64;
        self.throughput_estimate = self.throughput_estimate.clamp(floor, ceiling);
    }

    /// Fold a round-trip time sample into the smoothed RTT, backing off the
    /// throughput estimate if delay is growing.
    pub fn update_rtt(&mut self, rtt: Duration) {
        let rtt = rtt.min(MAX_PLAUSIBLE_RTT);
        self.smoothed_rtt = Some(match self.smoothed_rtt {
            None => rtt,
            Some(smoothed) => {
                if rtt.as_secs_f64() > smoothed.as_secs_f64() * RTT_GROWTH_THRESHOLD {
                    self.throughput_estimate *= RTT_BACKOFF;
                    self.clamp_estimate();
                    trace!(
                        "rtt grew to {:?} (smoothed {:?}), throughput estimate now {:.0} bps",
                        rtt,
                        smoothed,
                        self.throughput_estimate
                    );
                }
                smoothed.saturating_mul(7).saturating_add(rtt) / 8
            }
        });
    }

    /// Record a frame as newly in flight.
    pub fn send_frame_to_transport(&mut self, frame_id: FrameId, size_bits: u64, send_time: Instant) {
        if let Some(last) = self.history.back()
            && !frame_id.is_newer_than(last.frame_id)
        {
            return;
        }
        if let Some(acked) = self.last_acked
            && !frame_id.is_newer_than(acked)
        {
            return;
        }

        self.history.push_back(FrameStats {
            frame_id,
            size_bits,
            send_time,
            ack_time: None,
        });
        while self.history.len() > self.history_size {
            self.history.pop_front();
        }
    }

    /// Mark `frame_id`, and every frame before it, acknowledged at `ack_time`.
    pub fn ack_frame(&mut self, frame_id: FrameId, ack_time: Instant) {
        if let Some(acked) = self.last_acked
            && !frame_id.is_newer_than(acked)
        {
            return;
        }

        let mut newly_acked = false;
        for stats in self.history.iter_mut() {
            if stats.frame_id.is_newer_than(frame_id) {
                break;
            }
            if stats.ack_time.is_none() {
                stats.ack_time = Some(ack_time);
                newly_acked = true;
            }
        }

        self.last_acked = Some(frame_id);
        self.last_ack_time = Some(ack_time);

        if newly_acked && let Some(sample) = self.throughput_sample() {
            self.throughput_estimate = (1.0 - THROUGHPUT_SMOOTHING) * self.throughput_estimate
                + THROUGHPUT_SMOOTHING * sample;
            self.clamp_estimate();
            trace!(
                "ack {}: throughput sample {:.0} bps, estimate {:.0} bps",
                frame_id,
                sample,
                self.throughput_estimate
            );
        }
    }

    /// Acknowledged bits over the time the link spent delivering them.
    fn throughput_sample(&self) -> Option<f64> {
        let mut acked_bits = 0u64;
        let mut busy = Duration::ZERO;
        let mut previous_ack: Option<Instant> = None;

        for stats in &self.history {
            let Some(ack_time) = stats.ack_time else {
                continue;
            };
            let start = match previous_ack {
                Some(previous) => previous.max(stats.send_time),
                None => stats.send_time,
            };
            busy += ack_time.saturating_duration_since(start);
            acked_bits += stats.size_bits;
            previous_ack = Some(ack_time);
        }

        if acked_bits == 0 {
            return None;
        }
        Some(acked_bits as f64 / busy.max(MIN_BUSY_TIME).as_secs_f64())
    }

    /// When every frame in flight would have reached the receiver, draining at
    /// `bitrate`. `None` when nothing has ever been sent or acknowledged.
    fn estimated_drain_time(&self, bitrate: f64) -> Option<Instant> {
        let mut drained = self.last_ack_time;
        for stats in self.history.iter().filter(|stats| stats.ack_time.is_none()) {
            let start = match drained {
                Some(t) => t.max(stats.send_time),
                None => stats.send_time,
            };
            drained = Some(start + Duration::from_secs_f64(stats.size_bits as f64 / bitrate));
        }
        drained.map(|t| t + self.smoothed_rtt.unwrap_or_default() / 2)
    }

    /// Recommended bitrate for a frame that must play out at `playout_time`,
    /// given a total budget of `playout_delay`.
    pub fn get_bitrate(&self, playout_time: Instant, playout_delay: Duration) -> u32 {
        let estimate = self.throughput_estimate;

        let empty_buffer_fraction = match self.estimated_drain_time(estimate) {
            None => 1.0,
            Some(drained) if playout_delay.is_zero() || drained >= playout_time => 0.0,
            Some(drained) => {
                let remaining = playout_time.duration_since(drained);
                (remaining.as_secs_f64() / playout_delay.as_secs_f64()).min(1.0)
            }
        };

        let bitrate = estimate * empty_buffer_fraction / TARGET_EMPTY_BUFFER_FRACTION;
        let bitrate = bitrate.clamp(self.min_bitrate as f64, self.max_bitrate as f64) as u32;
        trace!(
            "bitrate {} bps (estimate {:.0} bps, empty buffer fraction {:.2})",
            bitrate,
            estimate,
            empty_buffer_fraction
        );
        bitrate
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MIN: u32 = 300_000;
    const MAX: u32 = 5_000_000;
    const DELAY: Duration = Duration::from_millis(400);
    const FRAME_INTERVAL: Duration = Duration::from_millis(33);

    fn controller() -> CongestionControl {
        CongestionControl::new(MIN, MAX, 1_000_000, 12)
    }

    #[test]
    fn test_initial_bitrate_is_bounded() {
        let cc = controller();
        let now = Instant::now();
        let bitrate = cc.get_bitrate(now + DELAY, DELAY);
        assert!((MIN..=MAX).contains(&bitrate));
        // Nothing in flight: the full estimate, with headroom.
        assert_eq!(bitrate, (1_000_000f64 / TARGET_EMPTY_BUFFER_FRACTION) as u32);
    }

    #[test]
    fn test_start_bitrate_is_clamped() {
        let cc = CongestionControl::new(MIN, MAX, 10, 12);
        assert_eq!(cc.throughput_estimate(), MIN as f64);
    }

    #[test]
    fn test_bitrate_drops_when_acks_stall() {
        let mut cc = controller();
        let base = Instant::now();

        let mut previous = cc.get_bitrate(base + DELAY, DELAY);
        let mut now = base;
        for i in 0..20u32 {
            cc.send_frame_to_transport(FrameId::new(i), 60_000, now);
            now += FRAME_INTERVAL;
            let bitrate = cc.get_bitrate(now + DELAY, DELAY);
            assert!(bitrate <= previous, "frame {i}: {bitrate} > {previous}");
            previous = bitrate;
        }
        assert_eq!(previous, MIN);
    }

    #[test]
    fn test_bitrate_never_leaves_bounds() {
        let mut cc = controller();
        let base = Instant::now();
        for i in 0..50u32 {
            let now = base + FRAME_INTERVAL * i;
            cc.send_frame_to_transport(FrameId::new(i), 1_000, now);
            cc.ack_frame(FrameId::new(i), now + Duration::from_micros(100));
            let bitrate = cc.get_bitrate(now + DELAY, DELAY);
            assert!((MIN..=MAX).contains(&bitrate));
        }
        // Acks arrive almost instantly: the estimate climbs to its ceiling and
        // the recommendation is pinned at the configured maximum.
        assert_eq!(cc.get_bitrate(base + FRAME_INTERVAL * 50 + DELAY, DELAY), MAX);
    }

    #[test]
    fn test_timely_acks_raise_bitrate() {
        let mut cc = controller();
        let base = Instant::now();
        let before = cc.get_bitrate(base + DELAY, DELAY);

        for i in 0..30u32 {
            let now = base + FRAME_INTERVAL * i;
            // ~1 Mbps of frames delivered in 5 ms each.
            cc.send_frame_to_transport(FrameId::new(i), 33_000, now);
            cc.ack_frame(FrameId::new(i), now + Duration::from_millis(5));
        }
        let after = cc.get_bitrate(base + FRAME_INTERVAL * 30 + DELAY, DELAY);
        assert!(after > before, "{after} <= {before}");
    }

    #[test]
    fn test_growing_rtt_lowers_estimate() {
        let mut cc = controller();
        cc.update_rtt(Duration::from_millis(50));
        let estimate = cc.throughput_estimate();

        cc.update_rtt(Duration::from_millis(52));
        assert_eq!(cc.throughput_estimate(), estimate);

        cc.update_rtt(Duration::from_millis(200));
        assert!(cc.throughput_estimate() < estimate);
    }

    #[test]
    fn test_huge_rtt_is_capped() {
        let mut cc = controller();
        cc.update_rtt(Duration::MAX);
        assert_eq!(cc.smoothed_rtt(), Some(MAX_PLAUSIBLE_RTT));
        cc.update_rtt(Duration::MAX);
        assert_eq!(cc.smoothed_rtt(), Some(MAX_PLAUSIBLE_RTT));

        let t0 = Instant::now();
        cc.send_frame_to_transport(FrameId::new(0), 40_000, t0);
        let bitrate = cc.get_bitrate(t0 + DELAY, DELAY);
        assert!((MIN..=MAX).contains(&bitrate));
    }

    #[test]
    fn test_ack_releases_bits_in_flight() {
        let mut cc = controller();
        let base = Instant::now();
        for i in 0..4u32 {
            cc.send_frame_to_transport(FrameId::new(i), 1_000, base);
        }
        assert_eq!(cc.bits_in_flight(), 4_000);

        cc.ack_frame(FrameId::new(1), base + Duration::from_millis(10));
        assert_eq!(cc.bits_in_flight(), 2_000);

        // Stale ack changes nothing.
        cc.ack_frame(FrameId::new(0), base + Duration::from_millis(20));
        assert_eq!(cc.bits_in_flight(), 2_000);

        cc.ack_frame(FrameId::new(3), base + Duration::from_millis(30));
        assert_eq!(cc.bits_in_flight(), 0);
    }

    #[test]
    fn test_history_is_bounded() {
        let mut cc = controller();
        let base = Instant::now();
        for i in 0..(HISTORY_SIZE as u32 * 2) {
            cc.send_frame_to_transport(FrameId::new(i), 8, base);
        }
        assert_eq!(cc.history.len(), HISTORY_SIZE);
    }

    #[test]
    fn test_ids_across_wraparound() {
        let mut cc = controller();
        let base = Instant::now();
        let first = FrameId::new(u32::MAX - 1);
        for i in 0..4u32 {
            cc.send_frame_to_transport(first.wrapping_add(i), 1_000, base);
        }
        cc.ack_frame(FrameId::new(0), base + Duration::from_millis(10));
        assert_eq!(cc.bits_in_flight(), 1_000);
    }
}
