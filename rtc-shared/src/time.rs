use std::ops::Add;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

/// Offset in seconds between the unix epoch and the NTP epoch.
const NTP_UNIX_OFFSET_SECS: u64 = 0x83AA7E80;

/// Anchors a monotonic [`Instant`] to wall-clock time so that monotonic
/// timestamps can be expressed as NTP time in sender reports.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SystemInstant {
    instant: Instant,
    duration_since_unix_epoch: Duration,
}

impl SystemInstant {
    pub fn now() -> Self {
        Self {
            instant: Instant::now(),
            duration_since_unix_epoch: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_else(|_| Duration::from_secs(0)),
        }
    }

    /// Anchor `instant` at an explicit offset from the unix epoch.
    pub fn new(instant: Instant, duration_since_unix_epoch: Duration) -> Self {
        Self {
            instant,
            duration_since_unix_epoch,
        }
    }

    pub fn duration_since_unix_epoch(&self) -> Duration {
        self.duration_since_unix_epoch
    }

    /// Unix time of `now`. Instants earlier than the anchor saturate to it.
    pub fn unix(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.instant)
            .add(self.duration_since_unix_epoch)
    }

    pub fn ntp(&self, now: Instant) -> u64 {
        SystemInstant::unix2ntp(self.unix(now))
    }

    pub fn unix2ntp(duration_since_unix_epoch: Duration) -> u64 {
        let u = duration_since_unix_epoch.as_nanos() as u64;

        let mut s = u / 1_000_000_000;
        s += NTP_UNIX_OFFSET_SECS;
        let mut f = u % 1_000_000_000;
        f <<= 32;
        f /= 1_000_000_000;
        s <<= 32;

        s | f
    }
}

/// Video RTP clock rate.
pub const VIDEO_CLOCK_RATE: u32 = 90_000;

/// Maps monotonic time onto a wrapping 32-bit RTP media clock.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct MediaClock {
    origin: Instant,
    clock_rate: u32,
}

impl MediaClock {
    pub fn new(origin: Instant, clock_rate: u32) -> Self {
        Self { origin, clock_rate }
    }

    pub fn video(origin: Instant) -> Self {
        Self::new(origin, VIDEO_CLOCK_RATE)
    }

    pub fn clock_rate(&self) -> u32 {
        self.clock_rate
    }

    /// Media timestamp of `at`. Instants before the origin map to zero.
    pub fn rtp_timestamp(&self, at: Instant) -> u32 {
        self.rtp_delta(at.saturating_duration_since(self.origin))
    }

    /// Number of media clock ticks in `delta`, wrapped to 32 bits.
    pub fn rtp_delta(&self, delta: Duration) -> u32 {
        let ticks = delta.as_nanos() * self.clock_rate as u128 / 1_000_000_000;
        ticks as u32
    }
}
