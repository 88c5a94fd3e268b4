use std::time::Duration;

/// Longest round trip the sender accepts as a measurement.
pub const MAX_PLAUSIBLE_RTT: Duration = Duration::from_secs(10);

/// Round-trip time statistics, updated once per completed report exchange.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RttStats {
    rtt: Duration,
    avg_rtt: Duration,
    min_rtt: Duration,
    max_rtt: Duration,
    samples: u64,
}

impl RttStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold in a new sample. The average is an exponentially weighted moving
    /// average with weight 1/8 for the newest sample.
    pub fn update(&mut self, rtt: Duration) {
        if self.samples == 0 {
            self.avg_rtt = rtt;
            self.min_rtt = rtt;
            self.max_rtt = rtt;
        } else {
            self.avg_rtt = self.avg_rtt.saturating_mul(7).saturating_add(rtt) / 8;
            self.min_rtt = self.min_rtt.min(rtt);
            self.max_rtt = self.max_rtt.max(rtt);
        }
        self.rtt = rtt;
        self.samples += 1;
    }

    /// True once at least one round trip has completed.
    pub fn is_available(&self) -> bool {
        self.samples > 0
    }

    pub fn rtt(&self) -> Duration {
        self.rtt
    }

    pub fn avg_rtt(&self) -> Duration {
        self.avg_rtt
    }

    pub fn min_rtt(&self) -> Duration {
        self.min_rtt
    }

    pub fn max_rtt(&self) -> Duration {
        self.max_rtt
    }

    pub fn samples(&self) -> u64 {
        self.samples
    }
}
