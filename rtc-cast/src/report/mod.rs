//! Report Scheduler.
//!
//! Owns the sender's two self-rescheduling timers:
//!
//! - **Status reports.** For the first reports of a session a report goes out
//!   with every sent frame so the receiver can lock onto playout timing
//!   quickly. Once those aggressive reports are used up, or as soon as the
//!   receiver proves it is synchronized by completing a round trip, reports
//!   fall back to a fixed interval.
//! - **Resend checks.** Armed when the first frame is sent, then re-armed after
//!   every check relative to the latest send time.
//!
//! Timers are plain deadlines polled through `poll_timeout` and fired through
//! `handle_timeout`. Cancelling or dropping the scheduler drops them.

use std::time::{Duration, Instant};

/// Reports sent with every frame at the start of a session.
pub const DEFAULT_AGGRESSIVE_REPORT_COUNT: usize = 100;
/// Resend checks are never scheduled closer than this.
const MIN_SCHEDULING_DELAY: Duration = Duration::from_millis(1);

/// Which timers fired during a `handle_timeout` call.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub struct ExpiredTimers {
    pub report: bool,
    pub resend_check: bool,
}

pub struct ReportScheduler {
    interval: Duration,
    aggressive_report_count: usize,
    aggressive_reports_sent: usize,
    next_report: Option<Instant>,

    resend_check_delay: Duration,
    next_resend_check: Option<Instant>,
}

impl ReportScheduler {
    pub fn new(
        interval: Duration,
        aggressive_report_count: usize,
        resend_check_delay: Duration,
    ) -> Self {
        Self {
            interval,
            aggressive_report_count,
            aggressive_reports_sent: 0,
            next_report: None,

            resend_check_delay,
            next_resend_check: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn is_aggressive(&self) -> bool {
        self.aggressive_reports_sent < self.aggressive_report_count
    }

    pub fn aggressive_reports_sent(&self) -> usize {
        self.aggressive_reports_sent
    }

    /// Account for a sent frame.
    ///
    /// Returns `Some(is_last_aggressive_report)` when a report must go out
    /// right now alongside the frame.
    pub fn on_frame_sent(&mut self, now: Instant) -> Option<bool> {
        if !self.is_aggressive() {
            if self.next_report.is_none() {
                self.next_report = Some(now + self.interval);
            }
            return None;
        }

        self.aggressive_reports_sent += 1;
        let is_last = !self.is_aggressive();
        if is_last {
            self.next_report = Some(now + self.interval);
        }
        Some(is_last)
    }

    /// Leave the aggressive phase early. Returns `true` if it was still active.
    pub fn stop_aggressive_reports(&mut self, now: Instant) -> bool {
        if !self.is_aggressive() {
            return false;
        }
        self.aggressive_reports_sent = self.aggressive_report_count;
        self.next_report = Some(now + self.interval);
        true
    }

    /// Arm the resend check for one playout delay after `last_send_time`.
    pub fn schedule_next_resend_check(&mut self, last_send_time: Instant, now: Instant) {
        let due = last_send_time + self.resend_check_delay;
        self.next_resend_check = Some(due.max(now + MIN_SCHEDULING_DELAY));
    }

    pub fn is_resend_check_armed(&self) -> bool {
        self.next_resend_check.is_some()
    }

    pub fn poll_timeout(&self) -> Option<Instant> {
        match (self.next_report, self.next_resend_check) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Fire every timer due at `now`.
    ///
    /// The report timer re-arms itself. The resend check is disarmed; the
    /// caller re-arms it once it has acted on the check.
    pub fn handle_timeout(&mut self, now: Instant) -> ExpiredTimers {
        let mut expired = ExpiredTimers::default();

        if let Some(eto) = self.next_report
            && eto <= now
        {
            self.next_report = Some(now + self.interval);
            expired.report = true;
        }

        if let Some(eto) = self.next_resend_check
            && eto <= now
        {
            self.next_resend_check = None;
            expired.resend_check = true;
        }

        expired
    }

    /// Disarm both timers.
    pub fn cancel(&mut self) {
        self.next_report = None;
        self.next_resend_check = None;
    }
}
