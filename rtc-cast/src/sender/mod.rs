//! Video Sender Orchestrator.
//!
//! [`VideoSender`] owns the timeline, the congestion controller and the report
//! scheduler. It decides which captured frames are encoded, hands encoded
//! frames to the transport, and turns receiver feedback into cancellations
//! and kickstart resends.

use crate::config::VideoSenderConfig;
use crate::congestion::CongestionControl;
use crate::encoder::{EncoderFactory, EncoderVariant, VideoEncoder};
use crate::event::{FrameEvent, FrameEventKind};
use crate::feedback::{CastFeedback, CastMessage};
use crate::frame::{EncodedVideoFrame, RawVideoFrame};
use crate::frame_id::FrameId;
use crate::report::{DEFAULT_AGGRESSIVE_REPORT_COUNT, ReportScheduler};
use crate::timeline::FrameTimeline;
use crate::timeline::rtt::{MAX_PLAUSIBLE_RTT, RttStats};
use crate::transport::{TransportCommand, TransportRegistrar};
use log::{debug, error, info, trace, warn};
use shared::Tagged;
use shared::error::{Error, Result};
use shared::time::{MediaClock, SystemInstant};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// Whether construction completed. There is no way back to `Initialized`
/// once construction failed.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum InitializationStatus {
    #[default]
    Uninitialized,
    Initialized,
}

/// Builder for a [`VideoSender`].
///
/// # Example
///
/// ```ignore
/// let sender = VideoSenderBuilder::new(config)
///     .with_report_interval(Duration::from_millis(250))
///     .with_aggressive_report_count(10)
///     .build(&mut encoder_factory, &mut transport)?;
/// ```
pub struct VideoSenderBuilder {
    config: VideoSenderConfig,
    aggressive_report_count: usize,
    time_baseline: Option<SystemInstant>,
    start_time: Option<Instant>,
}

impl VideoSenderBuilder {
    pub fn new(config: VideoSenderConfig) -> Self {
        Self {
            config,
            aggressive_report_count: DEFAULT_AGGRESSIVE_REPORT_COUNT,
            time_baseline: None,
            start_time: None,
        }
    }

    /// with_report_interval sets the periodic status report interval,
    /// overriding the configured RTCP interval.
    pub fn with_report_interval(mut self, interval: Duration) -> Self {
        self.config.rtcp_interval = interval;
        self
    }

    /// with_aggressive_report_count sets how many frames at the start of a
    /// session are each accompanied by a status report.
    pub fn with_aggressive_report_count(mut self, count: usize) -> Self {
        self.aggressive_report_count = count;
        self
    }

    /// with_time_baseline pins the mapping from monotonic to wall clock time
    /// used for report NTP timestamps.
    pub fn with_time_baseline(mut self, baseline: SystemInstant) -> Self {
        self.time_baseline = Some(baseline);
        self
    }

    /// with_start_time anchors the media clock used for capture events.
    /// Defaults to the capture time of the first inserted frame.
    pub fn with_start_time(mut self, start_time: Instant) -> Self {
        self.start_time = Some(start_time);
        self
    }

    /// Build the sender, failing if it could not be initialized.
    pub fn build(
        self,
        encoder_factory: &mut dyn EncoderFactory,
        transport: &mut dyn TransportRegistrar,
    ) -> Result<VideoSender> {
        let mut sender = VideoSender::with_settings(
            self.config,
            self.aggressive_report_count,
            self.time_baseline.unwrap_or_else(SystemInstant::now),
            self.start_time.map(MediaClock::video),
            encoder_factory,
            transport,
        );
        if let Some(err) = sender.initialization_error.take() {
            return Err(err);
        }
        Ok(sender)
    }
}

/// Sends one video stream.
///
/// A sans-I/O state machine: the owner feeds captured frames through
/// `handle_write`, encoder completions through `handle_event`, transport
/// feedback through `handle_read`, and drives the timers with
/// `poll_timeout`/`handle_timeout`. Requests for the transport come out of
/// `poll_write` and the frame event log out of `poll_event`.
pub struct VideoSender {
    config: VideoSenderConfig,
    status: InitializationStatus,
    initialization_error: Option<Error>,

    encoder: Option<Box<dyn VideoEncoder>>,
    /// Set for the hardware variant, whose bitrate never follows congestion.
    fixed_bitrate: Option<u32>,
    max_unacked_frames: usize,

    timeline: FrameTimeline,
    congestion: CongestionControl,
    scheduler: ReportScheduler,

    time_baseline: SystemInstant,
    media_clock: Option<MediaClock>,

    frames_in_encoder: usize,
    last_sent_frame_id: Option<FrameId>,
    last_send_time: Option<Instant>,
    latest_acked_frame_id: FrameId,
    duplicate_ack_counter: u32,
    /// max(rtt, avg_rtt) of the latest sample.
    effective_rtt: Duration,

    write_queue: VecDeque<TransportCommand>,
    event_queue: VecDeque<FrameEvent>,
    closed: bool,
}

impl VideoSender {
    /// Create a sender and register it with the encoder and transport.
    ///
    /// Never fails outright: if registration fails the sender stays
    /// [`InitializationStatus::Uninitialized`] and rejects every operation.
    /// Check [`initialization_status`](Self::initialization_status) before use.
    pub fn new(
        config: VideoSenderConfig,
        encoder_factory: &mut dyn EncoderFactory,
        transport: &mut dyn TransportRegistrar,
    ) -> Self {
        Self::with_settings(
            config,
            DEFAULT_AGGRESSIVE_REPORT_COUNT,
            SystemInstant::now(),
            None,
            encoder_factory,
            transport,
        )
    }

    fn with_settings(
        config: VideoSenderConfig,
        aggressive_report_count: usize,
        time_baseline: SystemInstant,
        media_clock: Option<MediaClock>,
        encoder_factory: &mut dyn EncoderFactory,
        transport: &mut dyn TransportRegistrar,
    ) -> Self {
        let max_unacked_frames = config.max_unacked_frames();

        let mut sender = Self {
            status: InitializationStatus::Uninitialized,
            initialization_error: None,

            encoder: None,
            fixed_bitrate: config.fixed_bitrate(),
            max_unacked_frames,

            timeline: FrameTimeline::new(max_unacked_frames),
            congestion: CongestionControl::new(
                config.min_bitrate,
                config.max_bitrate,
                config.start_bitrate,
                max_unacked_frames,
            ),
            scheduler: ReportScheduler::new(
                config.rtcp_interval,
                aggressive_report_count,
                config.target_playout_delay,
            ),

            time_baseline,
            media_clock,

            frames_in_encoder: 0,
            last_sent_frame_id: None,
            last_send_time: None,
            latest_acked_frame_id: FrameId::default(),
            duplicate_ack_counter: 0,
            effective_rtt: Duration::ZERO,

            write_queue: VecDeque::new(),
            event_queue: VecDeque::new(),
            closed: false,

            config,
        };

        match sender.initialize(encoder_factory, transport) {
            Ok(encoder) => {
                sender.encoder = Some(encoder);
                sender.status = InitializationStatus::Initialized;
                info!(
                    "video sender ssrc {}: max unacked frames {}, target playout delay {:?}, max frame rate {}",
                    sender.config.ssrc,
                    sender.max_unacked_frames,
                    sender.config.target_playout_delay,
                    sender.config.max_frame_rate
                );
            }
            Err(err) => {
                error!(
                    "video sender ssrc {} failed to initialize: {}",
                    sender.config.ssrc, err
                );
                sender.initialization_error = Some(err);
            }
        }

        sender
    }

    fn initialize(
        &self,
        encoder_factory: &mut dyn EncoderFactory,
        transport: &mut dyn TransportRegistrar,
    ) -> Result<Box<dyn VideoEncoder>> {
        self.config.validate()?;

        let encoder = EncoderVariant::from_config(&self.config)
            .create(encoder_factory, &self.config)
            .map_err(|err| match err {
                Error::ErrEncoderInitialization(_) => err,
                other => Error::ErrEncoderInitialization(other.to_string()),
            })?;

        transport
            .initialize_video(&self.config.transport_config())
            .map_err(|err| match err {
                Error::ErrTransportInitialization(_) => err,
                other => Error::ErrTransportInitialization(other.to_string()),
            })?;

        Ok(encoder)
    }

    pub fn initialization_status(&self) -> InitializationStatus {
        self.status
    }

    /// Why construction failed, if it did.
    pub fn initialization_error(&self) -> Option<&Error> {
        self.initialization_error.as_ref()
    }

    pub fn config(&self) -> &VideoSenderConfig {
        &self.config
    }

    pub fn max_unacked_frames(&self) -> usize {
        self.max_unacked_frames
    }

    pub fn frames_in_encoder(&self) -> usize {
        self.frames_in_encoder
    }

    /// `None` until the first frame has been sent.
    pub fn last_sent_frame_id(&self) -> Option<FrameId> {
        self.last_sent_frame_id
    }

    /// Meaningful only once a frame has been sent.
    pub fn latest_acked_frame_id(&self) -> FrameId {
        self.latest_acked_frame_id
    }

    pub fn duplicate_ack_counter(&self) -> u32 {
        self.duplicate_ack_counter
    }

    pub fn rtt_stats(&self) -> &RttStats {
        self.timeline.rtt_stats()
    }

    pub fn effective_rtt(&self) -> Duration {
        self.effective_rtt
    }

    pub fn is_closed(&self) -> bool {
        self.closed
    }

    fn check_ready(&self) -> Result<()> {
        if self.status != InitializationStatus::Initialized {
            return Err(Error::ErrSenderUninitialized);
        }
        if self.closed {
            return Err(Error::ErrSenderClosed);
        }
        Ok(())
    }

    fn encoder_mut(&mut self) -> Result<&mut Box<dyn VideoEncoder>> {
        self.encoder.as_mut().ok_or(Error::ErrSenderUninitialized)
    }

    fn media_clock(&mut self, at: Instant) -> MediaClock {
        *self.media_clock.get_or_insert_with(|| MediaClock::video(at))
    }

    /// Frames sent but not acknowledged, not counting those in the encoder.
    fn frames_sent_in_flight(&self) -> usize {
        match self.last_sent_frame_id {
            Some(last_sent) => last_sent.distance_from(self.latest_acked_frame_id).max(0) as usize,
            None => 0,
        }
    }

    /// Whether a frame captured at `capture_time` must be dropped to keep the
    /// number and age of frames in flight within bounds.
    pub fn should_drop_next_frame(&self, capture_time: Instant) -> bool {
        let sent_in_flight = self.frames_sent_in_flight();
        let duration_in_flight = if sent_in_flight > 0 {
            self.timeline
                .lookup_reference_time(self.latest_acked_frame_id.next())
                .map(|oldest| capture_time.saturating_duration_since(oldest))
                .unwrap_or_default()
        } else {
            Duration::ZERO
        };
        let frames_in_flight = sent_in_flight + self.frames_in_encoder;

        let delay = self.config.target_playout_delay;
        trace!(
            "frames in flight {} (last sent {:?}, latest acked {}, in encoder {}), \
             duration in flight {:?} ({:.1}% of {:?})",
            frames_in_flight,
            self.last_sent_frame_id,
            self.latest_acked_frame_id,
            self.frames_in_encoder,
            duration_in_flight,
            100.0 * duration_in_flight.as_secs_f64() / delay.as_secs_f64(),
            delay
        );

        if frames_in_flight >= self.max_unacked_frames {
            debug!(
                "dropping frame: {} frames in flight, limit {}",
                frames_in_flight, self.max_unacked_frames
            );
            return true;
        }
        if duration_in_flight >= delay {
            debug!(
                "dropping frame: oldest frame in flight for {:?}, playout delay {:?}",
                duration_in_flight, delay
            );
            return true;
        }
        false
    }

    fn insert_raw_video_frame(&mut self, now: Instant, raw: RawVideoFrame) -> Result<()> {
        self.check_ready()?;

        let capture_time = raw.capture_time;
        let rtp_timestamp = self.media_clock(capture_time).rtp_timestamp(capture_time);
        self.event_queue.push_back(FrameEvent::capture(
            capture_time,
            FrameEventKind::CaptureBegin,
            rtp_timestamp,
        ));
        self.event_queue.push_back(FrameEvent::capture(
            now,
            FrameEventKind::CaptureEnd,
            rtp_timestamp,
        ));

        if self.should_drop_next_frame(capture_time) {
            return Ok(());
        }

        let first_frame_pending = self.last_sent_frame_id.is_none();
        let bitrate = match self.fixed_bitrate {
            Some(fixed) => {
                // Changing a hardware encoder's bitrate glitches the picture,
                // so it is only set until the first frame goes out.
                if first_frame_pending {
                    self.encoder_mut()?.set_bit_rate(fixed);
                }
                fixed
            }
            None => {
                let delay = self.config.target_playout_delay;
                let bitrate = self.congestion.get_bitrate(capture_time + delay, delay);
                self.encoder_mut()?.set_bit_rate(bitrate);
                bitrate
            }
        };

        if self
            .encoder_mut()?
            .encode(&raw.frame, capture_time, bitrate)
        {
            self.frames_in_encoder += 1;
        } else {
            debug!("encoder rejected frame captured at {:?}", capture_time);
        }
        Ok(())
    }

    fn on_encoded(&mut self, now: Instant, encoded: EncodedVideoFrame) -> Result<()> {
        self.check_ready()?;
        if self.frames_in_encoder == 0 {
            return Err(Error::ErrNoFramesInEncoder);
        }
        self.frames_in_encoder -= 1;

        let EncodedVideoFrame {
            requested_bitrate,
            mut frame,
        } = encoded;
        let frame_id = frame.frame_id;

        if frame.is_key_frame() {
            debug!(
                "sending key frame {} ({} bytes, rtp timestamp {})",
                frame_id,
                frame.data.len(),
                frame.rtp_timestamp
            );
        }

        if self.last_sent_frame_id.is_none() {
            // Nothing can have been acknowledged before the first frame.
            self.latest_acked_frame_id = frame_id.prev();
            self.last_sent_frame_id = Some(frame_id);
            self.last_send_time = Some(now);
            self.scheduler.schedule_next_resend_check(now, now);
        } else {
            self.last_sent_frame_id = Some(frame_id);
            self.last_send_time = Some(now);
        }

        self.timeline
            .record(frame_id, frame.reference_time, frame.rtp_timestamp);

        if let Some(is_last) = self.scheduler.on_frame_sent(now) {
            if is_last {
                debug!("sending last aggressive report with frame {}", frame_id);
            }
            self.send_rtcp_report(now);
        }

        self.congestion
            .send_frame_to_transport(frame_id, frame.size_bits(), now);

        self.event_queue.push_back(FrameEvent::frame(
            now,
            FrameEventKind::Encoded {
                size: frame.data.len(),
                key_frame: frame.is_key_frame(),
                target_bitrate: requested_bitrate,
            },
            Some(frame.rtp_timestamp),
            frame_id,
        ));

        if self.config.send_target_playout_delay {
            let delay_ms = self.config.target_playout_delay.as_millis();
            frame.new_playout_delay_ms = Some(delay_ms.min(u16::MAX as u128) as u16);
        }

        self.write_queue
            .push_back(TransportCommand::InsertFrame(frame));
        Ok(())
    }

    /// Queue a status report for the last sent frame. Skipped before any
    /// frame has been sent.
    fn send_rtcp_report(&mut self, now: Instant) {
        let Some(last_sent) = self.last_sent_frame_id else {
            trace!("no frame sent yet, skipping status report");
            return;
        };
        let (Some(reference_time), Some(rtp_timestamp)) = (
            self.timeline.lookup_reference_time(last_sent),
            self.timeline.lookup_timestamp(last_sent),
        ) else {
            warn!("frame {} missing from timeline, skipping status report", last_sent);
            return;
        };

        let elapsed = MediaClock::video(reference_time).rtp_timestamp(now);
        self.write_queue.push_back(TransportCommand::SendSenderReport {
            ssrc: self.config.ssrc,
            ntp_time: self.time_baseline.ntp(now),
            rtp_timestamp: rtp_timestamp.wrapping_add(elapsed),
        });
    }

    fn on_rtt(&mut self, now: Instant, rtt: Duration) {
        if rtt.is_zero() {
            return;
        }
        if rtt > MAX_PLAUSIBLE_RTT {
            warn!("ignoring implausible rtt sample {:?}", rtt);
            return;
        }
        self.timeline.update_rtt(rtt);
        self.congestion.update_rtt(rtt);

        let stats = self.timeline.rtt_stats();
        self.effective_rtt = stats.rtt().max(stats.avg_rtt());
        trace!(
            "rtt {:?} (avg {:?}, min {:?}, max {:?})",
            stats.rtt(),
            stats.avg_rtt(),
            stats.min_rtt(),
            stats.max_rtt()
        );

        // A round trip proves the receiver has synchronized.
        if self.scheduler.stop_aggressive_reports(now) {
            debug!("receiver synchronized, switching to periodic status reports");
        }
    }

    fn on_feedback(&mut self, now: Instant, feedback: CastFeedback) -> Result<()> {
        self.check_ready()?;

        let Some(last_sent) = self.last_sent_frame_id else {
            trace!("ignoring feedback received before any frame was sent");
            return Ok(());
        };

        if let Some(rtt) = feedback.rtt {
            self.on_rtt(now, rtt);
        }

        let ack = feedback.ack_frame_id;
        if ack.is_newer_than(last_sent) {
            warn!(
                "ignoring ack for frame {} which was never sent (last sent {})",
                ack, last_sent
            );
            return Ok(());
        }

        if feedback.is_nack() {
            self.duplicate_ack_counter = 0;
        } else {
            self.encoder_mut()?.latest_frame_id_to_reference(ack);

            if ack == self.latest_acked_frame_id && last_sent.is_newer_than(ack) {
                self.duplicate_ack_counter += 1;
            } else {
                self.duplicate_ack_counter = 0;
            }
            if self.duplicate_ack_counter >= 2 && self.duplicate_ack_counter % 3 == 2 {
                debug!(
                    "received {} duplicate acks for frame {}",
                    self.duplicate_ack_counter, ack
                );
                self.resend_for_kickstart(now);
            }
        }

        self.event_queue.push_back(FrameEvent::frame(
            now,
            FrameEventKind::AckReceived,
            self.timeline.lookup_timestamp(ack),
            ack,
        ));
        self.congestion.ack_frame(ack, now);

        let out_of_order = ack.is_older_than(self.latest_acked_frame_id);
        trace!(
            "received ack {}{}",
            ack,
            if out_of_order { " (out of order)" } else { "" }
        );
        if out_of_order {
            return Ok(());
        }

        let mut cancelled = vec![];
        while self.latest_acked_frame_id != ack {
            self.latest_acked_frame_id = self.latest_acked_frame_id.next();
            cancelled.push(self.latest_acked_frame_id);
        }
        if !cancelled.is_empty() {
            self.write_queue.push_back(TransportCommand::CancelSendingFrames {
                ssrc: self.config.ssrc,
                frame_ids: cancelled,
            });
        }
        Ok(())
    }

    /// Resend the oldest unacknowledged frame so a stalled receiver reports
    /// what it is missing.
    fn resend_for_kickstart(&mut self, now: Instant) {
        let Some(last_sent) = self.last_sent_frame_id else {
            return;
        };
        if self.latest_acked_frame_id == last_sent {
            return;
        }
        let frame_id = self.latest_acked_frame_id.next();
        debug!("kickstart resend of frame {}", frame_id);
        self.write_queue
            .push_back(TransportCommand::ResendFrameForKickstart {
                ssrc: self.config.ssrc,
                frame_id,
            });
        self.last_send_time = Some(now);
    }

    fn resend_check(&mut self, now: Instant) {
        let (Some(last_sent), Some(last_send_time)) = (self.last_sent_frame_id, self.last_send_time)
        else {
            return;
        };

        let overdue =
            now.saturating_duration_since(last_send_time) > self.config.target_playout_delay;
        if overdue && self.latest_acked_frame_id != last_sent {
            debug!(
                "ack timeout, last acked frame {}, last sent {}",
                self.latest_acked_frame_id, last_sent
            );
            self.resend_for_kickstart(now);
        }

        // With everything acknowledged there is nothing to time out; wait a
        // full playout delay rather than spinning on the minimum delay.
        let base = if overdue { now } else { last_send_time };
        self.scheduler.schedule_next_resend_check(base, now);
    }
}

impl sansio::Protocol<Tagged<CastMessage>, Tagged<RawVideoFrame>, Tagged<EncodedVideoFrame>>
    for VideoSender
{
    type Rout = ();
    type Wout = TransportCommand;
    type Eout = FrameEvent;
    type Error = Error;
    type Time = Instant;

    /// Feedback and RTT samples from the transport.
    fn handle_read(&mut self, msg: Tagged<CastMessage>) -> Result<()> {
        match msg.message {
            CastMessage::Feedback(feedback) => self.on_feedback(msg.now, feedback),
            CastMessage::Rtt(rtt) => {
                self.check_ready()?;
                self.on_rtt(msg.now, rtt);
                Ok(())
            }
        }
    }

    fn poll_read(&mut self) -> Option<Self::Rout> {
        None
    }

    /// Captured frames.
    fn handle_write(&mut self, msg: Tagged<RawVideoFrame>) -> Result<()> {
        self.insert_raw_video_frame(msg.now, msg.message)
    }

    /// Returns commands for the transport.
    ///
    /// It should be polled after every `handle_*` call.
    fn poll_write(&mut self) -> Option<Self::Wout> {
        self.write_queue.pop_front()
    }

    /// Encoder completions.
    fn handle_event(&mut self, evt: Tagged<EncodedVideoFrame>) -> Result<()> {
        self.on_encoded(evt.now, evt.message)
    }

    fn poll_event(&mut self) -> Option<Self::Eout> {
        self.event_queue.pop_front()
    }

    fn handle_timeout(&mut self, now: Instant) -> Result<()> {
        if self.status != InitializationStatus::Initialized || self.closed {
            return Ok(());
        }

        let expired = self.scheduler.handle_timeout(now);
        if expired.report {
            self.send_rtcp_report(now);
        }
        if expired.resend_check {
            self.resend_check(now);
        }
        Ok(())
    }

    fn poll_timeout(&mut self) -> Option<Self::Time> {
        if self.status != InitializationStatus::Initialized || self.closed {
            return None;
        }
        self.scheduler.poll_timeout()
    }

    fn close(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::ErrSenderClosed);
        }
        self.closed = true;
        self.scheduler.cancel();
        self.write_queue.clear();
        self.event_queue.clear();
        Ok(())
    }
}
