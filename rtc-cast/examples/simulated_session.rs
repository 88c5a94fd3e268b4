use rtc_cast::{
    CastFeedback, CastMessage, Dependency, EncodedFrame, EncodedVideoFrame, EncoderFactory,
    FrameEventKind, FrameId, MissingFrame, RawVideoFrame, TransportCommand, TransportRegistrar,
    TransportRtpConfig, VideoEncoder, VideoFrame, VideoSenderBuilder, VideoSenderConfig,
};
use sansio::Protocol;

use bytes::Bytes;
use clap::Parser;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use shared::Tagged;
use shared::error::Result;
use shared::time::MediaClock;
use std::cell::RefCell;
use std::collections::{BTreeSet, VecDeque};
use std::rc::Rc;
use std::time::{Duration, Instant};

#[derive(Parser)]
#[command(name = "Simulated Cast Session")]
#[command(version = "0.1.0")]
#[command(about = "Drives a video sender over a simulated lossy link", long_about = None)]
struct Cli {
    #[arg(long, default_value_t = 300)]
    frames: u32,
    #[arg(long, default_value_t = 30.0)]
    fps: f64,
    /// Probability that a frame is lost on the first attempt.
    #[arg(long, default_value_t = 0.05)]
    loss: f64,
    #[arg(long, default_value_t = 60)]
    rtt_ms: u64,
    #[arg(long, default_value_t = 400)]
    playout_delay_ms: u64,
    #[arg(long, default_value_t = 20)]
    encode_ms: u64,
    #[arg(long, default_value_t = 7)]
    seed: u64,
    /// Use the fixed-bitrate hardware encoder.
    #[arg(long)]
    hardware: bool,
}

/// Frames waiting inside the simulated encoder, with the bitrate they were
/// requested at.
type EncoderQueue = Rc<RefCell<VecDeque<(Instant, u32)>>>;

struct SimulatedEncoder {
    queue: EncoderQueue,
}

impl VideoEncoder for SimulatedEncoder {
    fn encode(&mut self, _frame: &VideoFrame, capture_time: Instant, bitrate: u32) -> bool {
        self.queue.borrow_mut().push_back((capture_time, bitrate));
        true
    }

    fn set_bit_rate(&mut self, bitrate: u32) {
        log::trace!("encoder bitrate {bitrate}");
    }

    fn latest_frame_id_to_reference(&mut self, frame_id: FrameId) {
        log::trace!("encoder may reference frame {frame_id}");
    }
}

struct SimulatedEncoderFactory {
    queue: EncoderQueue,
}

impl EncoderFactory for SimulatedEncoderFactory {
    fn create_hardware_encoder(
        &mut self,
        _config: &VideoSenderConfig,
    ) -> Result<Box<dyn VideoEncoder>> {
        Ok(Box::new(SimulatedEncoder {
            queue: Rc::clone(&self.queue),
        }))
    }

    fn create_software_encoder(
        &mut self,
        config: &VideoSenderConfig,
        _max_unacked_frames: usize,
    ) -> Result<Box<dyn VideoEncoder>> {
        self.create_hardware_encoder(config)
    }
}

struct SimulatedTransport;

impl TransportRegistrar for SimulatedTransport {
    fn initialize_video(&mut self, config: &TransportRtpConfig) -> Result<()> {
        println!(
            "registered ssrc {} storing {} frames",
            config.ssrc, config.stored_frames
        );
        Ok(())
    }
}

/// What the receiver has and which frames it knows it is missing.
struct Receiver {
    received: BTreeSet<u32>,
    highest_seen: Option<FrameId>,
    last_ack: FrameId,
}

impl Receiver {
    fn new(first_frame_id: FrameId) -> Self {
        Self {
            received: BTreeSet::new(),
            highest_seen: None,
            last_ack: first_frame_id.prev(),
        }
    }

    fn on_frame(&mut self, frame_id: FrameId) -> CastFeedback {
        self.received.insert(frame_id.value());
        if self.highest_seen.is_none_or(|h| frame_id.is_newer_than(h)) {
            self.highest_seen = Some(frame_id);
        }
        let mut ack = self.last_ack;
        while self.received.contains(&ack.next().value()) {
            ack = ack.next();
        }
        self.last_ack = ack;

        let mut feedback = CastFeedback::ack(11, ack);
        if let Some(highest) = self.highest_seen {
            let mut missing = ack.next();
            while highest.is_newer_than(missing) {
                if !self.received.contains(&missing.value()) {
                    feedback = feedback.with_missing(MissingFrame::whole(missing));
                }
                missing = missing.next();
            }
        }
        feedback
    }
}

enum Delivery {
    ToReceiver(FrameId),
    ToSender(CastMessage),
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let config = VideoSenderConfig {
        max_frame_rate: cli.fps,
        target_playout_delay: Duration::from_millis(cli.playout_delay_ms),
        use_external_encoder: cli.hardware,
        ..Default::default()
    };

    let queue = EncoderQueue::default();
    let mut factory = SimulatedEncoderFactory {
        queue: Rc::clone(&queue),
    };
    let start = Instant::now();
    let mut sender = VideoSenderBuilder::new(config)
        .with_start_time(start)
        .build(&mut factory, &mut SimulatedTransport)?;

    let mut rng = StdRng::seed_from_u64(cli.seed);
    let one_way = Duration::from_millis(cli.rtt_ms / 2);
    let frame_interval = Duration::from_secs_f64(1.0 / cli.fps);
    let encode_latency = Duration::from_millis(cli.encode_ms);
    let clock = MediaClock::video(start);

    let mut receiver = Receiver::new(FrameId::new(0));
    let mut in_transit: Vec<(Instant, Delivery)> = vec![];
    let mut next_frame_id = FrameId::new(0);
    let (mut sent, mut lost, mut kickstarts, mut reports) = (0u32, 0u32, 0u32, 0u32);
    let mut bits = 0u64;

    let end = start + frame_interval * cli.frames;
    let mut next_capture = start;
    let mut now = start;
    while now < end {
        if now >= next_capture {
            sender.handle_write(Tagged::new(
                now,
                RawVideoFrame {
                    frame: VideoFrame::default(),
                    capture_time: now,
                },
            ))?;
            next_capture += frame_interval;
        }

        let ready = queue
            .borrow()
            .front()
            .is_some_and(|(capture_time, _)| *capture_time + encode_latency <= now);
        let encoded = if ready {
            queue.borrow_mut().pop_front()
        } else {
            None
        };
        if let Some((capture_time, bitrate)) = encoded {
            let frame_id = next_frame_id;
            next_frame_id = frame_id.next();
            let bytes = (bitrate as f64 / cli.fps / 8.0) as usize;
            sender.handle_event(Tagged::new(
                now,
                EncodedVideoFrame {
                    requested_bitrate: bitrate,
                    frame: EncodedFrame {
                        frame_id,
                        referenced_frame_id: frame_id.prev(),
                        rtp_timestamp: clock.rtp_timestamp(capture_time),
                        reference_time: capture_time,
                        dependency: if frame_id.value() == 0 {
                            Dependency::Key
                        } else {
                            Dependency::Delta
                        },
                        data: Bytes::from(vec![0u8; bytes]),
                        new_playout_delay_ms: None,
                    },
                },
            ))?;
        }

        while let Some(cmd) = sender.poll_write() {
            match cmd {
                TransportCommand::InsertFrame(frame) => {
                    sent += 1;
                    bits += frame.size_bits();
                    if rng.random_bool(cli.loss) {
                        lost += 1;
                    } else {
                        in_transit.push((now + one_way, Delivery::ToReceiver(frame.frame_id)));
                    }
                }
                TransportCommand::ResendFrameForKickstart { frame_id, .. } => {
                    kickstarts += 1;
                    in_transit.push((now + one_way, Delivery::ToReceiver(frame_id)));
                }
                TransportCommand::SendSenderReport { .. } => reports += 1,
                TransportCommand::CancelSendingFrames { .. } => {}
            }
        }
        while let Some(event) = sender.poll_event() {
            if event.kind == FrameEventKind::CaptureEnd {
                continue;
            }
            log::debug!("{:?}", event);
        }

        let (due, pending): (Vec<_>, Vec<_>) =
            in_transit.drain(..).partition(|(at, _)| *at <= now);
        in_transit = pending;
        for (_, delivery) in due {
            match delivery {
                Delivery::ToReceiver(frame_id) => {
                    let feedback = receiver.on_frame(frame_id);
                    let feedback = feedback.with_rtt(one_way * 2);
                    in_transit.push((now + one_way, Delivery::ToSender(feedback.into())));
                }
                Delivery::ToSender(msg) => sender.handle_read(Tagged::new(now, msg))?,
            }
        }

        if let Some(eto) = sender.poll_timeout()
            && eto <= now
        {
            sender.handle_timeout(now)?;
        }

        now += Duration::from_millis(1);
    }

    let captured = cli.frames;
    let dropped = captured.saturating_sub(sent);
    let elapsed = now.duration_since(start).as_secs_f64();
    println!("captured {captured}, sent {sent}, dropped {dropped}, lost {lost}");
    println!("kickstart resends {kickstarts}, status reports {reports}");
    println!(
        "average bitrate {:.0} kbps, latest acked frame {}, rtt {:?}",
        bits as f64 / elapsed / 1000.0,
        sender.latest_acked_frame_id(),
        sender.rtt_stats().avg_rtt()
    );

    sender.close()
}
