//! RTC Cast - Sans-IO real-time video sender.
//!
//! This crate implements the sending side of a Cast-style real-time video
//! stream on top of the [`sansio::Protocol`] trait. It decides which captured
//! frames are worth encoding, paces the encoder's bitrate to the link, sends
//! status reports so the receiver can schedule playout, and asks the transport
//! to retransmit when the receiver stalls.
//!
//! # Components
//!
//! | Component | Description |
//! |-----------|-------------|
//! | [`FrameTimeline`] | Reference time and media timestamp of recently sent frames, plus RTT statistics |
//! | [`CongestionControl`] | Bitrate recommendation from send/ack telemetry and RTT |
//! | [`ReportScheduler`] | Status report and resend check timers |
//! | [`VideoSender`] | Admission control, encoder driving, ack and kickstart handling |
//!
//! # Collaborators
//!
//! | Trait | Description |
//! |-------|-------------|
//! | [`EncoderFactory`] / [`VideoEncoder`] | Hardware (fixed bitrate) or software (congestion-driven) encoder |
//! | [`TransportRegistrar`] | One-time stream registration with the transport |
//!
//! # Protocol Surface
//!
//! All inputs are [`Tagged`](shared::Tagged) with the time they happened at;
//! the sender never reads the clock itself.
//!
//! ```text
//! handle_write(Tagged<RawVideoFrame>)       captured frame
//! handle_event(Tagged<EncodedVideoFrame>)   encoder completion
//! handle_read(Tagged<CastMessage>)          receiver feedback or RTT sample
//! handle_timeout(Instant)                   status report / resend check
//!
//! poll_write()    -> TransportCommand       frames, cancellations, resends, reports
//! poll_event()    -> FrameEvent             frame event log
//! poll_timeout()  -> Instant                next timer deadline
//! ```
//!
//! # Quick Start
//!
//! ```ignore
//! use rtc_cast::{VideoSenderBuilder, VideoSenderConfig, RawVideoFrame};
//! use sansio::Protocol;
//! use shared::Tagged;
//!
//! let mut sender = VideoSenderBuilder::new(VideoSenderConfig::default())
//!     .build(&mut encoder_factory, &mut transport)?;
//!
//! sender.handle_write(Tagged::new(now, RawVideoFrame { frame, capture_time: now }))?;
//!
//! // ... the encoder finishes ...
//! sender.handle_event(Tagged::new(now, encoded))?;
//!
//! while let Some(cmd) = sender.poll_write() {
//!     transport.execute(cmd);
//! }
//! ```

#![warn(rust_2018_idioms)]
#![allow(dead_code)]

pub mod config;
pub mod congestion;
pub mod encoder;
pub mod event;
pub mod feedback;
pub mod frame;
pub mod frame_id;
pub mod report;
pub mod sender;
pub mod timeline;
pub mod transport;

pub use config::{MAX_UNACKED_FRAMES, VideoSenderConfig};
pub use congestion::CongestionControl;
pub use encoder::{EncoderFactory, EncoderVariant, VideoEncoder};
pub use event::{FrameEvent, FrameEventKind};
pub use feedback::{ALL_PACKETS_LOST, CastFeedback, CastMessage, MissingFrame};
pub use frame::{Dependency, EncodedFrame, EncodedVideoFrame, RawVideoFrame, VideoFrame};
pub use frame_id::FrameId;
pub use report::{DEFAULT_AGGRESSIVE_REPORT_COUNT, ExpiredTimers, ReportScheduler};
pub use sender::{InitializationStatus, VideoSender, VideoSenderBuilder};
pub use timeline::FrameTimeline;
pub use timeline::rtt::{MAX_PLAUSIBLE_RTT, RttStats};
pub use transport::{TransportCommand, TransportRegistrar, TransportRtpConfig};
