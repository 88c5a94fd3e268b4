//! Receiver feedback as parsed by the transport.

use crate::frame_id::FrameId;
use std::time::Duration;

/// Packet id meaning every packet of a frame is missing.
pub const ALL_PACKETS_LOST: u16 = 0xffff;

/// One entry of a negative acknowledgment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MissingFrame {
    pub frame_id: FrameId,
    /// Missing packet ids, or [`ALL_PACKETS_LOST`].
    pub packet_ids: Vec<u16>,
}

impl MissingFrame {
    pub fn whole(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            packet_ids: vec![ALL_PACKETS_LOST],
        }
    }

    pub fn is_whole_frame(&self) -> bool {
        self.packet_ids.contains(&ALL_PACKETS_LOST)
    }
}

/// A cast feedback report from the receiver.
///
/// `ack_frame_id` acknowledges that frame and every frame before it. A non-empty
/// `missing_frames_and_packets` turns the report into a negative
/// acknowledgment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CastFeedback {
    pub media_ssrc: u32,
    pub ack_frame_id: FrameId,
    pub missing_frames_and_packets: Vec<MissingFrame>,
    /// Round-trip time measured from the report exchange that carried this
    /// feedback, if any.
    pub rtt: Option<Duration>,
}

impl CastFeedback {
    /// A pure positive acknowledgment.
    pub fn ack(media_ssrc: u32, ack_frame_id: FrameId) -> Self {
        Self {
            media_ssrc,
            ack_frame_id,
            ..Default::default()
        }
    }

    pub fn with_missing(mut self, missing: MissingFrame) -> Self {
        self.missing_frames_and_packets.push(missing);
        self
    }

    pub fn with_rtt(mut self, rtt: Duration) -> Self {
        self.rtt = Some(rtt);
        self
    }

    pub fn is_nack(&self) -> bool {
        !self.missing_frames_and_packets.is_empty()
    }
}

/// Messages flowing from the transport into the sender.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CastMessage {
    Feedback(CastFeedback),
    /// A standalone round-trip time sample.
    Rtt(Duration),
}

impl From<CastFeedback> for CastMessage {
    fn from(feedback: CastFeedback) -> Self {
        CastMessage::Feedback(feedback)
    }
}
