//! Frame lifecycle events surfaced through `poll_event`.

use crate::frame_id::FrameId;
use std::time::Instant;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FrameEventKind {
    /// A raw frame was captured. Stamped with the capture time.
    CaptureBegin,
    /// A raw frame was handed to the sender.
    CaptureEnd,
    /// An encoded frame was handed to the transport.
    Encoded {
        size: usize,
        key_frame: bool,
        target_bitrate: u32,
    },
    /// The receiver acknowledged a frame.
    AckReceived,
}

/// One entry of the sender's frame event log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameEvent {
    pub at: Instant,
    pub kind: FrameEventKind,
    /// Media timestamp of the frame, when known.
    pub rtp_timestamp: Option<u32>,
    /// Unknown until the frame has been encoded.
    pub frame_id: Option<FrameId>,
}

impl FrameEvent {
    pub(crate) fn capture(at: Instant, kind: FrameEventKind, rtp_timestamp: u32) -> Self {
        Self {
            at,
            kind,
            rtp_timestamp: Some(rtp_timestamp),
            frame_id: None,
        }
    }

    pub(crate) fn frame(
        at: Instant,
        kind: FrameEventKind,
        rtp_timestamp: Option<u32>,
        frame_id: FrameId,
    ) -> Self {
        Self {
            at,
            kind,
            rtp_timestamp,
            frame_id: Some(frame_id),
        }
    }
}
