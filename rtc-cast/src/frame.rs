//! Raw and encoded video frames.

use crate::frame_id::FrameId;
use bytes::Bytes;
use std::time::Instant;

/// An opaque captured picture.
///
/// The sender never looks inside `data`; it only lends the frame to the
/// encoder for the duration of one `encode` call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    pub data: Bytes,
}

/// A captured frame together with its capture time, as handed to the sender.
#[derive(Debug, Clone, PartialEq)]
pub struct RawVideoFrame {
    pub frame: VideoFrame,
    pub capture_time: Instant,
}

/// Whether a frame can be decoded on its own.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Dependency {
    /// Decodable without any other frame.
    Key,
    /// Predicted from an earlier frame.
    #[default]
    Delta,
}

/// A frame produced by the encoder.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedFrame {
    pub frame_id: FrameId,
    /// The frame this one is predicted from. Equal to `frame_id` for key frames.
    pub referenced_frame_id: FrameId,
    /// Media (RTP) timestamp at the video clock rate.
    pub rtp_timestamp: u32,
    /// Approximately the capture time of the source picture.
    pub reference_time: Instant,
    pub dependency: Dependency,
    pub data: Bytes,
    /// Playout-delay hint for the receiver, stamped by the sender when enabled.
    pub new_playout_delay_ms: Option<u16>,
}

impl EncodedFrame {
    pub fn is_key_frame(&self) -> bool {
        self.dependency == Dependency::Key
    }

    /// Payload size in bits.
    pub fn size_bits(&self) -> u64 {
        self.data.len() as u64 * 8
    }
}

/// Encoder completion: the encoded frame plus the bitrate that was requested
/// when the source frame was submitted.
#[derive(Debug, Clone, PartialEq)]
pub struct EncodedVideoFrame {
    pub requested_bitrate: u32,
    pub frame: EncodedFrame,
}
