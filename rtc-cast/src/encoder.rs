//! Encoder collaborator interface.

use crate::config::VideoSenderConfig;
use crate::frame::VideoFrame;
use crate::frame_id::FrameId;
use shared::error::Result;
use std::time::Instant;

/// A video encoder driven by the sender.
///
/// Encoding is asynchronous: [`encode`](VideoEncoder::encode) only submits the
/// frame. The owner later delivers the result to the sender as an
/// [`EncodedVideoFrame`](crate::EncodedVideoFrame) event, echoing the bitrate
/// that was requested at submission.
pub trait VideoEncoder {
    /// Submit a frame for encoding. Returns `false` if the encoder refuses it,
    /// in which case no completion will follow.
    fn encode(&mut self, frame: &VideoFrame, capture_time: Instant, bitrate: u32) -> bool;

    /// Change the target bitrate, in bits per second.
    fn set_bit_rate(&mut self, bitrate: u32);

    /// The newest frame the receiver is known to have, and so may be used as
    /// a prediction reference for delta frames.
    fn latest_frame_id_to_reference(&mut self, frame_id: FrameId);
}

/// Creates the encoder variant selected by the session configuration.
pub trait EncoderFactory {
    /// Hardware-accelerated encoder running at a fixed bitrate.
    fn create_hardware_encoder(
        &mut self,
        config: &VideoSenderConfig,
    ) -> Result<Box<dyn VideoEncoder>>;

    /// Software encoder following the congestion controller's bitrate.
    fn create_software_encoder(
        &mut self,
        config: &VideoSenderConfig,
        max_unacked_frames: usize,
    ) -> Result<Box<dyn VideoEncoder>>;
}

/// Which encoder variant a configuration selects.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EncoderVariant {
    Hardware,
    Software,
}

impl EncoderVariant {
    pub fn from_config(config: &VideoSenderConfig) -> Self {
        if config.use_external_encoder {
            EncoderVariant::Hardware
        } else {
            EncoderVariant::Software
        }
    }

    pub(crate) fn create(
        self,
        factory: &mut dyn EncoderFactory,
        config: &VideoSenderConfig,
    ) -> Result<Box<dyn VideoEncoder>> {
        match self {
            EncoderVariant::Hardware => factory.create_hardware_encoder(config),
            EncoderVariant::Software => {
                factory.create_software_encoder(config, config.max_unacked_frames())
            }
        }
    }
}
