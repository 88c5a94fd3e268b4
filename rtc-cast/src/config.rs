//! Session configuration for a video sender.

use crate::transport::TransportRtpConfig;
use serde::{Deserialize, Serialize};
use shared::error::{Error, Result};
use std::time::Duration;

/// Upper bound on frames that may be outstanding, whatever the configuration.
pub const MAX_UNACKED_FRAMES: usize = 120;

/// Configuration for one video sending session.
///
/// Owned by the embedding program and immutable for the lifetime of the
/// session. Durations serialise as whole milliseconds.
///
/// # Example
///
/// ```ignore
/// let config: VideoSenderConfig = serde_json::from_str(r#"{
///     "ssrc": 11,
///     "min_bitrate": 500000,
///     "max_bitrate": 1500000,
///     "target_playout_delay_ms": 400,
///     "use_external_encoder": true
/// }"#)?;
/// config.validate()?;
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VideoSenderConfig {
    /// Routing id of the outgoing media stream.
    pub ssrc: u32,
    /// Routing id the receiver uses for feedback.
    pub incoming_feedback_ssrc: u32,
    pub rtp_payload_type: u8,

    /// Bitrate bounds in bits per second.
    pub min_bitrate: u32,
    pub max_bitrate: u32,
    /// Bitrate assumed before any throughput has been measured. Clamped into
    /// `[min_bitrate, max_bitrate]`, so it never invalidates a range.
    pub start_bitrate: u32,

    pub max_frame_rate: f64,

    #[serde(rename = "target_playout_delay_ms", with = "duration_ms")]
    pub target_playout_delay: Duration,
    #[serde(rename = "rtcp_interval_ms", with = "duration_ms")]
    pub rtcp_interval: Duration,

    /// Selects the fixed-bitrate hardware encoder instead of the software one.
    pub use_external_encoder: bool,
    /// Stamp outgoing frames with the target playout delay.
    pub send_target_playout_delay: bool,

    /// Opaque key material, forwarded to the transport.
    pub aes_key: Vec<u8>,
    pub aes_iv_mask: Vec<u8>,
}

impl Default for VideoSenderConfig {
    fn default() -> Self {
        Self {
            ssrc: 11,
            incoming_feedback_ssrc: 12,
            rtp_payload_type: 96,
            min_bitrate: 300_000,
            max_bitrate: 5_000_000,
            start_bitrate: 1_500_000,
            max_frame_rate: 30.0,
            target_playout_delay: Duration::from_millis(100),
            rtcp_interval: Duration::from_millis(500),
            use_external_encoder: false,
            send_target_playout_delay: false,
            aes_key: vec![],
            aes_iv_mask: vec![],
        }
    }
}

impl VideoSenderConfig {
    pub fn validate(&self) -> Result<()> {
        if self.min_bitrate == 0 {
            return Err(Error::ErrZeroMinBitrate);
        }
        if self.min_bitrate > self.max_bitrate {
            return Err(Error::ErrInvalidBitrateRange {
                min: self.min_bitrate,
                max: self.max_bitrate,
            });
        }
        if !self.max_frame_rate.is_finite() || self.max_frame_rate <= 0.0 {
            return Err(Error::ErrInvalidMaxFrameRate);
        }
        if self.target_playout_delay.is_zero() {
            return Err(Error::ErrInvalidPlayoutDelay);
        }
        if self.rtcp_interval.is_zero() {
            return Err(Error::ErrInvalidRtcpInterval);
        }
        Ok(())
    }

    /// Number of frames that may be sent but not yet acknowledged: as many as
    /// fit in the playout delay at the maximum frame rate, at least one.
    pub fn max_unacked_frames(&self) -> usize {
        let frames =
            (self.target_playout_delay.as_millis() as f64 * self.max_frame_rate / 1000.0).floor();
        if frames.is_nan() || frames < 1.0 {
            1
        } else {
            (frames as usize).min(MAX_UNACKED_FRAMES)
        }
    }

    /// Midpoint of the bitrate range, used when the hardware encoder is selected.
    pub fn fixed_bitrate(&self) -> Option<u32> {
        if self.use_external_encoder {
            Some(((self.min_bitrate as u64 + self.max_bitrate as u64) / 2) as u32)
        } else {
            None
        }
    }

    pub(crate) fn transport_config(&self) -> TransportRtpConfig {
        TransportRtpConfig {
            ssrc: self.ssrc,
            feedback_ssrc: self.incoming_feedback_ssrc,
            rtp_payload_type: self.rtp_payload_type,
            stored_frames: self.max_unacked_frames(),
            aes_key: self.aes_key.clone(),
            aes_iv_mask: self.aes_iv_mask.clone(),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub(super) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_millis() as u64)
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(d)?))
    }
}
