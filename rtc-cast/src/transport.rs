//! Transport collaborator interface.
//!
//! Registration is a synchronous call made once while the sender is being
//! built. Everything else the sender asks of the transport is queued as a
//! [`TransportCommand`] and drained with `poll_write`.

use crate::frame::EncodedFrame;
use crate::frame_id::FrameId;
use shared::error::Result;

/// Stream parameters handed to the transport at registration.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportRtpConfig {
    pub ssrc: u32,
    pub feedback_ssrc: u32,
    pub rtp_payload_type: u8,
    /// How many recent frames the transport must keep for retransmission.
    pub stored_frames: usize,
    pub aes_key: Vec<u8>,
    pub aes_iv_mask: Vec<u8>,
}

/// One-time stream registration with the transport.
///
/// After a successful registration the owner routes the stream's feedback and
/// RTT samples to the sender's `handle_read`.
pub trait TransportRegistrar {
    fn initialize_video(&mut self, config: &TransportRtpConfig) -> Result<()>;
}

/// Requests from the sender to the transport.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportCommand {
    /// Packetize and send a newly encoded frame.
    InsertFrame(EncodedFrame),
    /// Drop any pending retransmissions of acknowledged frames.
    CancelSendingFrames { ssrc: u32, frame_ids: Vec<FrameId> },
    /// Resend a frame so a stalled receiver reports what it is missing.
    ResendFrameForKickstart { ssrc: u32, frame_id: FrameId },
    /// Send a status (sender) report.
    SendSenderReport {
        ssrc: u32,
        ntp_time: u64,
        rtp_timestamp: u32,
    },
}
