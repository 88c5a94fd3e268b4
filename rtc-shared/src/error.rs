#![allow(dead_code)]

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, PartialEq)]
#[non_exhaustive]
pub enum Error {
    //Config
    #[error("config: min_bitrate must be non-zero")]
    ErrZeroMinBitrate,
    #[error("config: min_bitrate {min} is greater than max_bitrate {max}")]
    ErrInvalidBitrateRange { min: u32, max: u32 },
    #[error("config: max_frame_rate must be a positive finite number")]
    ErrInvalidMaxFrameRate,
    #[error("config: target_playout_delay must be non-zero")]
    ErrInvalidPlayoutDelay,
    #[error("config: rtcp_interval must be non-zero")]
    ErrInvalidRtcpInterval,

    //Initialization
    #[error("encoder initialization failed: {0}")]
    ErrEncoderInitialization(String),
    #[error("transport initialization failed: {0}")]
    ErrTransportInitialization(String),

    //Sender
    #[error("video sender is not initialized")]
    ErrSenderUninitialized,
    #[error("video sender is closed")]
    ErrSenderClosed,
    #[error("encoded frame delivered with no frames in the encoder")]
    ErrNoFramesInEncoder,

    //Third Party Error
    #[error("{0}")]
    Std(#[source] StdError),

    //Other Errors
    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn from_std<T>(error: T) -> Self
    where
        T: std::error::Error + Send + Sync + 'static,
    {
        Error::Std(StdError(Box::new(error)))
    }

    pub fn downcast_ref<T: std::error::Error + 'static>(&self) -> Option<&T> {
        if let Error::Std(s) = self {
            return s.0.downcast_ref();
        }

        None
    }

    /// Whether this error leaves a sender permanently unusable.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::ErrEncoderInitialization(_)
                | Error::ErrTransportInitialization(_)
                | Error::ErrSenderUninitialized
                | Error::ErrSenderClosed
        )
    }
}

/// An escape hatch to preserve stack traces when we don't know the error.
///
/// Collaborators such as hardware encoders or transports report failures with
/// their own error types. `Error::from_std` keeps the underlying error (and its
/// source chain) so the owning program can still inspect it via
/// [`Error::downcast_ref`].
#[derive(Debug, Error)]
#[error("{0}")]
pub struct StdError(pub Box<dyn std::error::Error + Send + Sync>);

impl PartialEq for StdError {
    fn eq(&self, _: &Self) -> bool {
        false
    }
}
