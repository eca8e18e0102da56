use crate::foundation::core::TrackKind;

/// Convenience result type used across clipfeed.
pub type ClipfeedResult<T> = Result<T, ClipfeedError>;

/// Top-level error taxonomy used by decoder APIs.
///
/// End-of-track and "no unit for this time" are not errors: they are reported through
/// [`crate::media::track::Pull::EndOfTrack`] and `None` respectively.
#[derive(thiserror::Error, Debug)]
pub enum ClipfeedError {
    /// Invalid user-provided or composition data.
    #[error("validation error: {0}")]
    Validation(String),

    /// The asset has no track of the requested kind.
    #[error("track unavailable: asset has no {kind} track")]
    TrackUnavailable {
        /// Requested track kind.
        kind: TrackKind,
    },

    /// The platform codec or demuxer could not be initialized for a track.
    #[error("open failed: {0}")]
    OpenFailed(String),

    /// Non-recoverable decode error; the track ends early.
    #[error("decode failed: {0}")]
    DecodeFailed(String),

    /// Errors when serializing or deserializing data structures.
    #[error("serialization error: {0}")]
    Serde(String),

    /// Wrapped lower-level error from dependencies or IO.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ClipfeedError {
    /// Build a [`ClipfeedError::Validation`] value.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    /// Build a [`ClipfeedError::TrackUnavailable`] value.
    pub fn track_unavailable(kind: TrackKind) -> Self {
        Self::TrackUnavailable { kind }
    }

    /// Build a [`ClipfeedError::OpenFailed`] value.
    pub fn open_failed(msg: impl Into<String>) -> Self {
        Self::OpenFailed(msg.into())
    }

    /// Build a [`ClipfeedError::DecodeFailed`] value.
    pub fn decode_failed(msg: impl Into<String>) -> Self {
        Self::DecodeFailed(msg.into())
    }

    /// Build a [`ClipfeedError::Serde`] value.
    pub fn serde(msg: impl Into<String>) -> Self {
        Self::Serde(msg.into())
    }

    /// Return `true` for [`ClipfeedError::TrackUnavailable`].
    pub fn is_track_unavailable(&self) -> bool {
        matches!(self, Self::TrackUnavailable { .. })
    }
}

#[cfg(test)]
#[path = "../../tests/unit/foundation/error.rs"]
mod tests;
