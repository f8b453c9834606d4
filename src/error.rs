//! Error kinds reported by the simulated camera
// (c) 2024 Ross Younger

use serde::{Deserialize, Serialize};

/// Machine-readable error kinds reported by camera operations.
///
/// Every kind is a deterministic consequence of the current session state.
/// Nothing here is ever produced at random, so a given sequence of operations
/// always fails (or succeeds) in the same way.
///
/// The discriminants are stable and may be used as numeric codes
/// (see [`CameraError::code`] and [`CameraError::from_code`]).
#[derive(
    Serialize,
    Deserialize,
    PartialEq,
    Eq,
    Debug,
    Clone,
    Copy,
    Hash,
    thiserror::Error,
    strum::FromRepr,
    strum::IntoStaticStr,
    strum::EnumIter,
)]
#[non_exhaustive]
pub enum CameraError {
    /// The camera is not connected
    #[error("the camera is not connected")]
    NotConnected = 1,
    /// The camera could not service the request at this time
    #[error("the camera is busy")]
    DeviceBusy = 2,
    /// The operation was cancelled by the client
    #[error("the operation was cancelled by the user")]
    CancelledByUser = 3,
    /// The requested value is not one of the property's valid settable values
    #[error("invalid property value")]
    InvalidPropertyValue = 4,
    /// The camera's current command categories do not permit this operation
    #[error("the camera is in the wrong command category for this operation")]
    IncorrectCommandCategory = 5,
    /// The operation is not available on this camera or item
    #[error("this operation is not available")]
    NotAvailable = 6,
    /// The client failed to authenticate
    #[error("authentication failed")]
    AuthenticationFailed = 7,
    /// The operation timed out
    #[error("the operation timed out")]
    Timeout = 8,
    /// The input to the operation was invalid
    #[error("invalid input")]
    InvalidInput = 9,
    /// The object is too large to be handled
    #[error("the object is too large")]
    ObjectTooLarge = 10,
    /// No thumbnail could be produced for this item
    #[error("no thumbnail is available")]
    NoThumbnail = 11,
    /// No metadata could be produced for this item
    #[error("no metadata is available")]
    NoMetadata = 12,
    /// A video recording is already in progress
    #[error("a video recording is already in progress")]
    VideoRecordingInProgress = 13,
}

impl CameraError {
    /// The numeric code of this error kind
    #[must_use]
    pub fn code(self) -> u32 {
        self as u32
    }

    /// Looks up an error kind by its numeric code
    #[must_use]
    pub fn from_code(code: u32) -> Option<Self> {
        usize::try_from(code).ok().and_then(Self::from_repr)
    }

    /// The short name of this error kind, e.g. `NotConnected`
    #[must_use]
    pub fn name(self) -> &'static str {
        self.into()
    }
}
