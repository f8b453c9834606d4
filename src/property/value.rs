//! Property values
// (c) 2024 Ross Younger

use std::fmt;

use crate::exposure::ExposureValue;

/// Sentinel common value for values that have no common meaning across cameras
pub const NO_COMMON_VALUE: i32 = -1;

/// Video compression schemes
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display)]
#[allow(missing_docs)]
pub enum VideoCompression {
    #[strum(to_string = "H.264")]
    H264,
    #[strum(to_string = "H.265")]
    H265,
    #[strum(to_string = "ProRes")]
    ProRes,
}

/// A video recording format
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, derive_more::Constructor)]
pub struct VideoFormat {
    /// Frames per second
    pub frame_rate: u16,
    /// Frame width in pixels
    pub width: u16,
    /// Frame height in pixels
    pub height: u16,
    /// Compression scheme
    pub compression: VideoCompression,
}

impl fmt::Display for VideoFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}x{} @ {} fps",
            self.width, self.height, self.frame_rate
        )
    }
}

/// A live view zoom setting
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, derive_more::Constructor)]
pub struct LiveViewZoomLevel {
    /// Whether the live view is zoomed in at all
    pub zoomed_in: bool,
    /// Magnification factor
    pub factor: u16,
}

impl fmt::Display for LiveViewZoomLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.zoomed_in {
            write!(f, "{}x", self.factor)
        } else {
            f.write_str("Off")
        }
    }
}

/// The typed part of a property value
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ValuePayload {
    /// A value fully described by its common value and display string
    Common,
    /// An exposure setting
    Exposure(ExposureValue),
    /// A video format
    VideoFormat(VideoFormat),
    /// A live view zoom level
    LiveViewZoom(LiveViewZoomLevel),
}

/// An immutable property value.
///
/// Values compare by value. Plain values are equal when their common value and display string match;
/// typed values (exposure, video format, zoom) are equal when their payloads match.
#[derive(Clone, Debug)]
pub struct PropertyValue {
    common_value: i32,
    display: String,
    payload: ValuePayload,
}

impl PartialEq for PropertyValue {
    fn eq(&self, other: &Self) -> bool {
        match (&self.payload, &other.payload) {
            (ValuePayload::Common, ValuePayload::Common) => {
                self.common_value == other.common_value && self.display == other.display
            }
            (ValuePayload::Exposure(a), ValuePayload::Exposure(b)) => a == b,
            (ValuePayload::VideoFormat(a), ValuePayload::VideoFormat(b)) => a == b,
            (ValuePayload::LiveViewZoom(a), ValuePayload::LiveViewZoom(b)) => a == b,
            _ => false,
        }
    }
}
impl Eq for PropertyValue {}

impl fmt::Display for PropertyValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.display)
    }
}

impl PropertyValue {
    /// A plain value
    #[must_use]
    pub fn common(common_value: i32, display: impl Into<String>) -> Self {
        Self {
            common_value,
            display: display.into(),
            payload: ValuePayload::Common,
        }
    }

    /// An exposure value. These have no common value.
    #[must_use]
    pub fn exposure(value: impl Into<ExposureValue>) -> Self {
        let value = value.into();
        Self {
            common_value: NO_COMMON_VALUE,
            display: value.to_string(),
            payload: ValuePayload::Exposure(value),
        }
    }

    /// A video format value
    #[must_use]
    pub fn video_format(format: VideoFormat) -> Self {
        Self {
            common_value: NO_COMMON_VALUE,
            display: format.to_string(),
            payload: ValuePayload::VideoFormat(format),
        }
    }

    /// A live view zoom value
    #[must_use]
    pub fn zoom_level(level: LiveViewZoomLevel) -> Self {
        Self {
            common_value: NO_COMMON_VALUE,
            display: level.to_string(),
            payload: ValuePayload::LiveViewZoom(level),
        }
    }

    /// The value's meaning in common across cameras, or [`NO_COMMON_VALUE`]
    #[must_use]
    pub fn common_value(&self) -> i32 {
        self.common_value
    }

    /// A human-readable rendering of the value
    #[must_use]
    pub fn display_string(&self) -> &str {
        &self.display
    }

    /// The typed payload
    #[must_use]
    pub fn payload(&self) -> &ValuePayload {
        &self.payload
    }

    /// The exposure value, if this is one
    #[must_use]
    pub fn exposure_value(&self) -> Option<ExposureValue> {
        match self.payload {
            ValuePayload::Exposure(e) => Some(e),
            _ => None,
        }
    }

    /// The video format, if this is one
    #[must_use]
    pub fn as_video_format(&self) -> Option<VideoFormat> {
        match self.payload {
            ValuePayload::VideoFormat(v) => Some(v),
            _ => None,
        }
    }

    /// The zoom level, if this is one
    #[must_use]
    pub fn as_zoom_level(&self) -> Option<LiveViewZoomLevel> {
        match self.payload {
            ValuePayload::LiveViewZoom(z) => Some(z),
            _ => None,
        }
    }
}
