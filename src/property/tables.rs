//! Common values and the simulated camera's property tables
// (c) 2024 Ross Younger

use super::{
    LiveViewZoomLevel, NO_COMMON_VALUE, PropertyIdentifier, PropertyValue, VideoCompression,
    VideoFormat,
};
use crate::exposure::{
    APERTURES, DEFAULT_APERTURE, DEFAULT_COMPENSATION, DEFAULT_ISO, DEFAULT_SHUTTER_SPEED,
    FNumber, ISO_SPEEDS, SHUTTER_SPEEDS, ShutterSpeed, compensation_values,
};

/// Declares an enum of common values.
///
/// Each variant carries its common value as the discriminant and a display string.
/// Every such enum converts into a plain [`PropertyValue`].
macro_rules! common_value_enum {
    (
        $(#[$attr:meta])*
        $vis:vis $name:ident {
            $( $(#[$v_attr:meta])* $variant:ident = $val:literal => $display:literal ),+
            $(,)?
        }
    ) => {
        $(#[$attr])*
        #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::FromRepr, strum::EnumIter)]
        #[repr(i32)]
        $vis enum $name {
            $( $(#[$v_attr])* $variant = $val ),+
        }

        impl $name {
            /// The human-readable name of this value
            #[must_use]
            $vis fn display_name(self) -> &'static str {
                match self {
                    $( Self::$variant => $display ),+
                }
            }

            /// The common value, shared across all cameras
            #[must_use]
            $vis fn common_value(self) -> i32 {
                self as i32
            }

            /// Looks up a value by its common value
            #[must_use]
            $vis fn from_common_value(v: i32) -> Option<Self> {
                Self::from_repr(v)
            }
        }

        impl From<$name> for PropertyValue {
            fn from(v: $name) -> Self {
                PropertyValue::common(v.common_value(), v.display_name())
            }
        }
    };
}

common_value_enum!(
    /// Auto-exposure modes
    pub AutoExposureMode {
        /// Fully automatic
        FullyAutomatic = 50 => "Auto",
        /// Program auto
        ProgramAuto = 51 => "P",
        /// Shutter priority
        ShutterPriority = 52 => "Tv",
        /// Aperture priority
        AperturePriority = 53 => "Av",
        /// Fully manual
        FullyManual = 54 => "M",
        /// Bulb
        Bulb = 55 => "B",
        /// Flexible priority
        FlexiblePriority = 56 => "Fv",
    }
);

common_value_enum!(
    /// White balance presets
    pub WhiteBalance {
        /// Automatic
        Auto = 100 => "Auto",
        /// Daylight
        Daylight = 101 => "Daylight",
        /// Shade
        Shade = 102 => "Shade",
        /// Cloudy
        Cloudy = 103 => "Cloudy",
        /// Tungsten lighting
        Tungsten = 104 => "Tungsten",
        /// Fluorescent lighting
        Fluorescent = 105 => "Fluorescent",
        /// Flash
        Flash = 106 => "Flash",
        /// Custom
        Custom = 107 => "Custom",
    }
);

common_value_enum!(
    /// Focus modes
    pub FocusMode {
        /// Manual focus
        Manual = 150 => "MF",
        /// Focus once when the shutter is half-pressed
        SingleDrive = 151 => "AF-S",
        /// Keep focusing while the shutter is half-pressed
        ContinuousDrive = 152 => "AF-C",
    }
);

common_value_enum!(
    /// Battery levels
    pub BatteryLevel {
        /// Full
        Full = 200 => "100%",
        /// Three quarters
        ThreeQuarters = 201 => "75%",
        /// Half
        Half = 202 => "50%",
        /// One quarter
        OneQuarter = 203 => "25%",
        /// Empty
        Empty = 204 => "0%",
    }
);

common_value_enum!(
    /// Power sources
    pub PowerSource {
        /// Running on battery
        Battery = 210 => "Battery",
        /// Running on mains power
        MainsPower = 211 => "Mains Power",
    }
);

common_value_enum!(
    /// Autofocus area systems
    pub AfSystem {
        /// A single focus area
        SingleArea = 351 => "Single Area",
        /// Multiple focus areas
        MultipleAreas = 352 => "Multiple Areas",
        /// Face detection
        FaceDetection = 353 => "Face Detection",
    }
);

common_value_enum!(
    /// Drive modes
    pub DriveMode {
        /// One shot per press
        SingleShot = 400 => "Single",
        /// Shoot continuously while pressed
        Continuous = 403 => "Continuous",
        /// Ten-second self timer
        TimerLong = 410 => "Self Timer (10s)",
    }
);

/// Initial state for one property
#[derive(Debug)]
pub(super) struct Seed {
    pub(super) id: PropertyIdentifier,
    pub(super) current: Option<PropertyValue>,
    pub(super) valid: Vec<PropertyValue>,
}

impl Seed {
    fn read_only(id: PropertyIdentifier, current: impl Into<PropertyValue>) -> Self {
        Self {
            id,
            current: Some(current.into()),
            valid: Vec::new(),
        }
    }

    fn settable<T: Into<PropertyValue>>(
        id: PropertyIdentifier,
        current: impl Into<PropertyValue>,
        valid: impl IntoIterator<Item = T>,
    ) -> Self {
        Self {
            id,
            current: Some(current.into()),
            valid: valid.into_iter().map(Into::into).collect(),
        }
    }
}

/// The recording formats the simulated camera offers; the first is the default
const VIDEO_FORMATS: [VideoFormat; 3] = [
    VideoFormat {
        frame_rate: 30,
        width: 1920,
        height: 1080,
        compression: VideoCompression::H264,
    },
    VideoFormat {
        frame_rate: 60,
        width: 1920,
        height: 1080,
        compression: VideoCompression::H264,
    },
    VideoFormat {
        frame_rate: 25,
        width: 3840,
        height: 2160,
        compression: VideoCompression::H265,
    },
];

/// Property values established when a camera connects.
///
/// Aperture, shutter speed and exposure compensation are absent here; they follow from the
/// auto-exposure mode (see [`exposure_lists`]).
pub(super) fn seeds() -> Vec<Seed> {
    use PropertyIdentifier as P;
    vec![
        Seed::read_only(P::BatteryLevel, BatteryLevel::Full),
        Seed::read_only(P::PowerSource, PowerSource::MainsPower),
        Seed::read_only(
            P::ShotsAvailable,
            PropertyValue::common(NO_COMMON_VALUE, "100"),
        ),
        Seed::settable(
            P::FocusMode,
            FocusMode::SingleDrive,
            [
                FocusMode::SingleDrive,
                FocusMode::ContinuousDrive,
                FocusMode::Manual,
            ],
        ),
        Seed::settable(
            P::AfSystem,
            AfSystem::SingleArea,
            [
                AfSystem::SingleArea,
                AfSystem::MultipleAreas,
                AfSystem::FaceDetection,
            ],
        ),
        Seed::settable(
            P::DriveMode,
            DriveMode::SingleShot,
            [
                DriveMode::SingleShot,
                DriveMode::Continuous,
                DriveMode::TimerLong,
            ],
        ),
        Seed::settable(
            P::WhiteBalance,
            WhiteBalance::Daylight,
            [
                WhiteBalance::Auto,
                WhiteBalance::Daylight,
                WhiteBalance::Shade,
                WhiteBalance::Cloudy,
                WhiteBalance::Tungsten,
                WhiteBalance::Fluorescent,
                WhiteBalance::Flash,
                WhiteBalance::Custom,
            ],
        ),
        Seed::settable(
            P::AutoExposureMode,
            AutoExposureMode::ProgramAuto,
            [
                AutoExposureMode::Bulb,
                AutoExposureMode::FullyAutomatic,
                AutoExposureMode::ProgramAuto,
                AutoExposureMode::AperturePriority,
                AutoExposureMode::ShutterPriority,
                AutoExposureMode::FullyManual,
            ],
        ),
        Seed::settable(
            P::IsoSpeed,
            PropertyValue::exposure(DEFAULT_ISO),
            ISO_SPEEDS.map(PropertyValue::exposure),
        ),
        Seed::settable(
            P::VideoRecordingFormat,
            PropertyValue::video_format(VIDEO_FORMATS[0]),
            VIDEO_FORMATS.map(PropertyValue::video_format),
        ),
        Seed::read_only(
            P::LiveViewZoomLevel,
            PropertyValue::zoom_level(LiveViewZoomLevel::new(false, 1)),
        ),
    ]
}

/// The exposure value lists that apply in a given auto-exposure mode
#[derive(Debug, Default, PartialEq)]
pub(super) struct ExposureLists {
    pub(super) aperture: Vec<PropertyValue>,
    pub(super) shutter_speed: Vec<PropertyValue>,
    pub(super) compensation: Vec<PropertyValue>,
}

impl ExposureLists {
    /// Each affected property, with its valid values in this mode and the value it falls back to
    pub(super) fn into_entries(
        self,
    ) -> [(PropertyIdentifier, Vec<PropertyValue>, PropertyValue); 3] {
        [
            (
                PropertyIdentifier::Aperture,
                self.aperture,
                PropertyValue::exposure(DEFAULT_APERTURE),
            ),
            (
                PropertyIdentifier::ShutterSpeed,
                self.shutter_speed,
                PropertyValue::exposure(DEFAULT_SHUTTER_SPEED),
            ),
            (
                PropertyIdentifier::ExposureCompensation,
                self.compensation,
                PropertyValue::exposure(DEFAULT_COMPENSATION),
            ),
        ]
    }
}

/// Computes which exposure settings the user controls in an auto-exposure mode.
///
/// Modes where the user picks the aperture offer the aperture list; modes where the user picks the
/// shutter speed offer the shutter list; modes where the camera meters offer exposure compensation.
/// An unknown mode offers nothing.
pub(super) fn exposure_lists(mode: Option<AutoExposureMode>) -> ExposureLists {
    use AutoExposureMode as M;
    let Some(mode) = mode else {
        return ExposureLists::default();
    };
    let user_aperture = matches!(mode, M::FullyManual | M::Bulb | M::AperturePriority);
    let user_shutter = matches!(mode, M::FullyManual | M::Bulb | M::ShutterPriority);
    let metered = !matches!(mode, M::FullyManual | M::Bulb);

    let mut lists = ExposureLists::default();
    if user_aperture {
        lists.aperture = APERTURES
            .iter()
            .map(|&a| PropertyValue::exposure(FNumber(a)))
            .collect();
    }
    if user_shutter {
        lists.shutter_speed = std::iter::once(ShutterSpeed::Bulb)
            .chain(SHUTTER_SPEEDS)
            .map(PropertyValue::exposure)
            .collect();
    }
    if metered {
        lists.compensation = compensation_values().map(PropertyValue::exposure).collect();
    }
    lists
}
