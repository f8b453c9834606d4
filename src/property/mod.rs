//! Camera properties: identifiers, categories, values and the registry that holds them
// (c) 2024 Ross Younger

use bitflags::bitflags;

mod registry;
pub use registry::{Property, PropertyObservation};
pub(crate) use registry::PropertyRegistry;

mod tables;
pub use tables::{
    AfSystem, AutoExposureMode, BatteryLevel, DriveMode, FocusMode, PowerSource, WhiteBalance,
};

mod value;
pub use value::{
    LiveViewZoomLevel, NO_COMMON_VALUE, PropertyValue, ValuePayload, VideoCompression,
    VideoFormat,
};

/// Identifies a camera property
#[derive(
    Copy,
    Clone,
    Debug,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    strum::Display,
    strum::EnumIter,
    strum::EnumCount,
)]
#[allow(missing_docs)]
pub enum PropertyIdentifier {
    IsoSpeed,
    ShutterSpeed,
    Aperture,
    ExposureCompensation,
    BatteryLevel,
    PowerSource,
    AfSystem,
    FocusMode,
    DriveMode,
    AutoExposureMode,
    InCameraBracketingEnabled,
    MirrorLockupEnabled,
    MirrorLockupStage,
    DofPreviewEnabled,
    ShotsAvailable,
    LensStatus,
    ColorTone,
    ArtFilter,
    DigitalZoom,
    WhiteBalance,
    NoiseReduction,
    ImageQuality,
    LightMeterStatus,
    LightMeterReading,
    ExposureMeteringMode,
    ReadyForCapture,
    ImageDestination,
    VideoRecordingFormat,
    LiveViewZoomLevel,
}

/// Broad groupings of properties
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, strum::Display)]
pub enum PropertyCategory {
    /// Aperture, shutter speed, ISO and friends
    Exposure,
    /// Focus and drive settings
    Capture,
    /// Settings affecting how the image looks
    Imaging,
    /// Settings affecting how images are stored
    Configuration,
    /// Read-only camera status
    Information,
    /// Video recording format
    VideoFormat,
    /// Live view zoom
    LiveViewZoomLevel,
}

impl PropertyIdentifier {
    /// The category this property belongs to
    #[must_use]
    pub fn category(self) -> PropertyCategory {
        use PropertyCategory as C;
        use PropertyIdentifier as P;
        match self {
            P::IsoSpeed
            | P::ShutterSpeed
            | P::Aperture
            | P::ExposureCompensation
            | P::LightMeterReading => C::Exposure,
            P::AfSystem
            | P::FocusMode
            | P::DriveMode
            | P::MirrorLockupEnabled
            | P::MirrorLockupStage
            | P::DigitalZoom => C::Capture,
            P::WhiteBalance
            | P::ColorTone
            | P::ArtFilter
            | P::AutoExposureMode
            | P::ExposureMeteringMode => C::Imaging,
            P::InCameraBracketingEnabled
            | P::NoiseReduction
            | P::ImageQuality
            | P::ImageDestination => C::Configuration,
            P::BatteryLevel
            | P::PowerSource
            | P::ShotsAvailable
            | P::LensStatus
            | P::LightMeterStatus
            | P::DofPreviewEnabled
            | P::ReadyForCapture => C::Information,
            P::VideoRecordingFormat => C::VideoFormat,
            P::LiveViewZoomLevel => C::LiveViewZoomLevel,
        }
    }

    /// A human-readable name for the property
    #[must_use]
    pub fn display_name(self) -> &'static str {
        use PropertyIdentifier as P;
        match self {
            P::IsoSpeed => "ISO",
            P::ShutterSpeed => "Shutter Speed",
            P::Aperture => "Aperture",
            P::ExposureCompensation => "Exposure Compensation",
            P::BatteryLevel => "Battery",
            P::PowerSource => "Power Source",
            P::AfSystem => "AF System",
            P::FocusMode => "Focus Mode",
            P::DriveMode => "Drive Mode",
            P::AutoExposureMode => "Exposure Mode",
            P::InCameraBracketingEnabled => "Bracketing",
            P::MirrorLockupEnabled => "Mirror Lockup",
            P::MirrorLockupStage => "Mirror Lockup Stage",
            P::DofPreviewEnabled => "Depth of Field Preview",
            P::ShotsAvailable => "Shots Available",
            P::LensStatus => "Lens",
            P::ColorTone => "Picture Style",
            P::ArtFilter => "Art Filter",
            P::DigitalZoom => "Digital Zoom",
            P::WhiteBalance => "White Balance",
            P::NoiseReduction => "Noise Reduction",
            P::ImageQuality => "Image Quality",
            P::LightMeterStatus => "Light Meter Status",
            P::LightMeterReading => "Light Meter",
            P::ExposureMeteringMode => "Metering Mode",
            P::ReadyForCapture => "Ready",
            P::ImageDestination => "Image Destination",
            P::VideoRecordingFormat => "Video Format",
            P::LiveViewZoomLevel => "Live View Zoom",
        }
    }
}

/// Every property identifier the simulated camera knows about
pub fn known_property_identifiers() -> impl Iterator<Item = PropertyIdentifier> {
    <PropertyIdentifier as strum::IntoEnumIterator>::iter()
}

bitflags! {
    /// How a property's value may be changed
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ValueSetType: u8 {
        /// Choose any member of the valid settable values
        const ENUMERATION = 1;
        /// Step up or down through the valid settable values
        const STEPPING = 1 << 1;
    }
}

bitflags! {
    /// What changed about a property, as reported to observers
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct PropertyChangeType: u8 {
        /// The current value
        const VALUE = 1;
        /// The pending value
        const PENDING_VALUE = 1 << 1;
        /// The list of valid settable values
        const VALID_SETTABLE_VALUES = 1 << 2;
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{PropertyCategory, PropertyIdentifier, known_property_identifiers};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use strum::EnumCount as _;

    #[rstest]
    #[case(PropertyIdentifier::Aperture, PropertyCategory::Exposure)]
    #[case(PropertyIdentifier::LightMeterReading, PropertyCategory::Exposure)]
    #[case(PropertyIdentifier::DriveMode, PropertyCategory::Capture)]
    #[case(PropertyIdentifier::AutoExposureMode, PropertyCategory::Imaging)]
    #[case(PropertyIdentifier::ImageQuality, PropertyCategory::Configuration)]
    #[case(PropertyIdentifier::BatteryLevel, PropertyCategory::Information)]
    #[case(PropertyIdentifier::VideoRecordingFormat, PropertyCategory::VideoFormat)]
    #[case(PropertyIdentifier::LiveViewZoomLevel, PropertyCategory::LiveViewZoomLevel)]
    fn categories(#[case] id: PropertyIdentifier, #[case] expected: PropertyCategory) {
        assert_eq!(id.category(), expected);
    }

    #[test]
    fn every_identifier_is_known() {
        assert_eq!(known_property_identifiers().count(), PropertyIdentifier::COUNT);
        assert!(known_property_identifiers().all(|p| !p.display_name().is_empty()));
    }
}
