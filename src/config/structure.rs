//! Configuration structure
// (c) 2024 Ross Younger

use std::path::PathBuf;
use std::sync::LazyLock;
use std::time::Duration;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use super::latency::{ConnectionSpeed, LatencyModel, seconds};

/// How the simulated camera asks the client to authenticate when connecting
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case")]
pub enum Authentication {
    /// No authentication; connections proceed straight away
    None,
    /// The user must approve the connection "on the camera".
    /// This succeeds by itself after [`SimulatorConfiguration::pair_on_device_delay`].
    #[default]
    PairOnDevice,
    /// The client must submit a matching username and password
    UsernamePassword {
        /// Expected user name
        username: String,
        /// Expected password
        password: String,
    },
    /// The client must submit a matching four-digit numeric code
    FourDigitCode {
        /// Expected code
        code: String,
    },
}

/// The transports over which the simulated camera claims to be reachable
#[derive(
    Copy,
    Clone,
    Debug,
    Eq,
    PartialEq,
    Hash,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum CameraTransport {
    /// WiFi or ethernet
    Network,
    /// USB cable
    Usb,
}
crate::util::deserialize_enum_from_str!(CameraTransport);

/// How exposure properties (aperture, shutter speed, ISO, exposure compensation) are settable
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(serialize_all = "lowercase", ascii_case_insensitive)]
#[serde(rename_all = "lowercase")]
pub enum ExposurePropertyType {
    /// Pick a value from a list
    #[default]
    Enumerated,
    /// Step up and down through a list
    Stepped,
}
crate::util::deserialize_enum_from_str!(ExposurePropertyType);

/// How filesystem access coexists with remote shooting
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Eq,
    PartialEq,
    Serialize,
    strum::Display,
    strum::EnumString,
    strum::VariantNames,
)]
#[strum(serialize_all = "kebab-case", ascii_case_insensitive)]
#[serde(rename_all = "kebab-case")]
pub enum FileSystemAccess {
    /// The filesystem is available at the same time as stills shooting or video recording
    #[default]
    Alongside,
    /// The filesystem is a mode of its own
    Exclusive,
}
crate::util::deserialize_enum_from_str!(FileSystemAccess);

/// The set of configurable options for a simulated camera.
///
/// There is no `default()`.
/// The hard-wired defaults are available through [`SimulatorConfiguration::system_default()`].
///
/// Configuration is read once, when a [`Camera`](crate::Camera) is created.
/// Changes made afterwards apply only to cameras created afterwards.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SimulatorConfiguration {
    /// The camera's manufacturer, as reported in its device info
    pub manufacturer: String,
    /// The camera's model name
    pub model: String,
    /// A unique identifier for the camera
    pub identifier: String,

    /// Authentication required when connecting
    pub authentication: Authentication,
    /// How many further rounds a client gets after submitting wrong credentials
    pub authentication_retries: u32,
    /// How long pairing on the device takes to complete by itself, in seconds
    #[serde(with = "seconds")]
    pub pair_on_device_delay: Duration,

    /// The simulated latency profile
    pub connection_speed: ConnectionSpeed,
    /// Delays used when `connection_speed` is `custom`
    pub custom_latency: Option<LatencyModel>,
    /// Transports the camera is reachable by
    pub transports: Vec<CameraTransport>,

    /// How exposure properties are settable
    pub exposure_property_type: ExposurePropertyType,

    /// JPEG images played in a loop as live view frames
    pub live_view_frames: Vec<PathBuf>,
    /// Live view frames per second
    pub live_view_frame_rate: u32,

    /// A directory presented as the camera's storage card.
    /// If absent, the camera has no storage and never offers filesystem access.
    pub storage_root: Option<PathBuf>,
    /// How filesystem access coexists with remote shooting
    pub file_system_access: FileSystemAccess,
}

static SYSTEM_DEFAULT_CONFIG: LazyLock<SimulatorConfiguration> =
    LazyLock::new(|| SimulatorConfiguration {
        manufacturer: "Cascable".into(),
        model: "Simulated Camera".into(),
        identifier: "se.cascable.simulated-camera".into(),
        authentication: Authentication::PairOnDevice,
        authentication_retries: 1,
        pair_on_device_delay: Duration::from_secs(3),
        connection_speed: ConnectionSpeed::Fast,
        custom_latency: None,
        transports: vec![CameraTransport::Network, CameraTransport::Usb],
        exposure_property_type: ExposurePropertyType::Enumerated,
        live_view_frames: Vec::new(),
        live_view_frame_rate: 30,
        storage_root: None,
        file_system_access: FileSystemAccess::Alongside,
    });

impl SimulatorConfiguration {
    /// Hard-wired configuration defaults
    #[must_use]
    pub fn system_default() -> &'static Self {
        &SYSTEM_DEFAULT_CONFIG
    }

    /// The latency model implied by `connection_speed` and `custom_latency`
    #[must_use]
    pub fn latency(&self) -> LatencyModel {
        LatencyModel::for_speed(self.connection_speed, self.custom_latency)
    }

    /// The interval between live view frames
    #[must_use]
    pub fn live_view_frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.live_view_frame_rate.max(1)
    }

    /// Performs additional validation checks on the configuration
    pub fn validate(&self) -> Result<()> {
        if self.live_view_frame_rate == 0 {
            anyhow::bail!("live_view_frame_rate must be at least 1");
        }
        if let Authentication::FourDigitCode { code } = &self.authentication
            && (code.len() != 4 || !code.bytes().all(|b| b.is_ascii_digit()))
        {
            anyhow::bail!(
                "four-digit authentication code must be exactly four digits (got {code:?})"
            );
        }
        if self.connection_speed == ConnectionSpeed::Custom && self.custom_latency.is_none() {
            anyhow::bail!("connection_speed is custom but no custom_latency was given");
        }
        if self.transports.is_empty() {
            anyhow::bail!("at least one transport must be configured");
        }
        Ok(())
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{Authentication, SimulatorConfiguration};
    use crate::config::{ConnectionSpeed, LatencyModel};
    use pretty_assertions::assert_eq;
    use std::time::Duration;

    #[test]
    fn defaults_are_valid() {
        let cfg = SimulatorConfiguration::system_default();
        cfg.validate().unwrap();
        assert_eq!(cfg.authentication, Authentication::PairOnDevice);
        assert_eq!(cfg.authentication_retries, 1);
        assert_eq!(cfg.latency(), LatencyModel::for_speed(ConnectionSpeed::Fast, None));
    }

    #[test]
    fn frame_interval() {
        let mut cfg = SimulatorConfiguration::system_default().clone();
        assert_eq!(cfg.live_view_frame_interval(), Duration::from_nanos(33_333_333));
        cfg.live_view_frame_rate = 10;
        assert_eq!(cfg.live_view_frame_interval(), Duration::from_millis(100));
    }

    #[test]
    fn validate() {
        let mut cfg = SimulatorConfiguration::system_default().clone();
        cfg.authentication = Authentication::FourDigitCode {
            code: "12a4".into(),
        };
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("exactly four digits"));

        cfg.authentication = Authentication::FourDigitCode {
            code: "1234".into(),
        };
        cfg.validate().unwrap();

        cfg.live_view_frame_rate = 0;
        assert!(cfg.validate().is_err());
        cfg.live_view_frame_rate = 30;

        cfg.connection_speed = ConnectionSpeed::Custom;
        assert!(cfg.validate().is_err());
        cfg.custom_latency = Some(LatencyModel::default());
        cfg.validate().unwrap();

        cfg.transports.clear();
        assert!(cfg.validate().is_err());
    }
}
