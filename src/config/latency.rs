//! Simulated operation latency
// (c) 2024 Ross Younger

use std::time::Duration;

use human_repr::HumanDuration as _;
use serde::{Deserialize, Serialize};
use tracing::trace;

/// Named connection-speed profiles.
///
/// Each profile maps the three operation sizes to a fixed delay.
/// `Custom` uses the delays given in the configuration's `custom_latency` field.
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
pub enum ConnectionSpeed {
    /// Resembles a congested WiFi link
    Slow,
    /// Resembles a good USB or WiFi link
    #[default]
    Fast,
    /// No delays at all
    Instant,
    /// Delays taken from configuration
    Custom,
}
crate::util::deserialize_enum_from_str!(ConnectionSpeed);

/// The size class of a simulated operation
#[derive(Copy, Clone, Debug, Eq, PartialEq, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum OperationSize {
    /// Property commits, authentication prompts, short follow-ups
    Small,
    /// Directory enumeration, previews, disconnection
    Medium,
    /// Category switches, stream start/stop, file chunks, transfers
    Large,
}

/// Maps operation sizes to simulated durations.
///
/// This is pure configuration. All simulated waiting in the crate goes through
/// [`LatencyModel::wait`], so that tests running on a paused tokio clock are
/// deterministic.
#[derive(Copy, Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LatencyModel {
    /// Delay applied to small operations
    #[serde(with = "seconds")]
    pub small: Duration,
    /// Delay applied to medium operations
    #[serde(with = "seconds")]
    pub medium: Duration,
    /// Delay applied to large operations
    #[serde(with = "seconds")]
    pub large: Duration,
}

impl Default for LatencyModel {
    fn default() -> Self {
        Self::for_speed(ConnectionSpeed::Fast, None)
    }
}

impl LatencyModel {
    /// Constructor
    #[must_use]
    pub fn new(small: Duration, medium: Duration, large: Duration) -> Self {
        Self {
            small,
            medium,
            large,
        }
    }

    /// The delays for a named profile.
    ///
    /// `custom` is only consulted for [`ConnectionSpeed::Custom`]; if it is absent, the `Fast` delays apply.
    #[must_use]
    pub fn for_speed(speed: ConnectionSpeed, custom: Option<LatencyModel>) -> Self {
        match (speed, custom) {
            (ConnectionSpeed::Custom, Some(custom)) => custom,
            (ConnectionSpeed::Slow, _) => Self::new(
                Duration::from_millis(100),
                Duration::from_millis(200),
                Duration::from_millis(500),
            ),
            (ConnectionSpeed::Instant, _) => {
                Self::new(Duration::ZERO, Duration::ZERO, Duration::ZERO)
            }
            (ConnectionSpeed::Fast | ConnectionSpeed::Custom, _) => Self::new(
                Duration::from_millis(40),
                Duration::from_nanos(66_666_667),
                Duration::from_millis(100),
            ),
        }
    }

    /// The delay for an operation size
    #[must_use]
    pub fn delay(&self, size: OperationSize) -> Duration {
        match size {
            OperationSize::Small => self.small,
            OperationSize::Medium => self.medium,
            OperationSize::Large => self.large,
        }
    }

    /// Sleeps for the delay of an operation size
    pub async fn wait(&self, size: OperationSize) {
        let d = self.delay(size);
        trace!("simulating {size} operation ({})", d.human_duration());
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }

    /// Sleeps for a multiple of the delay of an operation size
    pub async fn wait_multiple(&self, size: OperationSize, factor: u32) {
        let d = self.delay(size).saturating_mul(factor);
        trace!("simulating {factor}x {size} operation ({})", d.human_duration());
        if !d.is_zero() {
            tokio::time::sleep(d).await;
        }
    }
}

/// Serde helpers expressing a [`Duration`] as a floating-point number of seconds
pub(crate) mod seconds {
    use serde::{Deserialize as _, Deserializer, Serializer, de::Error as _};
    use std::time::Duration;

    pub(crate) fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub(crate) fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs)
            .map_err(|e| D::Error::custom(format!("invalid duration {secs}: {e}")))
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{ConnectionSpeed, LatencyModel, OperationSize};
    use pretty_assertions::assert_eq;
    use rstest::rstest;
    use std::{str::FromStr as _, time::Duration};

    #[rstest]
    #[case(ConnectionSpeed::Slow, 100, 200, 500)]
    #[case(ConnectionSpeed::Fast, 40, 66, 100)]
    #[case(ConnectionSpeed::Instant, 0, 0, 0)]
    fn presets(#[case] speed: ConnectionSpeed, #[case] s: u128, #[case] m: u128, #[case] l: u128) {
        let model = LatencyModel::for_speed(speed, None);
        assert_eq!(model.delay(OperationSize::Small).as_millis(), s);
        assert_eq!(model.delay(OperationSize::Medium).as_millis(), m);
        assert_eq!(model.delay(OperationSize::Large).as_millis(), l);
    }

    #[test]
    fn custom_uses_given_delays() {
        let custom = LatencyModel::new(
            Duration::from_secs(1),
            Duration::from_secs(2),
            Duration::from_secs(3),
        );
        assert_eq!(
            LatencyModel::for_speed(ConnectionSpeed::Custom, Some(custom)),
            custom
        );
        assert_eq!(
            LatencyModel::for_speed(ConnectionSpeed::Custom, None),
            LatencyModel::for_speed(ConnectionSpeed::Fast, None)
        );
    }

    #[test]
    fn speed_names_are_case_insensitive() {
        assert_eq!(
            ConnectionSpeed::from_str("INSTANT").unwrap(),
            ConnectionSpeed::Instant
        );
        assert_eq!(ConnectionSpeed::Slow.to_string(), "slow");
    }

    #[tokio::test(start_paused = true)]
    async fn wait_advances_the_clock() {
        let model = LatencyModel::for_speed(ConnectionSpeed::Slow, None);
        let start = tokio::time::Instant::now();
        model.wait(OperationSize::Large).await;
        let after_large = start.elapsed();
        assert!(after_large >= Duration::from_millis(500));
        assert!(after_large < Duration::from_millis(510));
        model.wait_multiple(OperationSize::Small, 20).await;
        assert!(start.elapsed() >= after_large + Duration::from_secs(2));
    }
}
