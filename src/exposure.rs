//! Exposure values: aperture, shutter speed, ISO and exposure compensation
// (c) 2024 Ross Younger
//!
//! These are opaque, comparable values. The simulator never does stop arithmetic on them;
//! it only offers fixed lists, compares members and renders them for display.

use std::fmt;

use serde::{Deserialize, Serialize};

/// An aperture, held as the f-number in tenths (f/5.6 is `FNumber(56)`)
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FNumber(pub u16);

impl fmt::Display for FNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let (whole, tenths) = (self.0 / 10, self.0 % 10);
        if tenths == 0 {
            write!(f, "f/{whole}")
        } else {
            write!(f, "f/{whole}.{tenths}")
        }
    }
}

/// A shutter speed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ShutterSpeed {
    /// The shutter stays open for as long as it is held down
    Bulb,
    /// A whole number of seconds
    Seconds(u16),
    /// A fraction of a second, `1/n`
    Fraction(u16),
}

impl fmt::Display for ShutterSpeed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutterSpeed::Bulb => f.write_str("Bulb"),
            ShutterSpeed::Seconds(s) => write!(f, "{s}\""),
            ShutterSpeed::Fraction(n) => write!(f, "1/{n}"),
        }
    }
}

/// An ISO speed
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Iso {
    /// The camera chooses
    Auto,
    /// A fixed speed
    Speed(u32),
}

impl fmt::Display for Iso {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Iso::Auto => f.write_str("Auto"),
            Iso::Speed(s) => write!(f, "ISO {s}"),
        }
    }
}

/// Exposure compensation in thirds of a stop
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Compensation(pub i8);

impl fmt::Display for Compensation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0 == 0 {
            return f.write_str("0");
        }
        let sign = if self.0 < 0 { '-' } else { '+' };
        let mag = self.0.unsigned_abs();
        match (mag / 3, mag % 3) {
            (whole, 0) => write!(f, "{sign}{whole}"),
            (0, rem) => write!(f, "{sign}{rem}/3"),
            (whole, rem) => write!(f, "{sign}{whole} {rem}/3"),
        }
    }
}

/// An exposure setting of any kind
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::From)]
pub enum ExposureValue {
    /// Aperture
    Aperture(FNumber),
    /// Shutter speed
    ShutterSpeed(ShutterSpeed),
    /// ISO speed
    Iso(Iso),
    /// Exposure compensation
    Compensation(Compensation),
}

impl fmt::Display for ExposureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExposureValue::Aperture(v) => v.fmt(f),
            ExposureValue::ShutterSpeed(v) => v.fmt(f),
            ExposureValue::Iso(v) => v.fmt(f),
            ExposureValue::Compensation(v) => v.fmt(f),
        }
    }
}

impl ExposureValue {
    /// Whether this value means "the camera decides", e.g. automatic ISO
    #[must_use]
    pub fn is_automatic(&self) -> bool {
        matches!(self, ExposureValue::Iso(Iso::Auto))
    }

    /// Whether this value is the neutral point of its scale, e.g. zero exposure compensation
    #[must_use]
    pub fn is_zero(&self) -> bool {
        matches!(self, ExposureValue::Compensation(Compensation(0)))
    }

    /// Whether this value is the bulb shutter setting
    #[must_use]
    pub fn is_bulb(&self) -> bool {
        matches!(self, ExposureValue::ShutterSpeed(ShutterSpeed::Bulb))
    }
}

/// Apertures offered in manual-aperture modes: f/2.8 to f/16 in thirds of a stop
pub(crate) const APERTURES: [u16; 16] = [
    28, 32, 35, 40, 45, 50, 56, 63, 71, 80, 90, 100, 110, 130, 140, 160,
];
/// Default aperture
pub(crate) const DEFAULT_APERTURE: FNumber = FNumber(40);

/// Timed shutter speeds offered in manual-shutter modes, slowest first, in whole stops
pub(crate) const SHUTTER_SPEEDS: [ShutterSpeed; 19] = [
    ShutterSpeed::Seconds(30),
    ShutterSpeed::Seconds(15),
    ShutterSpeed::Seconds(8),
    ShutterSpeed::Seconds(4),
    ShutterSpeed::Seconds(2),
    ShutterSpeed::Seconds(1),
    ShutterSpeed::Fraction(2),
    ShutterSpeed::Fraction(4),
    ShutterSpeed::Fraction(8),
    ShutterSpeed::Fraction(15),
    ShutterSpeed::Fraction(30),
    ShutterSpeed::Fraction(60),
    ShutterSpeed::Fraction(125),
    ShutterSpeed::Fraction(250),
    ShutterSpeed::Fraction(500),
    ShutterSpeed::Fraction(1000),
    ShutterSpeed::Fraction(2000),
    ShutterSpeed::Fraction(4000),
    ShutterSpeed::Fraction(8000),
];
/// Default shutter speed
pub(crate) const DEFAULT_SHUTTER_SPEED: ShutterSpeed = ShutterSpeed::Fraction(250);

/// ISO speeds offered in every mode
pub(crate) const ISO_SPEEDS: [Iso; 6] = [
    Iso::Auto,
    Iso::Speed(100),
    Iso::Speed(200),
    Iso::Speed(400),
    Iso::Speed(800),
    Iso::Speed(1600),
];
/// Default ISO
pub(crate) const DEFAULT_ISO: Iso = Iso::Speed(100);

/// Exposure compensation range, in thirds of a stop either side of zero
pub(crate) const COMPENSATION_RANGE_THIRDS: i8 = 9;
/// Default exposure compensation
pub(crate) const DEFAULT_COMPENSATION: Compensation = Compensation(0);

/// The full exposure compensation list, most negative first
pub(crate) fn compensation_values() -> impl Iterator<Item = Compensation> {
    (-COMPENSATION_RANGE_THIRDS..=COMPENSATION_RANGE_THIRDS).map(Compensation)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{
        APERTURES, Compensation, ExposureValue, FNumber, Iso, SHUTTER_SPEEDS, ShutterSpeed,
        compensation_values,
    };
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(FNumber(28), "f/2.8")]
    #[case(FNumber(40), "f/4")]
    #[case(FNumber(160), "f/16")]
    fn aperture_display(#[case] v: FNumber, #[case] s: &str) {
        assert_eq!(v.to_string(), s);
    }

    #[rstest]
    #[case(ShutterSpeed::Bulb, "Bulb")]
    #[case(ShutterSpeed::Seconds(30), "30\"")]
    #[case(ShutterSpeed::Fraction(250), "1/250")]
    fn shutter_display(#[case] v: ShutterSpeed, #[case] s: &str) {
        assert_eq!(v.to_string(), s);
    }

    #[rstest]
    #[case(0, "0")]
    #[case(1, "+1/3")]
    #[case(-2, "-2/3")]
    #[case(3, "+1")]
    #[case(-4, "-1 1/3")]
    #[case(9, "+3")]
    fn compensation_display(#[case] thirds: i8, #[case] s: &str) {
        assert_eq!(Compensation(thirds).to_string(), s);
    }

    #[test]
    fn tables() {
        assert_eq!(compensation_values().count(), 19);
        assert_eq!(APERTURES.first(), Some(&28));
        assert_eq!(APERTURES.last(), Some(&160));
        assert_eq!(SHUTTER_SPEEDS.last(), Some(&ShutterSpeed::Fraction(8000)));
    }

    #[test]
    fn value_comparison_is_by_value() {
        let a: ExposureValue = FNumber(56).into();
        let b = ExposureValue::Aperture(FNumber(56));
        assert_eq!(a, b);
        assert_ne!(a, ExposureValue::Aperture(FNumber(63)));
        assert!(ExposureValue::from(Iso::Auto).is_automatic());
        assert!(ExposureValue::from(Compensation(0)).is_zero());
        assert!(ExposureValue::from(ShutterSpeed::Bulb).is_bulb());
        assert_eq!(ExposureValue::from(Iso::Speed(400)).to_string(), "ISO 400");
    }
}
