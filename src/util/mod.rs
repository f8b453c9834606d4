//! General utility code that didn't fit anywhere else
// (c) 2024 Ross Younger

use std::sync::{Mutex, MutexGuard, PoisonError};

mod tracing;
pub use tracing::{
    TimeFormat, TraceOutput, is_initialized as tracing_is_initialised, setup as setup_tracing,
};

/// Locks a mutex, carrying on regardless if a previous holder panicked.
///
/// The state guarded by our mutexes is always left consistent between statements,
/// so a poisoned lock holds nothing worse than what a panicking observer left behind.
pub(crate) fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Implements `Deserialize` for a unit enum by way of its `FromStr` implementation.
///
/// The enum must derive `strum::EnumString` and `strum::VariantNames`; marking it
/// `#[strum(ascii_case_insensitive)]` makes configuration values case insensitive.
macro_rules! deserialize_enum_from_str {
    ($t:ty) => {
        impl<'de> serde::Deserialize<'de> for $t {
            fn deserialize<D>(deserializer: D) -> std::result::Result<Self, D::Error>
            where
                D: serde::Deserializer<'de>,
            {
                use strum::VariantNames as _;
                let s = String::deserialize(deserializer)?;
                std::str::FromStr::from_str(s.trim())
                    .map_err(|_| serde::de::Error::unknown_variant(&s, <$t>::VARIANTS))
            }
        }
    };
}
pub(crate) use deserialize_enum_from_str;

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::lock;
    use pretty_assertions::assert_eq;
    use std::sync::{Arc, Mutex};

    #[test]
    fn lock_survives_poisoning() {
        let m = Arc::new(Mutex::new(1));
        let m2 = m.clone();
        let _ = std::thread::spawn(move || {
            let _guard = m2.lock().unwrap();
            panic!("poison the mutex");
        })
        .join();
        assert!(m.is_poisoned());
        *lock(&m) += 1;
        assert_eq!(*lock(&m), 2);
    }
}
