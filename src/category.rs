//! Command categories: the operating modes a camera can be in
// (c) 2024 Ross Younger

use std::fmt;

use bitflags::bitflags;

use crate::config::FileSystemAccess;

bitflags! {
    /// A set of command categories.
    ///
    /// A camera accepts operations from the categories in its current set, and only certain
    /// combinations can be current at once (see [`supported_combinations`]).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CommandCategorySet: u8 {
        /// Remote stills shooting, including live view and exposure control
        const STILLS_SHOOTING = 1;
        /// Browsing and downloading from the storage card
        const FILESYSTEM_ACCESS = 1 << 1;
        /// Video recording, including live view and exposure control
        const VIDEO_RECORDING = 1 << 2;
    }
}

impl CommandCategorySet {
    /// Whether this set allows shooting of any kind (and therefore live view and property changes)
    #[must_use]
    pub fn allows_shooting(self) -> bool {
        self.intersects(Self::STILLS_SHOOTING | Self::VIDEO_RECORDING)
    }
}

impl fmt::Display for CommandCategorySet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            return f.write_str("{}");
        }
        let names: Vec<_> = self
            .iter()
            .map(|c| {
                if c == Self::STILLS_SHOOTING {
                    "stills"
                } else if c == Self::FILESYSTEM_ACCESS {
                    "filesystem"
                } else {
                    "video"
                }
            })
            .collect();
        write!(f, "{{{}}}", names.join(", "))
    }
}

/// The category combinations a camera supports.
///
/// This is a pure function of whether the camera has storage and how that storage coexists with shooting:
/// * No storage: stills or video, never filesystem access.
/// * Storage alongside shooting: stills or video, each with filesystem access.
/// * Storage exclusive of shooting: stills, video or filesystem access, one at a time.
#[must_use]
pub fn supported_combinations(
    storage_configured: bool,
    policy: FileSystemAccess,
) -> Vec<CommandCategorySet> {
    use CommandCategorySet as C;
    match (storage_configured, policy) {
        (false, _) => vec![C::STILLS_SHOOTING, C::VIDEO_RECORDING],
        (true, FileSystemAccess::Alongside) => vec![
            C::STILLS_SHOOTING | C::FILESYSTEM_ACCESS,
            C::VIDEO_RECORDING | C::FILESYSTEM_ACCESS,
        ],
        (true, FileSystemAccess::Exclusive) => vec![
            C::STILLS_SHOOTING,
            C::VIDEO_RECORDING,
            C::FILESYSTEM_ACCESS,
        ],
    }
}

/// The categories a camera is in immediately after connecting
#[must_use]
pub fn initial_categories(
    storage_configured: bool,
    policy: FileSystemAccess,
) -> CommandCategorySet {
    if storage_configured && policy == FileSystemAccess::Alongside {
        CommandCategorySet::STILLS_SHOOTING | CommandCategorySet::FILESYSTEM_ACCESS
    } else {
        CommandCategorySet::STILLS_SHOOTING
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod test {
    use super::{CommandCategorySet as C, initial_categories, supported_combinations};
    use crate::config::FileSystemAccess;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    #[rstest]
    #[case(false, FileSystemAccess::Alongside, 2)]
    #[case(false, FileSystemAccess::Exclusive, 2)]
    #[case(true, FileSystemAccess::Alongside, 2)]
    #[case(true, FileSystemAccess::Exclusive, 3)]
    fn combinations(#[case] storage: bool, #[case] policy: FileSystemAccess, #[case] n: usize) {
        let combos = supported_combinations(storage, policy);
        assert_eq!(combos.len(), n);
        // The initial set is always one of the supported combinations
        assert!(combos.contains(&initial_categories(storage, policy)));
        // Without storage, filesystem access is never offered
        if !storage {
            assert!(combos.iter().all(|c| !c.contains(C::FILESYSTEM_ACCESS)));
        }
    }

    #[test]
    fn exclusive_combinations_are_disjoint() {
        let combos = supported_combinations(true, FileSystemAccess::Exclusive);
        for (i, a) in combos.iter().enumerate() {
            for b in &combos[i + 1..] {
                assert!(!a.intersects(*b));
            }
        }
    }

    #[test]
    fn display() {
        assert_eq!(C::empty().to_string(), "{}");
        assert_eq!(
            (C::STILLS_SHOOTING | C::FILESYSTEM_ACCESS).to_string(),
            "{stills, filesystem}"
        );
        assert!((C::VIDEO_RECORDING | C::FILESYSTEM_ACCESS).allows_shooting());
        assert!(!C::FILESYSTEM_ACCESS.allows_shooting());
    }
}
