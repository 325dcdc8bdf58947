//! Semantic version parsing and the `bump_version` rule set.

use crate::errors::{ComposerError, Result};

/// A parsed `MAJOR.MINOR.PATCH` version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct SemVer {
    pub major: u64,
    pub minor: u64,
    pub patch: u64,
}

impl SemVer {
    pub fn parse(s: &str) -> Result<SemVer> {
        let parts: Vec<&str> = s.split('.').collect();
        if parts.len() != 3 {
            return Err(ComposerError::ParseError(format!(
                "'{s}' is not a valid MAJOR.MINOR.PATCH version"
            )));
        }
        let parse_part = |p: &str| {
            p.parse::<u64>()
                .map_err(|_| ComposerError::ParseError(format!("'{s}' is not a valid version")))
        };
        Ok(SemVer {
            major: parse_part(parts[0])?,
            minor: parse_part(parts[1])?,
            patch: parse_part(parts[2])?,
        })
    }

    pub fn bump_patch(self) -> SemVer {
        SemVer {
            patch: self.patch + 1,
            ..self
        }
    }
}

impl std::fmt::Display for SemVer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

/// Compute the version a commit should carry, given the previous commit's
/// version (`old`) and the version the caller supplied (`new`).
///
/// Rules, applied in order:
/// 1. Both absent -> `0.0.1`.
/// 2. `new` absent, `old` present -> increment `old`'s patch by 1.
/// 3. `new` present and differs from `old` (or `old` absent) -> use `new`.
/// 4. `new` present and equals `old` -> increment `old`'s patch by 1.
///
/// A `new` version lower than `old` is still accepted under rule 3: this
/// project treats an explicit caller-supplied version, even a downgrade, as
/// the new truth rather than silently rejecting it.
pub fn bump_version(old: Option<&str>, new: Option<&str>) -> Result<String> {
    match (old, new) {
        (None, None) => Ok("0.0.1".to_string()),
        (Some(old), None) => {
            let old = SemVer::parse(old)?;
            Ok(old.bump_patch().to_string())
        }
        (None, Some(new)) => {
            let new = SemVer::parse(new)?;
            Ok(new.to_string())
        }
        (Some(old_str), Some(new_str)) => {
            let old = SemVer::parse(old_str)?;
            let new = SemVer::parse(new_str)?;
            if new == old {
                Ok(old.bump_patch().to_string())
            } else {
                Ok(new.to_string())
            }
        }
    }
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn semver() -> impl Strategy<Value = String> {
        (0u64..20, 0u64..20, 0u64..20).prop_map(|(a, b, c)| format!("{a}.{b}.{c}"))
    }

    proptest! {
        /// Applying `bump_version` with no explicit `new` is a pure patch
        /// increment: the result is never lower than `old`.
        #[test]
        fn bump_with_no_new_never_decreases(old in semver()) {
            let bumped = bump_version(Some(&old), None).unwrap();
            let old = SemVer::parse(&old).unwrap();
            let bumped = SemVer::parse(&bumped).unwrap();
            prop_assert!(bumped >= old);
        }

        /// A commit chain built by repeatedly calling `bump_version(prev, None)`
        /// is strictly increasing at every step.
        #[test]
        fn commit_chain_is_strictly_increasing(start in semver(), steps in 1usize..10) {
            let mut current = start;
            for _ in 0..steps {
                let next = bump_version(Some(&current), None).unwrap();
                let a = SemVer::parse(&current).unwrap();
                let b = SemVer::parse(&next).unwrap();
                prop_assert!(b > a);
                current = next;
            }
        }

        /// An explicit `new` that differs from `old` always wins verbatim.
        #[test]
        fn explicit_new_wins_when_different(old in semver(), new in semver()) {
            prop_assume!(old != new);
            let result = bump_version(Some(&old), Some(&new)).unwrap();
            prop_assert_eq!(result, new);
        }
    }
}
