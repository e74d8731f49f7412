//! Per-video properties kept in the flag store.

use serde::Serialize;
use serde_json::{Map, Value};
use std::{fmt, str::FromStr};

/// The flag store record for one video.
///
/// Only `is_archived` is owned by this service; every other field is carried
/// through untouched.
#[derive(Serialize, Clone, Debug, Default, PartialEq)]
pub struct VideoProperties {
    pub is_archived: bool,

    #[serde(flatten)]
    pub other: Map<String, Value>,
}

/// A requested archive state transition.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ArchiveAction {
    Archive,
    Unarchive,
}

impl ArchiveAction {
    /// Value written to `is_archived` for this action.
    pub fn is_archived(self) -> bool {
        matches!(self, ArchiveAction::Archive)
    }

    pub fn past_tense(self) -> &'static str {
        match self {
            ArchiveAction::Archive => "archived",
            ArchiveAction::Unarchive => "unarchived",
        }
    }
}

/// Error for an action string that is neither `archive` nor `unarchive`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownAction(pub String);

impl fmt::Display for UnknownAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown action `{}`", self.0)
    }
}

impl std::error::Error for UnknownAction {}

impl FromStr for ArchiveAction {
    type Err = UnknownAction;

    /// Exact, case-sensitive match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "archive" => Ok(ArchiveAction::Archive),
            "unarchive" => Ok(ArchiveAction::Unarchive),
            other => Err(UnknownAction(other.to_string())),
        }
    }
}

impl fmt::Display for ArchiveAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArchiveAction::Archive => f.write_str("archive"),
            ArchiveAction::Unarchive => f.write_str("unarchive"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_only_exact_actions() {
        assert_eq!("archive".parse::<ArchiveAction>(), Ok(ArchiveAction::Archive));
        assert_eq!("unarchive".parse::<ArchiveAction>(), Ok(ArchiveAction::Unarchive));
        assert!("Archive".parse::<ArchiveAction>().is_err());
        assert!("banana".parse::<ArchiveAction>().is_err());
        assert!("".parse::<ArchiveAction>().is_err());
    }

    #[test]
    fn archive_sets_flag_and_unarchive_clears_it() {
        assert!(ArchiveAction::Archive.is_archived());
        assert!(!ArchiveAction::Unarchive.is_archived());
        assert_eq!(ArchiveAction::Unarchive.past_tense(), "unarchived");
    }
}
