//! Decides whether a prior run may be reused.

use std::fmt::{Display, Formatter};

use crate::hash::ContentHash;
use crate::report::Report;

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum InvalidReason {
    /// No report, or a report without any content.
    CacheDamaged,
    NoHashRecorded,
    HashMismatch { stored: ContentHash, current: ContentHash },
}

impl Display for InvalidReason {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            InvalidReason::CacheDamaged => write!(f, "cache is damaged"),
            InvalidReason::NoHashRecorded => write!(f, "no input hash recorded"),
            InvalidReason::HashMismatch { stored, current } => {
                write!(f, "input hash changed from {} to {}", stored, current)
            }
        }
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Validity {
    Valid,
    Invalid(InvalidReason),
}

impl Validity {
    pub fn is_valid(&self) -> bool {
        matches!(self, Validity::Valid)
    }
}

/// Checks a prior report against the hash of the current input.
pub fn validate(prior: Option<&Report>, current: &ContentHash) -> Validity {
    let Some(report) = prior.filter(|r| !r.is_empty()) else {
        return Validity::Invalid(InvalidReason::CacheDamaged);
    };
    match &report.file_md5 {
        None => Validity::Invalid(InvalidReason::NoHashRecorded),
        Some(stored) if stored != current => Validity::Invalid(InvalidReason::HashMismatch {
            stored: stored.clone(),
            current: current.clone(),
        }),
        Some(_) => Validity::Valid,
    }
}
