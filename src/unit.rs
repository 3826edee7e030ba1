//! The certificate unit: one certificate to be produced.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::identity::SubjectIdentity;
use crate::profile::{LabelKind, Profile};
use crate::san::{MergeOutcome, SanSet};

/// Position of a unit within its profile run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "index", rename_all = "lowercase")]
pub enum UnitLabel {
    /// The only unit of the run.
    Single,
    Server(usize),
    Node(usize),
}

impl UnitLabel {
    pub(crate) fn numbered(kind: LabelKind, index: usize) -> Self {
        match kind {
            LabelKind::Server => UnitLabel::Server(index),
            LabelKind::Node => UnitLabel::Node(index),
        }
    }

    /// Subdirectory under the profile directory, if any.
    pub fn dir_name(&self) -> Option<String> {
        match self {
            UnitLabel::Single => None,
            UnitLabel::Server(n) => Some(format!("server{}", n)),
            UnitLabel::Node(n) => Some(format!("node{}", n)),
        }
    }
}

impl fmt::Display for UnitLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            UnitLabel::Single => f.write_str("single"),
            UnitLabel::Server(n) => write!(f, "server {}", n),
            UnitLabel::Node(n) => write!(f, "node {}", n),
        }
    }
}

/// Everything needed to request one certificate.
///
/// Units own copies of the identity and SAN set they were built from, so
/// later edits to the run's templates never reach an already-built unit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CertificateUnit {
    pub profile: Profile,
    pub label: UnitLabel,
    pub common_name: String,
    pub identity: SubjectIdentity,
    pub sans: SanSet,
    pub key_length: u32,
}

impl CertificateUnit {
    /// File base name: the profile short name plus an optional `-serverN` or
    /// `-nodeN` suffix.
    pub fn base_name(&self) -> String {
        match self.label.dir_name() {
            Some(suffix) => format!("{}-{}", self.profile.short_name(), suffix),
            None => self.profile.short_name().to_string(),
        }
    }

    /// Human readable label, e.g. `PSM server 2`.
    pub fn display_label(&self) -> String {
        format!("{} {}", self.profile, self.label)
    }

    /// Merge operator-supplied extra SANs after the topology-derived ones.
    pub fn with_extra_sans<S: AsRef<str>>(mut self, extra: &[S]) -> (Self, MergeOutcome) {
        let outcome = self.sans.merge(extra);
        self.sans = outcome.set.clone();
        (self, outcome)
    }
}
