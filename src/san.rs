//! Subject Alternative Name sets
//!
//! A [`SanSet`] is an ordered, duplicate-free list of DNS names and IPv4
//! addresses. Each entry carries a per-kind index (`DNS.1`, `DNS.2`, `IP.1`,
//! ...) used when the set is written out for a signing request or shown to
//! the CA operator.
//!
//! Sets are values: [`SanSet::merge`] never mutates its receiver, it returns a
//! new set with the accepted entries appended after the existing ones.
//! Existing entries are never reordered or renumbered.
//!
//! Comparison is exact-string: `Host.Example` and `host.example` are distinct
//! entries.

use std::fmt;
use std::net::Ipv4Addr;

use serde::{Deserialize, Serialize};

const MAX_DNS_NAME_LEN: usize = 253;

/// A single alternative name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value")]
pub enum SanEntry {
    Dns(String),
    Ip(Ipv4Addr),
}

/// Discriminant of a [`SanEntry`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanKind {
    Dns,
    Ip,
}

impl SanKind {
    fn prefix(self) -> &'static str {
        match self {
            SanKind::Dns => "DNS",
            SanKind::Ip => "IP",
        }
    }
}

impl SanEntry {
    pub fn kind(&self) -> SanKind {
        match self {
            SanEntry::Dns(_) => SanKind::Dns,
            SanEntry::Ip(_) => SanKind::Ip,
        }
    }

    /// Value as written into the signing request.
    pub fn value(&self) -> String {
        match self {
            SanEntry::Dns(name) => name.clone(),
            SanEntry::Ip(addr) => addr.to_string(),
        }
    }

    /// Classify a raw operator string.
    ///
    /// Dotted quads become IP entries; anything else must be a well-formed DNS
    /// name. Four all-digit groups with an octet above 255 are rejected rather
    /// than being treated as a host name.
    pub fn classify(raw: &str) -> Option<SanEntry> {
        let raw = raw.trim();
        if looks_like_dotted_quad(raw) {
            return parse_ipv4(raw).map(SanEntry::Ip);
        }
        if is_dns_name(raw) {
            return Some(SanEntry::Dns(raw.to_string()));
        }
        None
    }
}

impl fmt::Display for SanEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind().prefix(), self.value())
    }
}

/// Dotted-quad IPv4 parser that, unlike `Ipv4Addr::from_str`, accepts
/// leading zeros in an octet (`010.0.0.1` is `10.0.0.1`).
pub fn parse_ipv4(raw: &str) -> Option<Ipv4Addr> {
    let raw = raw.trim();
    if !looks_like_dotted_quad(raw) {
        return None;
    }
    let mut octets = [0u8; 4];
    for (slot, part) in octets.iter_mut().zip(raw.split('.')) {
        *slot = part.parse().ok()?;
    }
    Some(Ipv4Addr::from(octets))
}

fn looks_like_dotted_quad(raw: &str) -> bool {
    let parts: Vec<&str> = raw.split('.').collect();
    parts.len() == 4
        && parts
            .iter()
            .all(|p| !p.is_empty() && p.len() <= 3 && p.bytes().all(|b| b.is_ascii_digit()))
}

/// Alphanumerics, hyphens and dots; no leading, trailing or doubled dots.
pub fn is_dns_name(raw: &str) -> bool {
    !raw.is_empty()
        && raw.len() <= MAX_DNS_NAME_LEN
        && !raw.starts_with('.')
        && !raw.ends_with('.')
        && !raw.contains("..")
        && raw
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'.')
}

/// An entry together with its per-kind serialization index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexedSan {
    pub entry: SanEntry,
    pub index: u32,
}

impl IndexedSan {
    /// `DNS.1 = host.example` form used in request configs.
    pub fn config_line(&self) -> String {
        format!(
            "{}.{} = {}",
            self.entry.kind().prefix(),
            self.index,
            self.entry.value()
        )
    }
}

/// Why an extra SAN string was not appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RejectReason {
    /// Neither an IPv4 literal nor a DNS name.
    Malformed,
    /// Already present in the set.
    Duplicate,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RejectedSan {
    pub raw: String,
    pub reason: RejectReason,
}

/// Result of [`SanSet::merge`].
#[derive(Debug, Clone)]
pub struct MergeOutcome {
    pub set: SanSet,
    pub rejected: Vec<RejectedSan>,
}

/// Ordered, duplicate-free set of alternative names.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SanSet {
    entries: Vec<IndexedSan>,
}

impl SanSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a set from topology-derived entries, in order. Repeated entries
    /// are kept once at their first position.
    pub fn build(entries: impl IntoIterator<Item = SanEntry>) -> Self {
        let mut set = SanSet::new();
        for entry in entries {
            set.push(entry);
        }
        set
    }

    /// Append operator-supplied raw strings after the existing entries.
    pub fn merge<S: AsRef<str>>(&self, extra: &[S]) -> MergeOutcome {
        let mut set = self.clone();
        let mut rejected = Vec::new();
        for raw in extra {
            let raw = raw.as_ref();
            match SanEntry::classify(raw) {
                None => rejected.push(RejectedSan {
                    raw: raw.to_string(),
                    reason: RejectReason::Malformed,
                }),
                Some(entry) => {
                    if !set.push(entry) {
                        rejected.push(RejectedSan {
                            raw: raw.to_string(),
                            reason: RejectReason::Duplicate,
                        });
                    }
                }
            }
        }
        MergeOutcome { set, rejected }
    }

    /// Appends unless already present. Returns whether the entry was added.
    fn push(&mut self, entry: SanEntry) -> bool {
        if self.contains(&entry) {
            return false;
        }
        let index = self.max_index(entry.kind()) + 1;
        self.entries.push(IndexedSan { entry, index });
        true
    }

    pub fn contains(&self, entry: &SanEntry) -> bool {
        self.entries.iter().any(|e| &e.entry == entry)
    }

    fn max_index(&self, kind: SanKind) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.entry.kind() == kind)
            .map(|e| e.index)
            .max()
            .unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &IndexedSan> {
        self.entries.iter()
    }

    /// Entries of one kind in index order.
    pub fn of_kind(&self, kind: SanKind) -> impl Iterator<Item = &IndexedSan> {
        self.entries.iter().filter(move |e| e.entry.kind() == kind)
    }

    pub fn first_dns(&self) -> Option<&str> {
        self.entries.iter().find_map(|e| match &e.entry {
            SanEntry::Dns(name) => Some(name.as_str()),
            SanEntry::Ip(_) => None,
        })
    }

    /// `DNS.n = ...` lines, all DNS entries first, then all IP entries.
    pub fn config_lines(&self) -> Vec<String> {
        self.of_kind(SanKind::Dns)
            .chain(self.of_kind(SanKind::Ip))
            .map(IndexedSan::config_line)
            .collect()
    }
}
