//! Component profiles and their fixed provisioning constraints.
//!
//! Every per-profile decision in the crate goes through [`ProfileDescriptor`],
//! looked up from a static table, instead of branching on the profile in each
//! module.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Infrastructure component a certificate is provisioned for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Pvwa,
    Psm,
    Html5Gw,
    Pta,
    Vault,
}

/// Whether a PKCS#12 bundle must be password protected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PasswordPolicy {
    /// Always protected; the operator is not asked.
    Mandatory,
    /// Operator chooses; `default` applies when no choice is made.
    Optional { default: bool },
}

/// Where the certificate chain embedded in the bundle comes from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChainPolicy {
    /// Only a chain file discovered next to the unit artifacts.
    DiscoveredOnly,
    /// Explicit intermediate/root files first, discovered chain otherwise.
    OverrideThenDiscovered,
}

/// How units of a multi-node run are labelled on disk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LabelKind {
    Server,
    Node,
}

/// Static constraints attached to a [`Profile`].
#[derive(Debug, Clone, Copy)]
pub struct ProfileDescriptor {
    pub profile: Profile,
    pub short_name: &'static str,
    pub display_name: &'static str,
    pub max_nodes: usize,
    /// A shared CN/SAN certificate may be offered when count > 1.
    pub offers_shared_identity: bool,
    /// Nodes carry hostname and IP addresses in addition to the FQDN.
    pub node_addresses: bool,
    pub password: PasswordPolicy,
    pub chain: ChainPolicy,
    /// Emit PEM side-car files next to the PKCS#12 bundle.
    pub pem_sidecars: bool,
    pub label_kind: LabelKind,
}

const DESCRIPTORS: [ProfileDescriptor; 5] = [
    ProfileDescriptor {
        profile: Profile::Pvwa,
        short_name: "pvwa",
        display_name: "PVWA",
        max_nodes: 10,
        offers_shared_identity: true,
        node_addresses: false,
        password: PasswordPolicy::Optional { default: false },
        chain: ChainPolicy::DiscoveredOnly,
        pem_sidecars: false,
        label_kind: LabelKind::Server,
    },
    ProfileDescriptor {
        profile: Profile::Psm,
        short_name: "psm",
        display_name: "PSM",
        max_nodes: 10,
        offers_shared_identity: true,
        node_addresses: false,
        password: PasswordPolicy::Optional { default: false },
        chain: ChainPolicy::DiscoveredOnly,
        pem_sidecars: false,
        label_kind: LabelKind::Server,
    },
    ProfileDescriptor {
        profile: Profile::Html5Gw,
        short_name: "html5gw",
        display_name: "HTML5GW",
        max_nodes: 10,
        offers_shared_identity: true,
        node_addresses: false,
        password: PasswordPolicy::Optional { default: true },
        chain: ChainPolicy::DiscoveredOnly,
        pem_sidecars: true,
        label_kind: LabelKind::Server,
    },
    ProfileDescriptor {
        profile: Profile::Pta,
        short_name: "pta",
        display_name: "PTA",
        max_nodes: 2,
        offers_shared_identity: true,
        node_addresses: false,
        password: PasswordPolicy::Optional { default: false },
        chain: ChainPolicy::OverrideThenDiscovered,
        pem_sidecars: true,
        label_kind: LabelKind::Server,
    },
    ProfileDescriptor {
        profile: Profile::Vault,
        short_name: "vault",
        display_name: "Vault",
        max_nodes: 5,
        offers_shared_identity: false,
        node_addresses: true,
        password: PasswordPolicy::Mandatory,
        chain: ChainPolicy::DiscoveredOnly,
        pem_sidecars: false,
        label_kind: LabelKind::Node,
    },
];

impl Profile {
    pub const ALL: [Profile; 5] = [
        Profile::Pvwa,
        Profile::Psm,
        Profile::Html5Gw,
        Profile::Pta,
        Profile::Vault,
    ];

    pub fn descriptor(self) -> &'static ProfileDescriptor {
        match self {
            Profile::Pvwa => &DESCRIPTORS[0],
            Profile::Psm => &DESCRIPTORS[1],
            Profile::Html5Gw => &DESCRIPTORS[2],
            Profile::Pta => &DESCRIPTORS[3],
            Profile::Vault => &DESCRIPTORS[4],
        }
    }

    pub fn short_name(self) -> &'static str {
        self.descriptor().short_name
    }

    /// Strategy selection is offered only for shared-identity profiles with
    /// more than one node.
    pub fn offers_strategy(self, count: usize) -> bool {
        self.descriptor().offers_shared_identity && count > 1
    }

    /// Parse a profile from its short or display name, case-insensitively.
    pub fn from_name(name: &str) -> Option<Profile> {
        let name = name.trim();
        Profile::ALL.into_iter().find(|p| {
            let d = p.descriptor();
            d.short_name.eq_ignore_ascii_case(name) || d.display_name.eq_ignore_ascii_case(name)
        })
    }
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.descriptor().display_name)
    }
}
