//! Topology planning
//!
//! Decides how many certificates a profile run produces and what each one is
//! called. Multi-node runs of shared-identity profiles choose between a single
//! certificate whose SAN covers every node (optionally fronted by a load
//! balancer name) and one certificate per node. Vault always gets one
//! certificate per node, each carrying the node's FQDN, hostname and IPs.

use std::net::Ipv4Addr;

use tracing::debug;

use crate::error::{ProvisionError, Result};
use crate::identity::SubjectIdentity;
use crate::profile::Profile;
use crate::san::{is_dns_name, SanEntry, SanSet};
use crate::unit::{CertificateUnit, UnitLabel};

pub const MAX_NODE_IPS: usize = 3;

/// One server or node of the topology.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRecord {
    pub fqdn: String,
    pub hostname: Option<String>,
    pub ips: Vec<Ipv4Addr>,
}

impl NodeRecord {
    pub fn new(fqdn: impl Into<String>) -> Self {
        Self {
            fqdn: fqdn.into(),
            hostname: None,
            ips: Vec::new(),
        }
    }

    pub fn with_addresses(
        fqdn: impl Into<String>,
        hostname: impl Into<String>,
        ips: Vec<Ipv4Addr>,
    ) -> Self {
        Self {
            fqdn: fqdn.into(),
            hostname: Some(hostname.into()),
            ips,
        }
    }
}

/// Certificate strategy for runs with more than one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// One certificate whose SAN lists every node.
    SingleWithSan,
    /// One certificate per node.
    UniquePerNode,
}

/// Planner input.
#[derive(Debug, Clone)]
pub struct TopologyRequest {
    pub profile: Profile,
    pub nodes: Vec<NodeRecord>,
    pub load_balancer: Option<String>,
    pub strategy: Strategy,
}

/// Checks a node count against the profile bound.
pub fn check_count(profile: Profile, count: usize) -> Result<()> {
    let max = profile.descriptor().max_nodes;
    if count == 0 || count > max {
        return Err(ProvisionError::TopologyOutOfRange {
            profile,
            requested: count,
            max,
        });
    }
    Ok(())
}

/// Produce the certificate units for a run.
///
/// The identity is cloned into every unit.
///
/// # Errors
/// `TopologyOutOfRange` for a bad node count, `InvalidField` for malformed
/// node names or, on address-carrying profiles, a missing hostname or an IP
/// list outside 1..=3.
pub fn plan(
    request: &TopologyRequest,
    identity: &SubjectIdentity,
    key_length: u32,
) -> Result<Vec<CertificateUnit>> {
    let profile = request.profile;
    let descriptor = profile.descriptor();
    let count = request.nodes.len();
    check_count(profile, count)?;
    for node in &request.nodes {
        validate_node(node, descriptor.node_addresses)?;
    }

    let shared = descriptor.offers_shared_identity
        && count > 1
        && request.strategy == Strategy::SingleWithSan;

    let units = if shared {
        let load_balancer = match &request.load_balancer {
            Some(lb) if !lb.trim().is_empty() => {
                let lb = lb.trim().to_string();
                if !is_dns_name(&lb) {
                    return Err(ProvisionError::invalid_field(
                        "load balancer FQDN",
                        format!("'{}' is not a valid DNS name", lb),
                    ));
                }
                Some(lb)
            }
            _ => None,
        };
        let common_name = load_balancer
            .clone()
            .unwrap_or_else(|| request.nodes[0].fqdn.clone());
        let seed = load_balancer
            .into_iter()
            .map(SanEntry::Dns)
            .chain(request.nodes.iter().map(|n| SanEntry::Dns(n.fqdn.clone())));
        vec![CertificateUnit {
            profile,
            label: UnitLabel::Single,
            common_name,
            identity: identity.clone(),
            sans: SanSet::build(seed),
            key_length,
        }]
    } else {
        request
            .nodes
            .iter()
            .enumerate()
            .map(|(i, node)| {
                let label = if count == 1 {
                    UnitLabel::Single
                } else {
                    UnitLabel::numbered(descriptor.label_kind, i + 1)
                };
                CertificateUnit {
                    profile,
                    label,
                    common_name: node.fqdn.clone(),
                    identity: identity.clone(),
                    sans: node_sans(node, descriptor.node_addresses),
                    key_length,
                }
            })
            .collect()
    };

    debug!(
        profile = %profile,
        nodes = count,
        units = units.len(),
        shared,
        "topology planned"
    );
    Ok(units)
}

fn node_sans(node: &NodeRecord, with_addresses: bool) -> SanSet {
    let mut entries = vec![SanEntry::Dns(node.fqdn.clone())];
    if with_addresses {
        entries.extend(node.hostname.iter().cloned().map(SanEntry::Dns));
        entries.extend(node.ips.iter().copied().map(SanEntry::Ip));
    }
    SanSet::build(entries)
}

fn validate_node(node: &NodeRecord, with_addresses: bool) -> Result<()> {
    if !is_dns_name(&node.fqdn) {
        return Err(ProvisionError::invalid_field(
            "FQDN",
            format!("'{}' is not a valid DNS name", node.fqdn),
        ));
    }
    if !with_addresses {
        return Ok(());
    }
    match &node.hostname {
        Some(hostname) if is_dns_name(hostname) => {}
        Some(hostname) => {
            return Err(ProvisionError::invalid_field(
                "hostname",
                format!("'{}' is not a valid host name", hostname),
            ))
        }
        None => {
            return Err(ProvisionError::invalid_field(
                "hostname",
                format!("{} has no hostname", node.fqdn),
            ))
        }
    }
    if node.ips.is_empty() || node.ips.len() > MAX_NODE_IPS {
        return Err(ProvisionError::invalid_field(
            "IP addresses",
            format!("{} needs 1 to {} addresses", node.fqdn, MAX_NODE_IPS),
        ));
    }
    Ok(())
}
