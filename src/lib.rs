//! Cert Provisioner - X.509 request and PKCS#12 provisioning library
//!
//! Prepares server certificates for a fixed set of infrastructure components
//! (PVWA, PSM, HTML5 Gateway, PTA and Vault). For each component it builds the
//! subject identity and SAN set, generates keys and signing requests, waits
//! for an external CA to sign them, then packages the signed certificates
//! into verified PKCS#12 bundles.
//!
//! # Overview
//!
//! Every certificate to be produced is a [`unit::CertificateUnit`] and moves
//! through a forward-only lifecycle:
//!
//! ```text
//! Empty -> KeyReady -> RequestReady -> AwaitingSignature
//!       -> (external CA signs the request)
//!       -> Signed -> Converted -> Verified
//! ```
//!
//! Any step can end in `Failed(reason)`. Failures stay with the unit that
//! caused them; sibling units of the same run carry on.
//!
//! # Profiles
//!
//! | Component | Nodes | Shared SAN certificate | PFX password       | Side-cars |
//! |-----------|-------|------------------------|--------------------|-----------|
//! | PVWA      | 1-10  | offered                | optional (off)     | no        |
//! | PSM       | 1-10  | offered                | optional (off)     | no        |
//! | HTML5GW   | 1-10  | offered                | optional (on)      | PEM       |
//! | PTA       | 1-2   | offered                | optional (off)     | PEM       |
//! | Vault     | 1-5   | never                  | mandatory          | no        |
//!
//! # Usage
//!
//! ```no_run
//! use cert_provisioner::crypto::OpensslBackend;
//! use cert_provisioner::identity::SubjectIdentityBuilder;
//! use cert_provisioner::profile::Profile;
//! use cert_provisioner::storage::ArtifactStore;
//! use cert_provisioner::topology::{NodeRecord, Strategy, TopologyRequest};
//! use cert_provisioner::workflow::Workflow;
//!
//! fn main() -> anyhow::Result<()> {
//!     let identity = SubjectIdentityBuilder::new()
//!         .country("US".to_string())
//!         .organization("Example Corp".to_string())
//!         .build()?;
//!
//!     let workflow = Workflow::new(
//!         OpensslBackend::new(),
//!         ArtifactStore::new("output", "ca-chain.crt"),
//!         2048,
//!     );
//!     let request = TopologyRequest {
//!         profile: Profile::Psm,
//!         nodes: vec![
//!             NodeRecord::new("psm1.corp.example"),
//!             NodeRecord::new("psm2.corp.example"),
//!         ],
//!         load_balancer: Some("psm.corp.example".to_string()),
//!         strategy: Strategy::SingleWithSan,
//!     };
//!     let (units, _rejected) = workflow.plan(&request, &identity, &[])?;
//!     for report in workflow.generate_units(&units)? {
//!         println!("{}", report);
//!     }
//!     Ok(())
//! }
//! ```
//!
//! # Modules
//!
//! - [`identity`], [`san`], [`topology`]: what goes into each request
//! - [`lifecycle`]: per-unit state machine
//! - [`conversion`]: per-profile packaging rules
//! - [`crypto`]: the [`crypto::CryptoBackend`] seam and its OpenSSL implementation
//! - [`storage`]: on-disk artifact layout
//! - [`workflow`], [`prompt`]: interactive profile runs

pub mod configs;
pub mod conversion;
pub mod crypto;
pub mod error;
pub mod identity;
pub mod instructions;
pub mod lifecycle;
pub mod profile;
pub mod prompt;
pub mod san;
pub mod storage;
pub mod telemetry;
pub mod topology;
pub mod unit;
pub mod workflow;
