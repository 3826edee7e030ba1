//! Profile runs
//!
//! A run is split in two halves with the external CA in between:
//!
//! 1. generation: collect identity and topology, plan units, generate keys
//!    and requests, write signing instructions
//! 2. conversion: detect placed certificates, then package and verify PFX
//!    bundles for every signed unit
//!
//! The second half reloads units from their manifests, so it can run in a
//! later process. A failure on one unit is reported and the remaining units
//! are still processed.

use std::fmt;
use std::io::{BufRead, Write};

use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::configs::IdentityDefaults;
use crate::conversion::{ChainSource, ConversionRequest, ConversionResult, OutputEncoding};
use crate::crypto::CryptoBackend;
use crate::identity::SubjectIdentity;
use crate::instructions;
use crate::lifecycle::{ArtifactState, Detection, LifecycleManager};
use crate::profile::Profile;
use crate::prompt::Prompter;
use crate::san::{RejectReason, RejectedSan};
use crate::storage::ArtifactStore;
use crate::topology::{self, TopologyRequest};
use crate::unit::CertificateUnit;

/// What happened to one unit during a run.
#[derive(Debug, Clone)]
pub struct UnitReport {
    pub label: String,
    pub state: ArtifactState,
    pub note: Option<String>,
}

impl UnitReport {
    pub fn succeeded(&self) -> bool {
        !matches!(self.state, ArtifactState::Failed(_))
    }
}

impl fmt::Display for UnitReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mark = if self.succeeded() { "✓" } else { "✗" };
        write!(f, "{} {}: {}", mark, self.label, self.state)?;
        if let Some(note) = &self.note {
            write!(f, " ({})", note)?;
        }
        Ok(())
    }
}

/// Drives profile runs against one backend and artifact store.
pub struct Workflow<B> {
    backend: B,
    store: ArtifactStore,
    key_length: u32,
}

impl<B: CryptoBackend> Workflow<B> {
    pub fn new(backend: B, store: ArtifactStore, key_length: u32) -> Self {
        Self {
            backend,
            store,
            key_length,
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    /// Plan units and merge the operator's extra SANs into each of them.
    ///
    /// Returns the units plus every extra entry that was rejected, once per
    /// unit it was rejected for.
    pub fn plan(
        &self,
        request: &TopologyRequest,
        identity: &SubjectIdentity,
        extra_sans: &[String],
    ) -> crate::error::Result<(Vec<CertificateUnit>, Vec<RejectedSan>)> {
        let mut rejected = Vec::new();
        let units = topology::plan(request, identity, self.key_length)?
            .into_iter()
            .map(|unit| {
                let (unit, outcome) = unit.with_extra_sans(extra_sans);
                for r in &outcome.rejected {
                    warn!(
                        unit = %unit.display_label(),
                        entry = %r.raw,
                        reason = ?r.reason,
                        "extra SAN rejected"
                    );
                }
                rejected.extend(outcome.rejected);
                unit
            })
            .collect();
        Ok((units, rejected))
    }

    /// Generate key and request for every unit and write the signing
    /// instructions. Unit failures are reported, not returned.
    ///
    /// The units replace the profile's previous run: stored units whose
    /// label is not planned again are retired.
    pub fn generate_units(&self, units: &[CertificateUnit]) -> Result<Vec<UnitReport>> {
        let Some(profile) = units.first().map(|u| u.profile) else {
            return Ok(Vec::new());
        };
        for manifest in self.store.list_manifests(profile)? {
            if units.iter().all(|u| u.label != manifest.unit.label) {
                info!(unit = %manifest.unit.display_label(), "retiring unit from previous run");
                self.store.retire(&manifest.unit)?;
            }
        }

        let mut manager = LifecycleManager::new(&self.backend, self.store.clone());
        let mut reports = Vec::with_capacity(units.len());
        for unit in units {
            let id = manager.add(unit.clone());
            let note = match manager.generate(id) {
                Ok(()) => Some(self.store.paths(unit).request.display().to_string()),
                Err(e) => {
                    warn!(error = %e, "generation failed");
                    Some(e.to_string())
                }
            };
            reports.push(UnitReport {
                label: unit.display_label(),
                state: manager.state(id).clone(),
                note,
            });
        }

        let path = instructions::write(&self.store, profile, units)
            .context("Failed to write signing instructions")?;
        info!(path = %path.display(), "signing instructions written");
        Ok(reports)
    }

    /// Reload every persisted unit of a profile and look for placed
    /// certificates.
    pub fn detect(&self, profile: Profile) -> Result<(LifecycleManager<&B>, Vec<UnitReport>)> {
        let mut manager = LifecycleManager::new(&self.backend, self.store.clone());
        for manifest in self.store.list_manifests(profile)? {
            manager.adopt(manifest);
        }

        let ids: Vec<_> = manager.ids().collect();
        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            let label = manager.unit(id).display_label();
            let note = if manager.state(id).allows_detection() {
                match manager.detect_signed(id) {
                    Ok(Detection::Signed) => None,
                    Ok(Detection::Pending) => Some(format!(
                        "place the signed certificate at {}",
                        self.store.paths(manager.unit(id)).certificate.display()
                    )),
                    Err(e) => Some(e.to_string()),
                }
            } else {
                None
            };
            reports.push(UnitReport {
                label,
                state: manager.state(id).clone(),
                note,
            });
        }
        Ok((manager, reports))
    }

    /// Convert every signed unit held by `manager`.
    pub fn convert_signed(
        &self,
        manager: &mut LifecycleManager<&B>,
        request: &ConversionRequest,
    ) -> Vec<UnitReport> {
        let ids: Vec<_> = manager
            .ids()
            .filter(|id| *manager.state(*id) == ArtifactState::Signed)
            .collect();
        let mut reports = Vec::with_capacity(ids.len());
        for id in ids {
            let label = manager.unit(id).display_label();
            let note = match manager.convert(id, request) {
                Ok(result) => Some(describe(&result)),
                Err(e) => {
                    warn!(error = %e, "conversion failed");
                    Some(e.to_string())
                }
            };
            reports.push(UnitReport {
                label,
                state: manager.state(id).clone(),
                note,
            });
        }
        reports
    }

    /// Persisted state of every unit of a profile.
    pub fn status(&self, profile: Profile) -> Result<Vec<UnitReport>> {
        Ok(self
            .store
            .list_manifests(profile)?
            .into_iter()
            .map(|m| UnitReport {
                label: m.unit.display_label(),
                note: Some(self.store.paths(&m.unit).dir.display().to_string()),
                state: m.state,
            })
            .collect())
    }

    /// Interactive generation half of a run.
    pub fn run_generation<R: BufRead, W: Write>(
        &self,
        prompter: &mut Prompter<R, W>,
        profile: Profile,
        defaults: &IdentityDefaults,
    ) -> Result<Vec<UnitReport>> {
        prompter.say(format!("\n=== Generate {} Certificate Requests ===", profile))?;
        if !self.store.list_manifests(profile)?.is_empty()
            && !prompter.ask_yes_no(
                &format!("Existing {} keys and requests will be replaced. Continue?", profile),
                false,
            )?
        {
            prompter.say("Generation cancelled.")?;
            return Ok(Vec::new());
        }

        let identity = prompter.collect_identity(defaults)?;
        let units = loop {
            let count = prompter.collect_count(profile)?;
            let (strategy, load_balancer) = prompter.collect_strategy(profile, count)?;
            let nodes = prompter.collect_nodes(profile, count)?;
            let extra = prompter.collect_extra_sans()?;
            let request = TopologyRequest {
                profile,
                nodes,
                load_balancer,
                strategy,
            };
            match self.plan(&request, &identity, &extra) {
                Ok((units, rejected)) => {
                    for r in dedup_rejections(rejected) {
                        let why = match r.reason {
                            RejectReason::Malformed => "not a DNS name or IPv4 address",
                            RejectReason::Duplicate => "already present",
                        };
                        prompter.say(format!("✗ Skipped SAN '{}': {}", r.raw, why))?;
                    }
                    break units;
                }
                Err(e) if e.is_recoverable() => prompter.say(format!("✗ {}", e))?,
                Err(e) => return Err(e.into()),
            }
        };

        for unit in &units {
            prompter.say(format!(
                "\n{}: {}",
                unit.display_label(),
                unit.identity.one_line(&unit.common_name)
            ))?;
            for line in unit.sans.config_lines() {
                prompter.say(format!("    {}", line))?;
            }
        }

        let reports = self.generate_units(&units)?;
        prompter.say("")?;
        for report in &reports {
            prompter.say(report.to_string())?;
        }
        prompter.say(format!(
            "\nSigning instructions: {}",
            self.store.instructions_path(profile).display()
        ))?;
        Ok(reports)
    }

    /// Interactive conversion half of a run.
    pub fn run_conversion<R: BufRead, W: Write>(
        &self,
        prompter: &mut Prompter<R, W>,
        profile: Profile,
    ) -> Result<Vec<UnitReport>> {
        prompter.say(format!("\n=== Convert {} Certificates ===", profile))?;
        let (mut manager, mut reports) = self.detect(profile)?;
        if reports.is_empty() {
            prompter.say(format!(
                "No {} units found under {}. Generate requests first.",
                profile,
                self.store.profile_dir(profile).display()
            ))?;
            return Ok(reports);
        }
        for report in &reports {
            prompter.say(report.to_string())?;
        }

        if !manager.ids().any(|id| *manager.state(id) == ArtifactState::Signed) {
            prompter.say("Nothing to convert yet.")?;
            return Ok(reports);
        }
        let request = prompter.collect_conversion(profile)?;
        let converted = self.convert_signed(&mut manager, &request);
        prompter.say("")?;
        for report in &converted {
            prompter.say(report.to_string())?;
        }
        reports.extend(converted);
        Ok(reports)
    }

    pub fn print_status<R: BufRead, W: Write>(
        &self,
        prompter: &mut Prompter<R, W>,
        profile: Profile,
    ) -> Result<()> {
        prompter.say(format!("\n=== {} Status ===", profile))?;
        let reports = self.status(profile)?;
        if reports.is_empty() {
            prompter.say("No units generated yet.")?;
        }
        for report in reports {
            prompter.say(report.to_string())?;
        }
        Ok(())
    }
}

fn describe(result: &ConversionResult) -> String {
    let mut parts: Vec<String> = result
        .outputs
        .iter()
        .map(|o| match o {
            OutputEncoding::Pkcs12(p)
            | OutputEncoding::PemCertificate(p)
            | OutputEncoding::PemChain(p) => p.display().to_string(),
        })
        .collect();
    match &result.password_file {
        Some(p) => parts.push(format!("password in {}", p.display())),
        None => parts.push("no password".to_string()),
    }
    match &result.chain {
        Some(ChainSource::Override(files)) => {
            parts.push(format!("chain from {} file(s)", files.len()))
        }
        Some(ChainSource::Discovered(p)) => parts.push(format!("chain from {}", p.display())),
        None => parts.push("no chain".to_string()),
    }
    parts.join(", ")
}

fn dedup_rejections(rejected: Vec<RejectedSan>) -> Vec<RejectedSan> {
    let mut unique: Vec<RejectedSan> = Vec::new();
    for r in rejected {
        if !unique.contains(&r) {
            unique.push(r);
        }
    }
    unique
}

