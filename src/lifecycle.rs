//! Artifact Lifecycle Manager
//!
//! Drives every [`CertificateUnit`] through its artifact states:
//!
//! ```text
//! Empty -> KeyReady -> RequestReady -> AwaitingSignature -> Signed -> Converted -> Verified
//!    \________\______________\_______________\_______________\___________\-> Failed(reason)
//! ```
//!
//! Transitions only move forward. Two ways lead back out of a state:
//! - `generate` may be called in any state; it persists `Empty`, discards
//!   the unit's key, request and conversion outputs, and restarts at
//!   `KeyReady`.
//! - `detect_signed` may be called again on a unit that failed after its key
//!   existed (mismatched certificate, unreadable certificate, failed
//!   conversion). A matching certificate moves it to `Signed`.
//!
//! Backend failures are never retried. They move the unit to `Failed` and
//! are returned to the caller, tagged with the unit label. Other units held
//! by the same manager are unaffected.
//!
//! Every transition is persisted to the unit's `state.json`, so conversion
//! can happen in a later process than generation.

use std::fmt;

use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::conversion::{
    generate_password, ConversionPolicy, ConversionRequest, ConversionResult, OutputEncoding,
};
use crate::crypto::{CryptoBackend, Encoding, KeyHandle, PackageInput, RequestSubject};
use crate::error::{ProvisionError, Result};
use crate::storage::{ArtifactStore, UnitManifest};
use crate::unit::CertificateUnit;

const OP_GENERATE_KEY: &str = "key generation";
const OP_GENERATE_REQUEST: &str = "request generation";
const OP_MATCH_KEY: &str = "key/certificate check";

/// Why a unit failed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum FailureReason {
    CryptoBackend { operation: String, message: String },
    KeyCertMismatch,
    ConversionError(String),
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureReason::CryptoBackend { operation, message } => {
                write!(f, "{} failed: {}", operation, message)
            }
            FailureReason::KeyCertMismatch => f.write_str("certificate does not match key"),
            FailureReason::ConversionError(message) => write!(f, "conversion failed: {}", message),
        }
    }
}

/// Where a unit stands in its lifecycle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", content = "reason", rename_all = "snake_case")]
pub enum ArtifactState {
    Empty,
    KeyReady,
    RequestReady,
    AwaitingSignature,
    Signed,
    Converted,
    Verified,
    Failed(FailureReason),
}

impl ArtifactState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, ArtifactState::Verified | ArtifactState::Failed(_))
    }

    fn rank(&self) -> u8 {
        match self {
            ArtifactState::Empty => 0,
            ArtifactState::KeyReady => 1,
            ArtifactState::RequestReady => 2,
            ArtifactState::AwaitingSignature => 3,
            ArtifactState::Signed => 4,
            ArtifactState::Converted => 5,
            ArtifactState::Verified => 6,
            ArtifactState::Failed(_) => u8::MAX,
        }
    }

    /// Whether `detect_signed` may run. Covers the failures that can be
    /// fixed by placing a (different) certificate without a new key.
    pub fn allows_detection(&self) -> bool {
        match self {
            ArtifactState::AwaitingSignature => true,
            ArtifactState::Failed(FailureReason::KeyCertMismatch)
            | ArtifactState::Failed(FailureReason::ConversionError(_)) => true,
            ArtifactState::Failed(FailureReason::CryptoBackend { operation, .. }) => {
                operation == OP_MATCH_KEY
            }
            _ => false,
        }
    }

    /// Forward-only transition check.
    pub fn can_advance_to(&self, next: &ArtifactState) -> bool {
        match (self, next) {
            (ArtifactState::Failed(_), ArtifactState::Signed) => self.allows_detection(),
            (ArtifactState::Failed(_), ArtifactState::Failed(_)) => self.allows_detection(),
            (current, ArtifactState::Failed(_)) => !current.is_terminal(),
            (current, next) => !current.is_terminal() && next.rank() == current.rank() + 1,
        }
    }
}

impl fmt::Display for ArtifactState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArtifactState::Empty => f.write_str("empty"),
            ArtifactState::KeyReady => f.write_str("key ready"),
            ArtifactState::RequestReady => f.write_str("request ready"),
            ArtifactState::AwaitingSignature => f.write_str("awaiting signature"),
            ArtifactState::Signed => f.write_str("signed"),
            ArtifactState::Converted => f.write_str("converted"),
            ArtifactState::Verified => f.write_str("verified"),
            ArtifactState::Failed(reason) => write!(f, "failed ({})", reason),
        }
    }
}

/// Outcome of polling for a signed certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Detection {
    /// No certificate has been placed yet.
    Pending,
    /// Certificate found and matches the unit's key.
    Signed,
}

/// Handle to a unit owned by a [`LifecycleManager`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct UnitId(usize);

struct UnitRecord {
    unit: CertificateUnit,
    state: ArtifactState,
    key: Option<KeyHandle>,
}

/// Owns the units of one provisioning run and their states.
pub struct LifecycleManager<B> {
    backend: B,
    store: ArtifactStore,
    records: Vec<UnitRecord>,
}

impl<B: CryptoBackend> LifecycleManager<B> {
    pub fn new(backend: B, store: ArtifactStore) -> Self {
        Self {
            backend,
            store,
            records: Vec::new(),
        }
    }

    pub fn store(&self) -> &ArtifactStore {
        &self.store
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Take ownership of a freshly planned unit in state `Empty`.
    pub fn add(&mut self, unit: CertificateUnit) -> UnitId {
        self.records.push(UnitRecord {
            unit,
            state: ArtifactState::Empty,
            key: None,
        });
        UnitId(self.records.len() - 1)
    }

    /// Take ownership of a planned unit, picking up the state an earlier run
    /// persisted for it. Units without a manifest start at `Empty`.
    pub fn resume(&mut self, unit: CertificateUnit) -> Result<UnitId> {
        let state = match self.store.load_manifest(&unit)? {
            Some(manifest) if manifest.unit == unit => manifest.state,
            Some(_) => {
                debug!(unit = %unit.display_label(), "stored unit differs, starting fresh");
                ArtifactState::Empty
            }
            None => ArtifactState::Empty,
        };
        self.records.push(UnitRecord {
            unit,
            state,
            key: None,
        });
        Ok(UnitId(self.records.len() - 1))
    }

    /// Re-attach a unit persisted by an earlier run.
    pub fn adopt(&mut self, manifest: UnitManifest) -> UnitId {
        self.records.push(UnitRecord {
            unit: manifest.unit,
            state: manifest.state,
            key: None,
        });
        UnitId(self.records.len() - 1)
    }

    pub fn ids(&self) -> impl Iterator<Item = UnitId> {
        (0..self.records.len()).map(UnitId)
    }

    pub fn unit(&self, id: UnitId) -> &CertificateUnit {
        &self.records[id.0].unit
    }

    pub fn state(&self, id: UnitId) -> &ArtifactState {
        &self.records[id.0].state
    }

    /// Generate key and signing request for a unit.
    ///
    /// Runs in any state; prior key, request and conversion outputs of the
    /// unit are discarded first. Ends in `AwaitingSignature`.
    pub fn generate(&mut self, id: UnitId) -> Result<()> {
        let paths = self.store.paths(&self.records[id.0].unit);
        if self.records[id.0].state != ArtifactState::Empty {
            info!(
                unit = %self.records[id.0].unit.display_label(),
                previous = %self.records[id.0].state,
                "regenerating unit"
            );
        }
        // Persist `Empty` before any artifact is removed.
        self.records[id.0].state = ArtifactState::Empty;
        self.records[id.0].key = None;
        self.store
            .save_manifest(&self.records[id.0].unit, &ArtifactState::Empty)?;
        for stale in [&paths.pfx, &paths.password, &paths.pem, &paths.chain_pem] {
            self.store.remove_if_exists(stale)?;
        }
        self.store.ensure_dir(&paths.dir)?;

        let key_length = self.records[id.0].unit.key_length;
        debug!(bits = key_length, "generating private key");
        let key = match self.backend.generate_key(key_length) {
            Ok(key) => key,
            Err(e) => return Err(self.fail_backend(id, OP_GENERATE_KEY, e)),
        };
        self.store.write_secret(&paths.key, key.pem())?;
        self.records[id.0].key = Some(key);
        self.transition(id, ArtifactState::KeyReady)?;

        let request = {
            let record = &self.records[id.0];
            let key = record.key.as_ref().ok_or_else(|| missing(&record.unit, &paths.key))?;
            self.backend.generate_request(
                key,
                RequestSubject {
                    common_name: &record.unit.common_name,
                    identity: &record.unit.identity,
                    sans: &record.unit.sans,
                },
            )
        };
        let request = match request {
            Ok(request) => request,
            Err(e) => return Err(self.fail_backend(id, OP_GENERATE_REQUEST, e)),
        };
        self.store.write(&paths.request, &request)?;
        self.transition(id, ArtifactState::RequestReady)?;
        self.transition(id, ArtifactState::AwaitingSignature)
    }

    /// Look for a placed certificate and check it against the unit's key.
    ///
    /// A mismatched certificate moves the unit to `Failed(KeyCertMismatch)`
    /// and is left where it is.
    pub fn detect_signed(&mut self, id: UnitId) -> Result<Detection> {
        self.require(id, "detect a signed certificate", ArtifactState::allows_detection)?;

        let paths = self.store.paths(&self.records[id.0].unit);
        let Some(certificate) = self.store.read_optional(&paths.certificate)? else {
            debug!(path = %paths.certificate.display(), "certificate not placed yet");
            return Ok(Detection::Pending);
        };
        self.load_key(id)?;

        let matched = {
            let record = &self.records[id.0];
            let key = record.key.as_ref().ok_or_else(|| missing(&record.unit, &paths.key))?;
            self.backend.keys_match(key, &certificate)
        };
        match matched {
            Ok(true) => {
                self.transition(id, ArtifactState::Signed)?;
                Ok(Detection::Signed)
            }
            Ok(false) => {
                let unit = self.records[id.0].unit.display_label();
                warn!(
                    unit = %unit,
                    path = %paths.certificate.display(),
                    "certificate does not match key"
                );
                self.transition(id, ArtifactState::Failed(FailureReason::KeyCertMismatch))?;
                Err(ProvisionError::KeyCertMismatch { unit })
            }
            Err(e) => Err(self.fail_backend(id, OP_MATCH_KEY, e)),
        }
    }

    /// Package a signed unit into PKCS#12 and verify the result.
    pub fn convert(&mut self, id: UnitId, request: &ConversionRequest) -> Result<ConversionResult> {
        self.require(id, "convert", |s| *s == ArtifactState::Signed)?;

        let unit = self.records[id.0].unit.clone();
        let paths = self.store.paths(&unit);
        let certificate = self
            .store
            .read_optional(&paths.certificate)?
            .ok_or_else(|| missing(&unit, &paths.certificate))?;
        self.load_key(id)?;

        let policy = ConversionPolicy::for_profile(unit.profile);
        let password = if policy.wants_password(request.protect) {
            match generate_password() {
                Ok(p) => Some(p),
                Err(e) => return Err(self.fail_conversion(id, e)),
            }
        } else {
            None
        };

        let chain = match policy.assemble_chain(
            &self.backend,
            request,
            &self.store.chain_candidates(&unit),
        ) {
            Ok(chain) => chain,
            Err(e) => return Err(self.fail_conversion(id, e)),
        };

        // PEM input is re-encoded too, dropping any text around the armour.
        let encoding = Encoding::detect(&certificate);
        let certificate_pem = match self.backend.reencode(&certificate, encoding, Encoding::Pem) {
            Ok(pem) => pem,
            Err(e) => return Err(self.fail_conversion(id, e)),
        };

        let friendly_name = unit.base_name();
        let container = {
            let record = &self.records[id.0];
            let key = record.key.as_ref().ok_or_else(|| missing(&unit, &paths.key))?;
            self.backend.package(PackageInput {
                friendly_name: &friendly_name,
                certificate_pem: &certificate_pem,
                key,
                chain_pem: chain.as_ref().map(|c| c.pem.as_slice()),
                password: password.as_ref(),
            })
        };
        let container = match container {
            Ok(container) => container,
            Err(e) => return Err(self.fail_conversion(id, e)),
        };

        let mut outputs = vec![OutputEncoding::Pkcs12(paths.pfx.clone())];
        self.store.write(&paths.pfx, &container)?;
        let password_file = match &password {
            Some(p) => {
                let mut contents = p.expose_secret().as_bytes().to_vec();
                contents.push(b'\n');
                self.store.write_secret(&paths.password, &contents)?;
                Some(paths.password.clone())
            }
            None => {
                self.store.remove_if_exists(&paths.password)?;
                None
            }
        };
        self.transition(id, ArtifactState::Converted)?;

        match self.backend.verify_container(&container, password.as_ref()) {
            Ok(true) => {}
            Ok(false) => {
                return Err(self.fail_conversion(
                    id,
                    anyhow::anyhow!("container does not open with the chosen password"),
                ))
            }
            Err(e) => return Err(self.fail_conversion(id, e)),
        }

        if policy.pem_sidecars() {
            self.store.write(&paths.pem, &certificate_pem)?;
            outputs.push(OutputEncoding::PemCertificate(paths.pem.clone()));
            if let Some(chain) = &chain {
                self.store.write(&paths.chain_pem, &chain.pem)?;
                outputs.push(OutputEncoding::PemChain(paths.chain_pem.clone()));
            }
        }
        self.transition(id, ArtifactState::Verified)?;

        Ok(ConversionResult {
            password,
            password_file,
            chain: chain.map(|c| c.source),
            outputs,
        })
    }

    fn require(
        &self,
        id: UnitId,
        operation: &'static str,
        allowed: impl Fn(&ArtifactState) -> bool,
    ) -> Result<()> {
        let record = &self.records[id.0];
        if allowed(&record.state) {
            Ok(())
        } else {
            Err(ProvisionError::InvalidTransition {
                unit: record.unit.display_label(),
                from: record.state.to_string(),
                operation,
            })
        }
    }

    fn transition(&mut self, id: UnitId, next: ArtifactState) -> Result<()> {
        let record = &mut self.records[id.0];
        if !record.state.can_advance_to(&next) {
            return Err(ProvisionError::InvalidTransition {
                unit: record.unit.display_label(),
                from: record.state.to_string(),
                operation: "advance",
            });
        }
        info!(
            unit = %record.unit.display_label(),
            from = %record.state,
            to = %next,
            "state transition"
        );
        record.state = next;
        self.store.save_manifest(&record.unit, &record.state)
    }

    fn load_key(&mut self, id: UnitId) -> Result<()> {
        if self.records[id.0].key.is_some() {
            return Ok(());
        }
        let paths = self.store.paths(&self.records[id.0].unit);
        let pem = self
            .store
            .read_optional(&paths.key)?
            .ok_or_else(|| missing(&self.records[id.0].unit, &paths.key))?;
        self.records[id.0].key = Some(KeyHandle::from_pem(pem));
        Ok(())
    }

    fn fail_backend(
        &mut self,
        id: UnitId,
        operation: &'static str,
        e: anyhow::Error,
    ) -> ProvisionError {
        let message = format!("{:#}", e);
        let unit = self.records[id.0].unit.display_label();
        warn!(unit = %unit, operation, error = %message, "crypto backend failure");
        let reason = FailureReason::CryptoBackend {
            operation: operation.to_string(),
            message: message.clone(),
        };
        if let Err(persist) = self.transition(id, ArtifactState::Failed(reason)) {
            warn!(unit = %unit, error = %persist, "could not record failure");
        }
        ProvisionError::CryptoBackendFailure {
            unit,
            operation,
            message,
        }
    }

    fn fail_conversion(&mut self, id: UnitId, e: anyhow::Error) -> ProvisionError {
        let message = format!("{:#}", e);
        let unit = self.records[id.0].unit.display_label();
        warn!(unit = %unit, error = %message, "conversion failure");
        let reason = FailureReason::ConversionError(message.clone());
        if let Err(persist) = self.transition(id, ArtifactState::Failed(reason)) {
            warn!(unit = %unit, error = %persist, "could not record failure");
        }
        ProvisionError::ConversionError { unit, message }
    }
}

fn missing(unit: &CertificateUnit, path: &std::path::Path) -> ProvisionError {
    ProvisionError::MissingArtifact {
        unit: unit.display_label(),
        path: path.to_path_buf(),
    }
}
