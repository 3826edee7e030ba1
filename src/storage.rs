//! Artifact storage
//!
//! Filesystem layout for every unit, rooted at the configured output root:
//!
//! ```text
//! <root>/<profile>/[<unit-dir>/]
//!     <base>.key            private key, mode 0600
//!     <base>.csr            signing request
//!     <base>.crt            signed certificate, placed by the CA operator
//!     ca-chain.crt          optional chain, placed by the CA operator
//!     <base>.pfx            PKCS#12 bundle
//!     <base>-password.txt   bundle password, mode 0600
//!     <base>.pem            certificate side-car (HTML5GW, PTA)
//!     <base>-chain.pem      chain side-car (HTML5GW, PTA)
//!     state.json            unit manifest
//! ```
//!
//! Secrets are always written with owner-only permissions on Unix.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ProvisionError, Result};
use crate::lifecycle::ArtifactState;
use crate::profile::Profile;
use crate::unit::CertificateUnit;

const MANIFEST_FILE_NAME: &str = "state.json";
const INSTRUCTIONS_FILE_NAME: &str = "INSTRUCTIONS.txt";

/// Persisted record of a unit and the state it reached.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UnitManifest {
    pub unit: CertificateUnit,
    pub state: ArtifactState,
}

/// Paths of every artifact belonging to one unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitPaths {
    pub dir: PathBuf,
    pub key: PathBuf,
    pub request: PathBuf,
    pub certificate: PathBuf,
    pub chain: PathBuf,
    pub pfx: PathBuf,
    pub password: PathBuf,
    pub pem: PathBuf,
    pub chain_pem: PathBuf,
    pub manifest: PathBuf,
}

/// Reads and writes unit artifacts below an output root.
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    root: PathBuf,
    chain_file_name: String,
}

impl ArtifactStore {
    pub fn new(root: impl Into<PathBuf>, chain_file_name: impl Into<String>) -> Self {
        Self {
            root: root.into(),
            chain_file_name: chain_file_name.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn profile_dir(&self, profile: Profile) -> PathBuf {
        self.root.join(profile.short_name())
    }

    pub fn paths(&self, unit: &CertificateUnit) -> UnitPaths {
        let mut dir = self.profile_dir(unit.profile);
        if let Some(sub) = unit.label.dir_name() {
            dir.push(sub);
        }
        let base = unit.base_name();
        UnitPaths {
            key: dir.join(format!("{}.key", base)),
            request: dir.join(format!("{}.csr", base)),
            certificate: dir.join(format!("{}.crt", base)),
            chain: dir.join(&self.chain_file_name),
            pfx: dir.join(format!("{}.pfx", base)),
            password: dir.join(format!("{}-password.txt", base)),
            pem: dir.join(format!("{}.pem", base)),
            chain_pem: dir.join(format!("{}-chain.pem", base)),
            manifest: dir.join(MANIFEST_FILE_NAME),
            dir,
        }
    }

    pub fn instructions_path(&self, profile: Profile) -> PathBuf {
        self.profile_dir(profile).join(INSTRUCTIONS_FILE_NAME)
    }

    /// Chain file candidates, most specific first.
    pub fn chain_candidates(&self, unit: &CertificateUnit) -> Vec<PathBuf> {
        let unit_chain = self.paths(unit).chain;
        let profile_chain = self.profile_dir(unit.profile).join(&self.chain_file_name);
        if unit_chain == profile_chain {
            vec![unit_chain]
        } else {
            vec![unit_chain, profile_chain]
        }
    }

    pub fn ensure_dir(&self, dir: &Path) -> Result<()> {
        fs::create_dir_all(dir).map_err(|e| ProvisionError::io(dir, e))
    }

    /// Write a public artifact, replacing any previous file.
    pub fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent)?;
        }
        fs::write(path, data).map_err(|e| ProvisionError::io(path, e))?;
        debug!(path = %path.display(), bytes = data.len(), "artifact written");
        Ok(())
    }

    /// Write a secret (key or password) readable by the owner only.
    pub fn write_secret(&self, path: &Path, data: &[u8]) -> Result<()> {
        if let Some(parent) = path.parent() {
            self.ensure_dir(parent)?;
        }
        // Remove first so a pre-existing file with wider permissions is not reused.
        if path.exists() {
            fs::remove_file(path).map_err(|e| ProvisionError::io(path, e))?;
        }
        let mut file = open_owner_only(path).map_err(|e| ProvisionError::io(path, e))?;
        file.write_all(data)
            .map_err(|e| ProvisionError::io(path, e))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            fs::set_permissions(path, fs::Permissions::from_mode(0o600))
                .map_err(|e| ProvisionError::io(path, e))?;
        }
        debug!(path = %path.display(), "secret written");
        Ok(())
    }

    /// Read a file if present.
    pub fn read_optional(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(ProvisionError::io(path, e)),
        }
    }

    pub fn remove_if_exists(&self, path: &Path) -> Result<()> {
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(ProvisionError::io(path, e)),
        }
    }

    /// Drop a unit from its profile: its manifest and every generated
    /// artifact go. Files placed by the CA operator stay.
    pub fn retire(&self, unit: &CertificateUnit) -> Result<()> {
        let paths = self.paths(unit);
        for path in [
            &paths.manifest,
            &paths.key,
            &paths.request,
            &paths.pfx,
            &paths.password,
            &paths.pem,
            &paths.chain_pem,
        ] {
            self.remove_if_exists(path)?;
        }
        debug!(dir = %paths.dir.display(), "unit retired");
        Ok(())
    }

    pub fn save_manifest(&self, unit: &CertificateUnit, state: &ArtifactState) -> Result<()> {
        let path = self.paths(unit).manifest;
        let manifest = UnitManifest {
            unit: unit.clone(),
            state: state.clone(),
        };
        let json = serde_json::to_vec_pretty(&manifest).map_err(|e| {
            ProvisionError::io(&path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })?;
        self.write(&path, &json)
    }

    pub fn load_manifest(&self, unit: &CertificateUnit) -> Result<Option<UnitManifest>> {
        let path = self.paths(unit).manifest;
        self.read_manifest(&path)
    }

    fn read_manifest(&self, path: &Path) -> Result<Option<UnitManifest>> {
        let Some(bytes) = self.read_optional(path)? else {
            return Ok(None);
        };
        serde_json::from_slice(&bytes).map(Some).map_err(|e| {
            ProvisionError::io(path, std::io::Error::new(std::io::ErrorKind::InvalidData, e))
        })
    }

    /// Every manifest stored for a profile, single-unit first, then by directory name.
    pub fn list_manifests(&self, profile: Profile) -> Result<Vec<UnitManifest>> {
        let dir = self.profile_dir(profile);
        let mut manifests = Vec::new();
        if let Some(m) = self.read_manifest(&dir.join(MANIFEST_FILE_NAME))? {
            manifests.push(m);
        }
        let entries = match fs::read_dir(&dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(manifests),
            Err(e) => return Err(ProvisionError::io(&dir, e)),
        };
        let mut subdirs: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|p| p.is_dir())
            .collect();
        subdirs.sort_by_key(|p| dir_sort_key(p));
        for sub in subdirs {
            if let Some(m) = self.read_manifest(&sub.join(MANIFEST_FILE_NAME))? {
                manifests.push(m);
            }
        }
        Ok(manifests)
    }
}

/// `server10` sorts after `server9`.
fn dir_sort_key(path: &Path) -> (String, usize) {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or_default();
    let digits_at = name.find(|c: char| c.is_ascii_digit()).unwrap_or(name.len());
    let (prefix, digits) = name.split_at(digits_at);
    (prefix.to_string(), digits.parse().unwrap_or(0))
}

#[cfg(unix)]
fn open_owner_only(path: &Path) -> std::io::Result<fs::File> {
    use std::os::unix::fs::OpenOptionsExt;
    fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)
}

#[cfg(not(unix))]
fn open_owner_only(path: &Path) -> std::io::Result<fs::File> {
    fs::OpenOptions::new().write(true).create_new(true).open(path)
}
