//! Conversion Policy Engine
//!
//! Decides, per profile, whether a PKCS#12 bundle is password protected, where
//! its embedded chain comes from and which side-car files accompany it.
//!
//! | Profile | Password  | Default | Chain                                   |
//! |---------|-----------|---------|-----------------------------------------|
//! | PVWA    | optional  | no      | discovered file                         |
//! | PSM     | optional  | no      | discovered file                         |
//! | HTML5GW | optional  | yes     | discovered file                         |
//! | PTA     | optional  | no      | intermediate + root override, else file |
//! | Vault   | mandatory | -       | discovered file                         |

use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use secrecy::SecretString;

use crate::crypto::{CryptoBackend, Encoding};
use crate::profile::{ChainPolicy, PasswordPolicy, Profile, ProfileDescriptor};

/// Generated passwords are exactly this long.
pub const PASSWORD_LENGTH: usize = 24;
// 18 bytes encode to 24 base64 characters with no padding.
const PASSWORD_ENTROPY_BYTES: usize = PASSWORD_LENGTH / 4 * 3;

/// Operator input collected before conversion.
#[derive(Debug, Clone, Default)]
pub struct ConversionRequest {
    /// Explicit password choice for optional-password profiles; `None` takes
    /// the profile default. Ignored when the password is mandatory.
    pub protect: Option<bool>,
    /// Intermediate certificate (PEM or DER) for profiles that accept an override.
    pub intermediate: Option<PathBuf>,
    /// Root certificate (PEM or DER) for profiles that accept an override.
    pub root: Option<PathBuf>,
}

/// Where an embedded chain came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainSource {
    /// Assembled from operator supplied files, intermediate first.
    Override(Vec<PathBuf>),
    /// Chain file discovered next to the unit artifacts.
    Discovered(PathBuf),
}

/// Chain to embed in the bundle.
#[derive(Debug, Clone)]
pub struct AssembledChain {
    pub source: ChainSource,
    pub pem: Vec<u8>,
}

/// Outputs written for one converted unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputEncoding {
    Pkcs12(PathBuf),
    PemCertificate(PathBuf),
    PemChain(PathBuf),
}

/// Outcome of converting a signed unit.
#[derive(Debug)]
pub struct ConversionResult {
    pub password: Option<SecretString>,
    pub password_file: Option<PathBuf>,
    pub chain: Option<ChainSource>,
    pub outputs: Vec<OutputEncoding>,
}

/// Per-profile conversion rules.
#[derive(Debug, Clone, Copy)]
pub struct ConversionPolicy {
    descriptor: &'static ProfileDescriptor,
}

impl ConversionPolicy {
    pub fn for_profile(profile: Profile) -> Self {
        Self {
            descriptor: profile.descriptor(),
        }
    }

    pub fn password_policy(&self) -> PasswordPolicy {
        self.descriptor.password
    }

    /// Whether the operator should be asked about password protection.
    pub fn asks_for_password(&self) -> bool {
        matches!(self.descriptor.password, PasswordPolicy::Optional { .. })
    }

    pub fn accepts_chain_override(&self) -> bool {
        self.descriptor.chain == ChainPolicy::OverrideThenDiscovered
    }

    pub fn pem_sidecars(&self) -> bool {
        self.descriptor.pem_sidecars
    }

    /// Resolve the operator's choice against the profile policy.
    pub fn wants_password(&self, choice: Option<bool>) -> bool {
        match self.descriptor.password {
            PasswordPolicy::Mandatory => true,
            PasswordPolicy::Optional { default } => choice.unwrap_or(default),
        }
    }

    /// Pick the chain to embed.
    ///
    /// Override files (only honoured when the profile accepts them) are
    /// normalised to PEM and concatenated intermediate-then-root; otherwise the
    /// first readable candidate chain file is used.
    pub fn assemble_chain<B: CryptoBackend + ?Sized>(
        &self,
        backend: &B,
        request: &ConversionRequest,
        discovered: &[PathBuf],
    ) -> anyhow::Result<Option<AssembledChain>> {
        if self.accepts_chain_override() {
            let files: Vec<PathBuf> = [&request.intermediate, &request.root]
                .into_iter()
                .flatten()
                .cloned()
                .collect();
            if !files.is_empty() {
                let mut pem = Vec::new();
                for file in &files {
                    pem.extend(normalize_to_pem(backend, file)?);
                }
                return Ok(Some(AssembledChain {
                    source: ChainSource::Override(files),
                    pem,
                }));
            }
        }

        for candidate in discovered {
            if candidate.is_file() {
                let pem = std::fs::read(candidate)
                    .with_context(|| format!("Failed to read chain file {}", candidate.display()))?;
                return Ok(Some(AssembledChain {
                    source: ChainSource::Discovered(candidate.clone()),
                    pem,
                }));
            }
        }
        Ok(None)
    }
}

/// Read a certificate file and return it PEM encoded, newline terminated.
fn normalize_to_pem<B: CryptoBackend + ?Sized>(
    backend: &B,
    path: &Path,
) -> anyhow::Result<Vec<u8>> {
    let bytes = std::fs::read(path)
        .with_context(|| format!("Failed to read certificate {}", path.display()))?;
    let mut pem = match Encoding::detect(&bytes) {
        Encoding::Pem => bytes,
        Encoding::Der => backend
            .reencode(&bytes, Encoding::Der, Encoding::Pem)
            .with_context(|| format!("Failed to convert {} to PEM", path.display()))?,
    };
    if !pem.ends_with(b"\n") {
        pem.push(b'\n');
    }
    Ok(pem)
}

/// 24 characters of URL-safe base64 drawn from the OpenSSL CSPRNG.
pub fn generate_password() -> anyhow::Result<SecretString> {
    let mut bytes = [0u8; PASSWORD_ENTROPY_BYTES];
    openssl::rand::rand_bytes(&mut bytes)
        .map_err(|e| anyhow!("Failed to generate random password: {}", e))?;
    let encoded = URL_SAFE_NO_PAD.encode(bytes);
    Ok(SecretString::from(encoded))
}
