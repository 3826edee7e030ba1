//! Crypto Backend
//!
//! The provisioning engine never touches key material directly; it goes
//! through the [`CryptoBackend`] trait. [`OpensslBackend`] implements it on
//! top of the `openssl` crate:
//!
//! - RSA key generation at the unit's key length
//! - PKCS#10 requests carrying the subject DN, the unit's SAN set,
//!   `keyUsage = digitalSignature, keyEncipherment` and `extendedKeyUsage = serverAuth`
//! - PKCS#12 packaging with an optional password and chain
//! - key/certificate modulus comparison
//! - PEM/DER re-encoding of certificates
//!
//! Backend methods return `anyhow::Result`; the lifecycle manager maps the
//! failures onto the unit that triggered them.

use anyhow::{anyhow, Context, Result};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkcs12::Pkcs12;
use openssl::pkey::{PKey, Private};
use openssl::stack::Stack;
use openssl::x509::extension::{ExtendedKeyUsage, KeyUsage, SubjectAlternativeName};
use openssl::x509::{X509Name, X509NameBuilder, X509Req, X509};
use secrecy::{ExposeSecret, SecretBox, SecretString};
use std::fmt;

use crate::identity::SubjectIdentity;
use crate::san::{SanEntry, SanKind, SanSet};

const X509_REQ_VERSION_1: i32 = 0; // PKCS#10 v1 is represented by 0
const PEM_ARMOUR: &[u8] = b"-----BEGIN";

/// Certificate encodings understood by [`CryptoBackend::reencode`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Pem,
    Der,
}

impl Encoding {
    /// Guess the encoding of certificate bytes from a PEM armour line.
    ///
    /// The armour may follow free text such as the `subject=`/`issuer=` or
    /// `Bag Attributes` lines that openssl exports put in front of it.
    pub fn detect(bytes: &[u8]) -> Encoding {
        if bytes.windows(PEM_ARMOUR.len()).any(|w| w == PEM_ARMOUR) {
            Encoding::Pem
        } else {
            Encoding::Der
        }
    }
}

/// PKCS#8 PEM private key held in zeroizing memory.
pub struct KeyHandle {
    pem: SecretBox<Vec<u8>>,
}

impl KeyHandle {
    pub fn from_pem(pem: Vec<u8>) -> Self {
        Self {
            pem: SecretBox::new(Box::new(pem)),
        }
    }

    pub fn pem(&self) -> &[u8] {
        self.pem.expose_secret()
    }

    fn pkey(&self) -> Result<PKey<Private>> {
        PKey::private_key_from_pem(self.pem()).context("Failed to parse private key PEM")
    }
}

impl fmt::Debug for KeyHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyHandle")
            .field("pem", &"<redacted>")
            .finish()
    }
}

/// Everything a signing request needs besides the key.
#[derive(Debug, Clone, Copy)]
pub struct RequestSubject<'a> {
    pub common_name: &'a str,
    pub identity: &'a SubjectIdentity,
    pub sans: &'a SanSet,
}

/// Contents of a PKCS#12 bundle to be written.
pub struct PackageInput<'a> {
    pub friendly_name: &'a str,
    pub certificate_pem: &'a [u8],
    pub key: &'a KeyHandle,
    /// Concatenated PEM chain, intermediate first.
    pub chain_pem: Option<&'a [u8]>,
    pub password: Option<&'a SecretString>,
}

/// Capabilities the engine needs from a crypto implementation.
pub trait CryptoBackend {
    /// Generate an RSA private key of `bits` modulus size.
    fn generate_key(&self, bits: u32) -> Result<KeyHandle>;

    /// Create a PEM encoded PKCS#10 request.
    fn generate_request(&self, key: &KeyHandle, subject: RequestSubject<'_>) -> Result<Vec<u8>>;

    /// Build a DER encoded PKCS#12 container.
    fn package(&self, input: PackageInput<'_>) -> Result<Vec<u8>>;

    /// Whether `container` opens with `password` and holds a key and certificate.
    fn verify_container(&self, container: &[u8], password: Option<&SecretString>) -> Result<bool>;

    /// Whether the certificate's public modulus equals the key's.
    fn keys_match(&self, key: &KeyHandle, certificate: &[u8]) -> Result<bool>;

    /// Re-encode a certificate between PEM and DER.
    fn reencode(&self, bytes: &[u8], from: Encoding, to: Encoding) -> Result<Vec<u8>>;
}

impl<B: CryptoBackend + ?Sized> CryptoBackend for &B {
    fn generate_key(&self, bits: u32) -> Result<KeyHandle> {
        (**self).generate_key(bits)
    }

    fn generate_request(&self, key: &KeyHandle, subject: RequestSubject<'_>) -> Result<Vec<u8>> {
        (**self).generate_request(key, subject)
    }

    fn package(&self, input: PackageInput<'_>) -> Result<Vec<u8>> {
        (**self).package(input)
    }

    fn verify_container(&self, container: &[u8], password: Option<&SecretString>) -> Result<bool> {
        (**self).verify_container(container, password)
    }

    fn keys_match(&self, key: &KeyHandle, certificate: &[u8]) -> Result<bool> {
        (**self).keys_match(key, certificate)
    }

    fn reencode(&self, bytes: &[u8], from: Encoding, to: Encoding) -> Result<Vec<u8>> {
        (**self).reencode(bytes, from, to)
    }
}

/// [`CryptoBackend`] backed by the system OpenSSL library.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpensslBackend;

impl OpensslBackend {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoBackend for OpensslBackend {
    fn generate_key(&self, bits: u32) -> Result<KeyHandle> {
        let rsa = openssl::rsa::Rsa::generate(bits)
            .map_err(|e| anyhow!("Failed to generate RSA keypair: {}", e))?;
        let private_key =
            PKey::from_rsa(rsa).map_err(|e| anyhow!("Failed to create private key: {}", e))?;
        let pem = private_key
            .private_key_to_pem_pkcs8()
            .map_err(|e| anyhow!("Failed to encode private key: {}", e))?;
        Ok(KeyHandle::from_pem(pem))
    }

    fn generate_request(&self, key: &KeyHandle, subject: RequestSubject<'_>) -> Result<Vec<u8>> {
        let private_key = key.pkey()?;

        let mut builder =
            X509Req::builder().map_err(|e| anyhow!("Failed to create request builder: {}", e))?;
        builder
            .set_version(X509_REQ_VERSION_1)
            .map_err(|e| anyhow!("Failed to set version: {}", e))?;

        let name = subject_name(subject.common_name, subject.identity)?;
        builder
            .set_subject_name(&name)
            .map_err(|e| anyhow!("Failed to set subject: {}", e))?;
        builder
            .set_pubkey(&private_key)
            .map_err(|e| anyhow!("Failed to set public key: {}", e))?;

        let mut extensions =
            Stack::new().map_err(|e| anyhow!("Failed to create extension stack: {}", e))?;

        let ku = KeyUsage::new()
            .critical()
            .digital_signature()
            .key_encipherment()
            .build()
            .map_err(|e| anyhow!("Failed to build KeyUsage: {}", e))?;
        extensions
            .push(ku)
            .map_err(|e| anyhow!("Failed to add KeyUsage: {}", e))?;

        let eku = ExtendedKeyUsage::new()
            .server_auth()
            .build()
            .map_err(|e| anyhow!("Failed to build ExtendedKeyUsage: {}", e))?;
        extensions
            .push(eku)
            .map_err(|e| anyhow!("Failed to add ExtendedKeyUsage: {}", e))?;

        if !subject.sans.is_empty() {
            let mut san = SubjectAlternativeName::new();
            // DNS entries first, then IPs, each in index order.
            for indexed in subject
                .sans
                .of_kind(SanKind::Dns)
                .chain(subject.sans.of_kind(SanKind::Ip))
            {
                match &indexed.entry {
                    SanEntry::Dns(name) => san.dns(name),
                    SanEntry::Ip(addr) => san.ip(&addr.to_string()),
                };
            }
            let san = san
                .build(&builder.x509v3_context(None))
                .map_err(|e| anyhow!("Failed to build SubjectAlternativeName: {}", e))?;
            extensions
                .push(san)
                .map_err(|e| anyhow!("Failed to add SubjectAlternativeName: {}", e))?;
        }

        builder
            .add_extensions(&extensions)
            .map_err(|e| anyhow!("Failed to attach extensions: {}", e))?;
        builder
            .sign(&private_key, MessageDigest::sha256())
            .map_err(|e| anyhow!("Failed to sign request: {}", e))?;

        builder
            .build()
            .to_pem()
            .map_err(|e| anyhow!("Failed to encode request: {}", e))
    }

    fn package(&self, input: PackageInput<'_>) -> Result<Vec<u8>> {
        let private_key = input.key.pkey()?;
        let certificate = X509::from_pem(input.certificate_pem)
            .map_err(|e| anyhow!("Failed to parse certificate: {}", e))?;

        let mut builder = Pkcs12::builder();
        builder
            .name(input.friendly_name)
            .pkey(&private_key)
            .cert(&certificate);

        if let Some(chain_pem) = input.chain_pem {
            let mut chain =
                Stack::new().map_err(|e| anyhow!("Failed to create chain stack: {}", e))?;
            for ca in X509::stack_from_pem(chain_pem)
                .map_err(|e| anyhow!("Failed to parse certificate chain: {}", e))?
            {
                chain
                    .push(ca)
                    .map_err(|e| anyhow!("Failed to add chain certificate: {}", e))?;
            }
            builder.ca(chain);
        }

        let password = input.password.map(|p| p.expose_secret()).unwrap_or("");
        let pkcs12 = builder
            .build2(password)
            .map_err(|e| anyhow!("Failed to build PKCS#12 container: {}", e))?;
        pkcs12
            .to_der()
            .map_err(|e| anyhow!("Failed to encode PKCS#12 container: {}", e))
    }

    fn verify_container(&self, container: &[u8], password: Option<&SecretString>) -> Result<bool> {
        let pkcs12 = Pkcs12::from_der(container)
            .map_err(|e| anyhow!("Failed to parse PKCS#12 container: {}", e))?;
        let password = password.map(|p| p.expose_secret()).unwrap_or("");
        match pkcs12.parse2(password) {
            Ok(parsed) => Ok(parsed.pkey.is_some() && parsed.cert.is_some()),
            Err(_) => Ok(false),
        }
    }

    fn keys_match(&self, key: &KeyHandle, certificate: &[u8]) -> Result<bool> {
        let private_key = key.pkey()?;
        let certificate = match Encoding::detect(certificate) {
            Encoding::Pem => X509::from_pem(certificate),
            Encoding::Der => X509::from_der(certificate),
        }
        .map_err(|e| anyhow!("Failed to parse certificate: {}", e))?;

        let cert_key = certificate
            .public_key()
            .map_err(|e| anyhow!("Failed to read certificate public key: {}", e))?;
        let (Ok(cert_rsa), Ok(key_rsa)) = (cert_key.rsa(), private_key.rsa()) else {
            return Ok(false);
        };
        Ok(cert_rsa.n().to_vec() == key_rsa.n().to_vec())
    }

    fn reencode(&self, bytes: &[u8], from: Encoding, to: Encoding) -> Result<Vec<u8>> {
        let certificate = match from {
            Encoding::Pem => X509::from_pem(bytes),
            Encoding::Der => X509::from_der(bytes),
        }
        .map_err(|e| anyhow!("Failed to parse {:?} certificate: {}", from, e))?;
        match to {
            Encoding::Pem => certificate.to_pem(),
            Encoding::Der => certificate.to_der(),
        }
        .map_err(|e| anyhow!("Failed to encode {:?} certificate: {}", to, e))
    }
}

/// Subject DN in C, ST, L, O, OU, CN, emailAddress order; absent fields are
/// left out.
fn subject_name(common_name: &str, identity: &SubjectIdentity) -> Result<X509Name> {
    let mut name_builder =
        X509NameBuilder::new().map_err(|e| anyhow!("Failed to create name builder: {}", e))?;

    let entries = [
        (Nid::COUNTRYNAME, Some(identity.country()), "country"),
        (Nid::STATEORPROVINCENAME, identity.state(), "state/province"),
        (Nid::LOCALITYNAME, identity.locality(), "locality"),
        (Nid::ORGANIZATIONNAME, identity.organization(), "organization"),
        (
            Nid::ORGANIZATIONALUNITNAME,
            identity.organizational_unit(),
            "organizational unit",
        ),
        (Nid::COMMONNAME, Some(common_name), "CN"),
        (Nid::PKCS9_EMAILADDRESS, identity.email(), "email"),
    ];
    for (nid, value, label) in entries {
        if let Some(value) = value {
            name_builder
                .append_entry_by_nid(nid, value)
                .map_err(|e| anyhow!("Failed to set {}: {}", label, e))?;
        }
    }
    Ok(name_builder.build())
}
