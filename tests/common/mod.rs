//! Test-only certificate authority playing the external signer.

#![allow(dead_code)]

use anyhow::{anyhow, Result};
use openssl::asn1::Asn1Time;
use openssl::bn::{BigNum, MsbOption};
use openssl::hash::MessageDigest;
use openssl::nid::Nid;
use openssl::pkey::{PKey, Private};
use openssl::x509::extension::BasicConstraints;
use openssl::x509::{X509Name, X509Req, X509};

use cert_provisioner::identity::{SubjectIdentity, SubjectIdentityBuilder};

const X509_VERSION_3: i32 = 2;

pub struct TestCa {
    key: PKey<Private>,
    pub certificate: X509,
}

impl TestCa {
    pub fn new(common_name: &str) -> Result<Self> {
        let key = PKey::from_rsa(openssl::rsa::Rsa::generate(2048)?)?;
        let mut name = X509Name::builder()?;
        name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
        let name = name.build();

        let serial = random_serial()?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(30)?;

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(&name)?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.set_pubkey(&key)?;
        builder.append_extension(BasicConstraints::new().critical().ca().build()?)?;
        builder.sign(&key, MessageDigest::sha256())?;
        Ok(Self {
            key,
            certificate: builder.build(),
        })
    }

    pub fn certificate_pem(&self) -> Vec<u8> {
        self.certificate.to_pem().unwrap()
    }

    /// Sign a PEM request, copying its subject and requested extensions.
    pub fn sign(&self, request_pem: &[u8]) -> Result<X509> {
        let request = X509Req::from_pem(request_pem)?;
        let public = request.public_key()?;
        if !request.verify(&public)? {
            return Err(anyhow!("request signature does not verify"));
        }

        let serial = random_serial()?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(30)?;

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(request.subject_name())?;
        builder.set_issuer_name(self.certificate.subject_name())?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.set_pubkey(&public)?;
        for extension in request.extensions()? {
            builder.append_extension(extension)?;
        }
        builder.sign(&self.key, MessageDigest::sha256())?;
        Ok(builder.build())
    }

    /// A certificate for `common_name` over a freshly generated key that no
    /// unit owns.
    pub fn sign_foreign(&self, common_name: &str) -> Result<X509> {
        let foreign = PKey::from_rsa(openssl::rsa::Rsa::generate(2048)?)?;
        let mut name = X509Name::builder()?;
        name.append_entry_by_nid(Nid::COMMONNAME, common_name)?;
        let name = name.build();

        let serial = random_serial()?;
        let not_before = Asn1Time::days_from_now(0)?;
        let not_after = Asn1Time::days_from_now(30)?;

        let mut builder = X509::builder()?;
        builder.set_version(X509_VERSION_3)?;
        builder.set_serial_number(&serial)?;
        builder.set_subject_name(&name)?;
        builder.set_issuer_name(self.certificate.subject_name())?;
        builder.set_not_before(&not_before)?;
        builder.set_not_after(&not_after)?;
        builder.set_pubkey(&foreign)?;
        builder.sign(&self.key, MessageDigest::sha256())?;
        Ok(builder.build())
    }
}

fn random_serial() -> Result<openssl::asn1::Asn1Integer> {
    let mut serial = BigNum::new()?;
    serial.rand(64, MsbOption::MAYBE_ZERO, false)?;
    Ok(serial.to_asn1_integer()?)
}

pub fn identity() -> SubjectIdentity {
    SubjectIdentityBuilder::new()
        .country("US".to_string())
        .organization("Corp".to_string())
        .organizational_unit("Infrastructure".to_string())
        .build()
        .unwrap()
}
