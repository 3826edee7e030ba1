//! Subject Distinguished Name assembly
//!
//! Turns raw operator input into a validated [`SubjectIdentity`]. The country
//! is the only required field; every other field is either a validated value
//! or absent, and absent fields never reach the certificate request.
//!
//! # Example
//! ```rust
//! use cert_provisioner::identity::SubjectIdentityBuilder;
//!
//! let identity = SubjectIdentityBuilder::new()
//!     .country("US".to_string())
//!     .organization("Example Corp".to_string())
//!     .organizational_unit("IT Security".to_string())
//!     .build()?;
//! assert_eq!(identity.country(), "US");
//! assert!(identity.state().is_none());
//! # Ok::<(), cert_provisioner::error::ProvisionError>(())
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{ProvisionError, Result};

static COUNTRY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2}$").expect("valid regex"));
static FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9\s.,'\-]{1,64}$").expect("valid regex"));
static EMAIL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[A-Za-z0-9._%+\-]+@[A-Za-z0-9\-]+(\.[A-Za-z0-9\-]+)*\.[A-Za-z]{2,}$")
        .expect("valid regex")
});

/// Validated subject identity shared by every unit of a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubjectIdentity {
    country: String,
    state: Option<String>,
    locality: Option<String>,
    organization: Option<String>,
    organizational_unit: Option<String>,
    email: Option<String>,
}

impl SubjectIdentity {
    pub fn country(&self) -> &str {
        &self.country
    }

    pub fn state(&self) -> Option<&str> {
        self.state.as_deref()
    }

    pub fn locality(&self) -> Option<&str> {
        self.locality.as_deref()
    }

    pub fn organization(&self) -> Option<&str> {
        self.organization.as_deref()
    }

    pub fn organizational_unit(&self) -> Option<&str> {
        self.organizational_unit.as_deref()
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Subject DN in one-line form (`/C=US/O=Example/CN=...`) for display.
    pub fn one_line(&self, common_name: &str) -> String {
        let mut out = format!("/C={}", self.country);
        for (key, value) in [
            ("ST", &self.state),
            ("L", &self.locality),
            ("O", &self.organization),
            ("OU", &self.organizational_unit),
        ] {
            if let Some(value) = value {
                out.push_str(&format!("/{}={}", key, value));
            }
        }
        out.push_str(&format!("/CN={}", common_name));
        if let Some(email) = &self.email {
            out.push_str(&format!("/emailAddress={}", email));
        }
        out
    }
}

/// Builder that validates raw field values into a [`SubjectIdentity`].
///
/// Optional setters accept the raw string; an empty (or whitespace-only) value
/// means the field was not supplied.
#[derive(Debug, Default, Clone)]
pub struct SubjectIdentityBuilder {
    country: String,
    state: Option<String>,
    locality: Option<String>,
    organization: Option<String>,
    organizational_unit: Option<String>,
    email: Option<String>,
}

impl SubjectIdentityBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the country (C), a two-letter upper-case ISO 3166-1 code
    pub fn country(mut self, country: String) -> Self {
        self.country = country;
        self
    }

    /// Set the state/province (ST)
    pub fn state(mut self, state: String) -> Self {
        self.state = present(state);
        self
    }

    /// Set the locality (L)
    pub fn locality(mut self, locality: String) -> Self {
        self.locality = present(locality);
        self
    }

    /// Set the organization (O)
    pub fn organization(mut self, org: String) -> Self {
        self.organization = present(org);
        self
    }

    /// Set the organizational unit (OU)
    pub fn organizational_unit(mut self, ou: String) -> Self {
        self.organizational_unit = present(ou);
        self
    }

    /// Set the contact email (emailAddress)
    pub fn email(mut self, email: String) -> Self {
        self.email = present(email);
        self
    }

    /// Validate all fields and produce the identity.
    ///
    /// # Errors
    /// `InvalidField` naming the first offending field.
    pub fn build(self) -> Result<SubjectIdentity> {
        let country = self.country.trim().to_string();
        if !COUNTRY_RE.is_match(&country) {
            return Err(ProvisionError::invalid_field(
                "country",
                "must be two upper-case letters",
            ));
        }

        Ok(SubjectIdentity {
            country,
            state: check_field("state", self.state)?,
            locality: check_field("locality", self.locality)?,
            organization: check_field("organization", self.organization)?,
            organizational_unit: check_field("organizational unit", self.organizational_unit)?,
            email: check_email(self.email)?,
        })
    }
}

fn present(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn check_field(name: &str, value: Option<String>) -> Result<Option<String>> {
    match value {
        Some(v) if !FIELD_RE.is_match(&v) => Err(ProvisionError::invalid_field(
            name,
            "must be 1-64 letters, digits, spaces or . , ' -",
        )),
        other => Ok(other),
    }
}

fn check_email(value: Option<String>) -> Result<Option<String>> {
    match value {
        Some(v) if !EMAIL_RE.is_match(&v) => Err(ProvisionError::invalid_field(
            "email",
            "must look like name@domain.tld",
        )),
        other => Ok(other),
    }
}
