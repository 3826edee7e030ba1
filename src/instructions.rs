//! Signing instructions handed to the CA operator after generation.

use std::fmt::Write as _;
use std::path::PathBuf;

use crate::error::Result;
use crate::profile::Profile;
use crate::storage::ArtifactStore;
use crate::unit::CertificateUnit;

/// Render the instructions text for the units of one profile run.
pub fn render(store: &ArtifactStore, profile: Profile, units: &[CertificateUnit]) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "{} certificate signing instructions", profile);
    let _ = writeln!(out, "{}", "=".repeat(40));
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Submit each request below to your CA. Keep the SAN entries in the order shown."
    );
    let _ = writeln!(out);

    for (i, unit) in units.iter().enumerate() {
        let paths = store.paths(unit);
        let _ = writeln!(out, "[{}] {}", i + 1, unit.display_label());
        let _ = writeln!(out, "    Request:     {}", paths.request.display());
        let _ = writeln!(out, "    Subject:     {}", unit.identity.one_line(&unit.common_name));
        let _ = writeln!(out, "    Key length:  {} bits", unit.key_length);
        let _ = writeln!(out, "    SAN entries:");
        for line in unit.sans.config_lines() {
            let _ = writeln!(out, "        {}", line);
        }
        let _ = writeln!(out, "    Place the signed certificate at:");
        let _ = writeln!(out, "        {}", paths.certificate.display());
        let _ = writeln!(out);
    }

    let _ = writeln!(out, "Optionally place the CA chain (intermediate first, then root) at:");
    let mut chains: Vec<PathBuf> = Vec::new();
    for candidate in units.iter().flat_map(|u| store.chain_candidates(u)) {
        if !chains.contains(&candidate) {
            chains.push(candidate);
        }
    }
    for chain in chains {
        let _ = writeln!(out, "    {}", chain.display());
    }
    let _ = writeln!(out);
    let _ = writeln!(
        out,
        "Then run the conversion step for {} to build the PKCS#12 bundles.",
        profile
    );
    out
}

/// Write `INSTRUCTIONS.txt` for a profile run and return its path.
pub fn write(
    store: &ArtifactStore,
    profile: Profile,
    units: &[CertificateUnit],
) -> Result<PathBuf> {
    let path = store.instructions_path(profile);
    store.write(&path, render(store, profile, units).as_bytes())?;
    Ok(path)
}
