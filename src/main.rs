//! Cert Provisioner
//!
//! Interactive tool that prepares certificate requests for PVWA, PSM, HTML5
//! Gateway, PTA and Vault, and converts the signed certificates into PKCS#12
//! bundles.
//!
//! # Quick Start
//!
//! ```bash
//! cargo build --release
//! ./target/release/cert-provisioner                 # uses ./cert-provisioner.toml if present
//! ./target/release/cert-provisioner site.toml       # explicit configuration file
//! ```
//!
//! Startup checks the configuration, the output directory and the OpenSSL
//! library; any failure exits with a non-zero status.

use anyhow::{anyhow, Context, Result};
use cert_provisioner::configs::AppConfig;
use cert_provisioner::crypto::{CryptoBackend, OpensslBackend};
use cert_provisioner::prompt::Prompter;
use cert_provisioner::telemetry;
use cert_provisioner::workflow::Workflow;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

const SELF_TEST_KEY_BITS: u32 = 2048;

fn main() -> Result<()> {
    println!("=== Certificate Provisioner ===\n");

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config =
        AppConfig::load(config_path.as_deref()).context("Failed to load configuration")?;
    println!("✓ Configuration loaded");

    telemetry::init_tracing(&config.logging.filter).context("Failed to initialise logging")?;

    check_output_root(&config.output.root)?;
    println!("✓ Output directory writable: {}", config.output.root.display());

    let backend = OpensslBackend::new();
    backend
        .generate_key(SELF_TEST_KEY_BITS)
        .context("OpenSSL self-test failed")?;
    println!("✓ OpenSSL self-test passed");

    let workflow = Workflow::new(backend, config.artifact_store(), config.keys.length);
    let stdin = io::stdin();
    let mut prompter = Prompter::new(stdin.lock(), io::stdout());

    // Main menu loop
    loop {
        prompter.say("\n=== Cert Provisioner Menu ===")?;
        prompter.say("1. Generate certificate requests")?;
        prompter.say("2. Convert signed certificates")?;
        prompter.say("3. Show status")?;
        prompter.say("4. Exit")?;
        let Some(choice) = prompter.ask_or_eof("\nSelect an option", None)? else {
            println!();
            break;
        };

        let outcome = match choice.as_str() {
            "1" => prompter.choose_profile().and_then(|profile| {
                workflow
                    .run_generation(&mut prompter, profile, &config.identity_defaults)
                    .map(|_| ())
            }),
            "2" => prompter
                .choose_profile()
                .and_then(|profile| workflow.run_conversion(&mut prompter, profile).map(|_| ())),
            "3" => prompter
                .choose_profile()
                .and_then(|profile| workflow.print_status(&mut prompter, profile)),
            "4" => {
                println!("\nExiting Cert Provisioner...");
                break;
            }
            _ => {
                println!("Invalid option. Please select 1-4.");
                Ok(())
            }
        };
        if let Err(e) = outcome {
            println!("✗ {:#}", e);
        }
    }

    Ok(())
}

/// Create the output root if needed and prove it accepts writes.
fn check_output_root(root: &Path) -> Result<()> {
    fs::create_dir_all(root)
        .with_context(|| format!("Failed to create output directory {}", root.display()))?;
    let probe = root.join(".write-test");
    fs::write(&probe, b"ok")
        .map_err(|e| anyhow!("Output directory {} is not writable: {}", root.display(), e))?;
    fs::remove_file(&probe)
        .with_context(|| format!("Failed to remove {}", probe.display()))?;
    Ok(())
}
