mod common;

use std::cell::Cell;
use std::fs;
use std::net::Ipv4Addr;

use anyhow::anyhow;
use openssl::pkcs12::Pkcs12;
use secrecy::{ExposeSecret, SecretString};
use tempfile::TempDir;

use cert_provisioner::conversion::{
    ChainSource, ConversionRequest, OutputEncoding, PASSWORD_LENGTH,
};
use cert_provisioner::crypto::{
    CryptoBackend, Encoding, KeyHandle, OpensslBackend, PackageInput, RequestSubject,
};
use cert_provisioner::error::ProvisionError;
use cert_provisioner::lifecycle::{
    ArtifactState, Detection, FailureReason, LifecycleManager, UnitId,
};
use cert_provisioner::profile::Profile;
use cert_provisioner::storage::ArtifactStore;
use cert_provisioner::topology::{plan, NodeRecord, Strategy, TopologyRequest};
use cert_provisioner::unit::CertificateUnit;
use cert_provisioner::workflow::Workflow;

use common::TestCa;

fn store(dir: &TempDir) -> ArtifactStore {
    ArtifactStore::new(dir.path(), "ca-chain.crt")
}

fn single(profile: Profile, fqdn: &str) -> CertificateUnit {
    let request = TopologyRequest {
        profile,
        nodes: vec![NodeRecord::new(fqdn)],
        load_balancer: None,
        strategy: Strategy::UniquePerNode,
    };
    plan(&request, &common::identity(), 2048).unwrap().remove(0)
}

fn vault_units() -> Vec<CertificateUnit> {
    let request = TopologyRequest {
        profile: Profile::Vault,
        nodes: vec![
            NodeRecord::with_addresses(
                "vault1.corp.example",
                "vault1",
                vec![Ipv4Addr::new(10, 0, 0, 1)],
            ),
            NodeRecord::with_addresses(
                "vault2.corp.example",
                "vault2",
                vec![Ipv4Addr::new(10, 0, 0, 2)],
            ),
        ],
        load_balancer: None,
        strategy: Strategy::UniquePerNode,
    };
    plan(&request, &common::identity(), 2048).unwrap()
}

/// Sign the unit's request with the test CA and place the certificate.
fn place_signed<B: CryptoBackend>(manager: &LifecycleManager<B>, id: UnitId, ca: &TestCa) {
    let paths = manager.store().paths(manager.unit(id));
    let request = fs::read(&paths.request).unwrap();
    let certificate = ca.sign(&request).unwrap();
    fs::write(&paths.certificate, certificate.to_pem().unwrap()).unwrap();
}

fn generated<B: CryptoBackend>(
    manager: &mut LifecycleManager<B>,
    unit: CertificateUnit,
) -> UnitId {
    let id = manager.add(unit);
    manager.generate(id).unwrap();
    assert_eq!(*manager.state(id), ArtifactState::AwaitingSignature);
    id
}

#[test]
fn vault_conversion_always_generates_password() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let ca = TestCa::new("Test Root").unwrap();
    fs::create_dir_all(store.profile_dir(Profile::Vault)).unwrap();
    fs::write(
        store.profile_dir(Profile::Vault).join("ca-chain.crt"),
        ca.certificate_pem(),
    )
    .unwrap();

    let mut manager = LifecycleManager::new(OpensslBackend::new(), store.clone());
    let ids: Vec<UnitId> = vault_units()
        .into_iter()
        .map(|u| generated(&mut manager, u))
        .collect();

    for id in &ids {
        place_signed(&manager, *id, &ca);
        assert_eq!(manager.detect_signed(*id).unwrap(), Detection::Signed);

        let request = ConversionRequest {
            protect: Some(false),
            ..Default::default()
        };
        let result = manager.convert(*id, &request).unwrap();
        assert_eq!(*manager.state(*id), ArtifactState::Verified);

        let password = result.password.expect("vault bundles are protected");
        assert_eq!(password.expose_secret().len(), PASSWORD_LENGTH);
        let password_file = result.password_file.unwrap();
        let stored = fs::read_to_string(&password_file).unwrap();
        assert_eq!(stored.trim_end(), password.expose_secret());

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let mode = fs::metadata(&password_file).unwrap().permissions().mode() & 0o777;
            assert_eq!(mode, 0o600);
            let key_mode = fs::metadata(manager.store().paths(manager.unit(*id)).key)
                .unwrap()
                .permissions()
                .mode()
                & 0o777;
            assert_eq!(key_mode, 0o600);
        }

        assert_eq!(
            result.chain,
            Some(ChainSource::Discovered(store.profile_dir(Profile::Vault).join("ca-chain.crt")))
        );
        let pfx = fs::read(manager.store().paths(manager.unit(*id)).pfx).unwrap();
        let parsed = Pkcs12::from_der(&pfx)
            .unwrap()
            .parse2(password.expose_secret())
            .unwrap();
        assert!(parsed.pkey.is_some());
        assert_eq!(parsed.ca.map(|c| c.len()), Some(1));
    }
    assert!(store.paths(manager.unit(ids[1])).pfx.ends_with("node2/vault-node2.pfx"));
}

#[test]
fn password_defaults_differ_between_html5gw_and_pvwa() {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::new("Test Root").unwrap();
    let mut manager = LifecycleManager::new(OpensslBackend::new(), store(&dir));

    let gw = generated(&mut manager, single(Profile::Html5Gw, "gw.corp.example"));
    place_signed(&manager, gw, &ca);
    manager.detect_signed(gw).unwrap();
    let result = manager.convert(gw, &ConversionRequest::default()).unwrap();
    assert!(result.password.is_some());
    let gw_paths = manager.store().paths(manager.unit(gw));
    assert!(result.outputs.contains(&OutputEncoding::PemCertificate(gw_paths.pem.clone())));
    assert!(fs::read_to_string(&gw_paths.pem).unwrap().starts_with("-----BEGIN CERTIFICATE-----"));

    let pvwa = generated(&mut manager, single(Profile::Pvwa, "pvwa.corp.example"));
    place_signed(&manager, pvwa, &ca);
    manager.detect_signed(pvwa).unwrap();
    let result = manager.convert(pvwa, &ConversionRequest::default()).unwrap();
    assert!(result.password.is_none());
    assert!(result.password_file.is_none());
    assert_eq!(result.outputs.len(), 1);
    let pvwa_paths = manager.store().paths(manager.unit(pvwa));
    assert!(!pvwa_paths.password.exists());
    let pfx = fs::read(&pvwa_paths.pfx).unwrap();
    assert!(Pkcs12::from_der(&pfx).unwrap().parse2("").is_ok());
}

#[test]
fn mismatched_certificate_fails_and_is_left_in_place() {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::new("Test Root").unwrap();
    let mut manager = LifecycleManager::new(OpensslBackend::new(), store(&dir));
    let id = generated(&mut manager, single(Profile::Psm, "psm.corp.example"));

    let paths = manager.store().paths(manager.unit(id));
    let foreign = ca.sign_foreign("psm.corp.example").unwrap().to_pem().unwrap();
    fs::write(&paths.certificate, &foreign).unwrap();

    match manager.detect_signed(id) {
        Err(ProvisionError::KeyCertMismatch { unit }) => assert_eq!(unit, "PSM single"),
        other => panic!("unexpected: {other:?}"),
    }
    assert_eq!(*manager.state(id), ArtifactState::Failed(FailureReason::KeyCertMismatch));
    assert_eq!(fs::read(&paths.certificate).unwrap(), foreign);

    // Conversion is refused until a matching certificate is detected.
    assert!(matches!(
        manager.convert(id, &ConversionRequest::default()),
        Err(ProvisionError::InvalidTransition { .. })
    ));

    place_signed(&manager, id, &ca);
    assert_eq!(manager.detect_signed(id).unwrap(), Detection::Signed);
}

#[test]
fn detection_waits_for_placed_certificate() {
    let dir = tempfile::tempdir().unwrap();
    let mut manager = LifecycleManager::new(OpensslBackend::new(), store(&dir));
    let id = generated(&mut manager, single(Profile::Pta, "pta.corp.example"));
    assert_eq!(manager.detect_signed(id).unwrap(), Detection::Pending);
    assert_eq!(*manager.state(id), ArtifactState::AwaitingSignature);
    assert!(matches!(
        manager.convert(id, &ConversionRequest::default()),
        Err(ProvisionError::InvalidTransition { .. })
    ));
}

#[test]
fn der_certificate_is_accepted() {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::new("Test Root").unwrap();
    let mut manager = LifecycleManager::new(OpensslBackend::new(), store(&dir));
    let id = generated(&mut manager, single(Profile::Psm, "psm.corp.example"));

    let paths = manager.store().paths(manager.unit(id));
    let certificate = ca.sign(&fs::read(&paths.request).unwrap()).unwrap();
    fs::write(&paths.certificate, certificate.to_der().unwrap()).unwrap();
    manager.detect_signed(id).unwrap();
    manager.convert(id, &ConversionRequest::default()).unwrap();
    assert_eq!(*manager.state(id), ArtifactState::Verified);
}

#[test]
fn certificate_with_text_before_the_armour_is_pem() {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::new("Test Root").unwrap();
    let mut manager = LifecycleManager::new(OpensslBackend::new(), store(&dir));
    let id = generated(&mut manager, single(Profile::Html5Gw, "gw.corp.example"));

    let paths = manager.store().paths(manager.unit(id));
    let certificate = ca.sign(&fs::read(&paths.request).unwrap()).unwrap();
    let mut placed = b"subject=CN = gw.corp.example\nissuer=CN = Test Root\n".to_vec();
    placed.extend(certificate.to_pem().unwrap());
    fs::write(&paths.certificate, &placed).unwrap();

    assert_eq!(manager.detect_signed(id).unwrap(), Detection::Signed);
    manager.convert(id, &ConversionRequest::default()).unwrap();
    assert_eq!(*manager.state(id), ArtifactState::Verified);
    assert_eq!(fs::read(&paths.pem).unwrap(), certificate.to_pem().unwrap());
}

#[test]
fn removed_certificate_is_a_missing_artifact() {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::new("Test Root").unwrap();
    let mut manager = LifecycleManager::new(OpensslBackend::new(), store(&dir));
    let id = generated(&mut manager, single(Profile::Pvwa, "pvwa.corp.example"));
    place_signed(&manager, id, &ca);
    manager.detect_signed(id).unwrap();

    fs::remove_file(manager.store().paths(manager.unit(id)).certificate).unwrap();
    let err = manager.convert(id, &ConversionRequest::default()).unwrap_err();
    assert!(matches!(err, ProvisionError::MissingArtifact { .. }));
    assert!(err.is_recoverable());
    assert_eq!(*manager.state(id), ArtifactState::Signed);
}

#[test]
fn pta_override_chain_takes_precedence() {
    let dir = tempfile::tempdir().unwrap();
    let store = store(&dir);
    let root = TestCa::new("Test Root").unwrap();
    let intermediate = TestCa::new("Test Intermediate").unwrap();

    // A discovered chain that must be ignored.
    fs::create_dir_all(store.profile_dir(Profile::Pta)).unwrap();
    let discovered = store.profile_dir(Profile::Pta).join("ca-chain.crt");
    fs::write(discovered, root.certificate_pem()).unwrap();

    let intermediate_path = dir.path().join("intermediate.cer");
    fs::write(&intermediate_path, intermediate.certificate.to_der().unwrap()).unwrap();
    let root_path = dir.path().join("root.pem");
    fs::write(&root_path, root.certificate_pem()).unwrap();

    let mut manager = LifecycleManager::new(OpensslBackend::new(), store);
    let id = generated(&mut manager, single(Profile::Pta, "pta.corp.example"));
    place_signed(&manager, id, &intermediate);
    manager.detect_signed(id).unwrap();

    let request = ConversionRequest {
        protect: Some(true),
        intermediate: Some(intermediate_path.clone()),
        root: Some(root_path.clone()),
    };
    let result = manager.convert(id, &request).unwrap();
    assert_eq!(result.chain, Some(ChainSource::Override(vec![intermediate_path, root_path])));

    let paths = manager.store().paths(manager.unit(id));
    let chain_pem = fs::read(&paths.chain_pem).unwrap();
    let chain = openssl::x509::X509::stack_from_pem(&chain_pem).unwrap();
    assert_eq!(chain.len(), 2);
    assert_eq!(
        chain[0].to_der().unwrap(),
        intermediate.certificate.to_der().unwrap()
    );
}

#[test]
fn regenerate_replaces_key_and_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::new("Test Root").unwrap();
    let mut manager = LifecycleManager::new(OpensslBackend::new(), store(&dir));
    let id = generated(&mut manager, single(Profile::Pvwa, "pvwa.corp.example"));
    place_signed(&manager, id, &ca);
    manager.detect_signed(id).unwrap();
    manager.convert(id, &ConversionRequest::default()).unwrap();

    let paths = manager.store().paths(manager.unit(id));
    let old_key = fs::read(&paths.key).unwrap();
    manager.generate(id).unwrap();
    assert_eq!(*manager.state(id), ArtifactState::AwaitingSignature);
    assert_ne!(fs::read(&paths.key).unwrap(), old_key);
    assert!(!paths.pfx.exists());

    // The old certificate no longer matches the new key.
    assert!(matches!(
        manager.detect_signed(id),
        Err(ProvisionError::KeyCertMismatch { .. })
    ));
}

#[test]
fn failed_regeneration_does_not_leave_a_stale_manifest() {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::new("Test Root").unwrap();
    let mut manager = LifecycleManager::new(OpensslBackend::new(), store(&dir));
    let unit = single(Profile::Pvwa, "pvwa.corp.example");
    let id = generated(&mut manager, unit.clone());
    place_signed(&manager, id, &ca);
    manager.detect_signed(id).unwrap();
    manager.convert(id, &ConversionRequest::default()).unwrap();

    // A directory where the key belongs makes the key write fail.
    let paths = manager.store().paths(&unit);
    fs::remove_file(&paths.key).unwrap();
    fs::create_dir(&paths.key).unwrap();

    assert!(matches!(manager.generate(id), Err(ProvisionError::Io { .. })));
    assert_eq!(*manager.state(id), ArtifactState::Empty);
    let manifest = manager.store().load_manifest(&unit).unwrap().unwrap();
    assert_eq!(manifest.state, ArtifactState::Empty);
    assert!(!paths.pfx.exists());
}

#[test]
fn regenerating_with_fewer_units_retires_the_rest() {
    let dir = tempfile::tempdir().unwrap();
    let workflow = Workflow::new(OpensslBackend::new(), store(&dir), 2048);
    let per_node = TopologyRequest {
        profile: Profile::Psm,
        nodes: vec![
            NodeRecord::new("psm1.corp.example"),
            NodeRecord::new("psm2.corp.example"),
            NodeRecord::new("psm3.corp.example"),
        ],
        load_balancer: None,
        strategy: Strategy::UniquePerNode,
    };
    let (units, _) = workflow.plan(&per_node, &common::identity(), &[]).unwrap();
    workflow.generate_units(&units).unwrap();
    assert_eq!(workflow.status(Profile::Psm).unwrap().len(), 3);
    let old_key = workflow.store().paths(&units[0]).key;

    let shared = TopologyRequest {
        strategy: Strategy::SingleWithSan,
        load_balancer: Some("psm.corp.example".to_string()),
        ..per_node
    };
    let (units, _) = workflow.plan(&shared, &common::identity(), &[]).unwrap();
    assert_eq!(units.len(), 1);
    workflow.generate_units(&units).unwrap();

    let status = workflow.status(Profile::Psm).unwrap();
    let labels: Vec<&str> = status.iter().map(|r| r.label.as_str()).collect();
    assert_eq!(labels, vec!["PSM single"]);
    assert!(!old_key.exists());

    let (_, detected) = workflow.detect(Profile::Psm).unwrap();
    assert_eq!(detected.len(), 1);
}

#[test]
fn conversion_resumes_from_manifests_in_a_new_run() {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::new("Test Root").unwrap();
    let request = TopologyRequest {
        profile: Profile::Psm,
        nodes: vec![
            NodeRecord::new("psm1.corp.example"),
            NodeRecord::new("psm2.corp.example"),
        ],
        load_balancer: None,
        strategy: Strategy::UniquePerNode,
    };

    let workflow = Workflow::new(OpensslBackend::new(), store(&dir), 2048);
    let (units, rejected) = workflow
        .plan(&request, &common::identity(), &["extra.corp.example".to_string()])
        .unwrap();
    assert!(rejected.is_empty());
    let reports = workflow.generate_units(&units).unwrap();
    assert!(reports.iter().all(|r| r.state == ArtifactState::AwaitingSignature));
    assert!(workflow.store().instructions_path(Profile::Psm).is_file());

    // Only the first server gets signed before the next run.
    let first = workflow.store().paths(&units[0]);
    let signed = ca.sign(&fs::read(&first.request).unwrap()).unwrap();
    fs::write(&first.certificate, signed.to_pem().unwrap()).unwrap();

    let later = Workflow::new(OpensslBackend::new(), store(&dir), 2048);
    let (mut manager, detected) = later.detect(Profile::Psm).unwrap();
    assert_eq!(detected.len(), 2);
    assert_eq!(detected[0].state, ArtifactState::Signed);
    assert_eq!(detected[1].state, ArtifactState::AwaitingSignature);

    let converted = later.convert_signed(&mut manager, &ConversionRequest::default());
    assert_eq!(converted.len(), 1);
    assert_eq!(converted[0].state, ArtifactState::Verified);

    let status = later.status(Profile::Psm).unwrap();
    assert_eq!(status[0].state, ArtifactState::Verified);
    assert_eq!(status[1].state, ArtifactState::AwaitingSignature);
}

#[test]
fn pem_der_round_trip() {
    let ca = TestCa::new("Round Trip").unwrap();
    let backend = OpensslBackend::new();
    let pem = ca.certificate_pem();
    let der = backend.reencode(&pem, Encoding::Pem, Encoding::Der).unwrap();
    assert_eq!(Encoding::detect(&der), Encoding::Der);
    assert_eq!(backend.reencode(&der, Encoding::Der, Encoding::Pem).unwrap(), pem);
}

/// How the scripted backend answers container verification.
#[derive(Default, Clone, Copy)]
enum VerifyOutcome {
    #[default]
    Delegate,
    Reject,
    Error,
}

/// Delegates to OpenSSL but fails selected operations.
#[derive(Default)]
struct ScriptedBackend {
    inner: OpensslBackend,
    fail_request_for: Option<&'static str>,
    fail_package: bool,
    verify: VerifyOutcome,
    requests: Cell<usize>,
}

impl CryptoBackend for ScriptedBackend {
    fn generate_key(&self, bits: u32) -> anyhow::Result<KeyHandle> {
        self.inner.generate_key(bits)
    }

    fn generate_request(
        &self,
        key: &KeyHandle,
        subject: RequestSubject<'_>,
    ) -> anyhow::Result<Vec<u8>> {
        self.requests.set(self.requests.get() + 1);
        if self.fail_request_for == Some(subject.common_name) {
            return Err(anyhow!("scripted request failure"));
        }
        self.inner.generate_request(key, subject)
    }

    fn package(&self, input: PackageInput<'_>) -> anyhow::Result<Vec<u8>> {
        if self.fail_package {
            return Err(anyhow!("scripted packaging failure"));
        }
        self.inner.package(input)
    }

    fn verify_container(
        &self,
        container: &[u8],
        password: Option<&SecretString>,
    ) -> anyhow::Result<bool> {
        match self.verify {
            VerifyOutcome::Delegate => self.inner.verify_container(container, password),
            VerifyOutcome::Reject => Ok(false),
            VerifyOutcome::Error => Err(anyhow!("scripted verification failure")),
        }
    }

    fn keys_match(&self, key: &KeyHandle, certificate: &[u8]) -> anyhow::Result<bool> {
        self.inner.keys_match(key, certificate)
    }

    fn reencode(&self, bytes: &[u8], from: Encoding, to: Encoding) -> anyhow::Result<Vec<u8>> {
        self.inner.reencode(bytes, from, to)
    }
}

#[test]
fn request_failure_is_isolated_to_its_unit() {
    let dir = tempfile::tempdir().unwrap();
    let backend = ScriptedBackend {
        fail_request_for: Some("vault1.corp.example"),
        ..Default::default()
    };
    let mut manager = LifecycleManager::new(&backend, store(&dir));
    let ids: Vec<UnitId> = vault_units().into_iter().map(|u| manager.add(u)).collect();

    match manager.generate(ids[0]) {
        Err(ProvisionError::CryptoBackendFailure { unit, .. }) => assert_eq!(unit, "Vault node 1"),
        other => panic!("unexpected: {other:?}"),
    }
    assert!(matches!(
        manager.state(ids[0]),
        ArtifactState::Failed(FailureReason::CryptoBackend { .. })
    ));
    // No silent retry.
    assert_eq!(backend.requests.get(), 1);

    manager.generate(ids[1]).unwrap();
    assert_eq!(*manager.state(ids[1]), ArtifactState::AwaitingSignature);
    assert!(matches!(
        manager.detect_signed(ids[0]),
        Err(ProvisionError::InvalidTransition { .. })
    ));
}

#[test]
fn packaging_failure_moves_unit_to_conversion_error() {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::new("Test Root").unwrap();
    let backend = ScriptedBackend {
        fail_package: true,
        ..Default::default()
    };
    let mut manager = LifecycleManager::new(&backend, store(&dir));
    let id = generated(&mut manager, single(Profile::Pvwa, "pvwa.corp.example"));
    place_signed(&manager, id, &ca);
    manager.detect_signed(id).unwrap();

    assert!(matches!(
        manager.convert(id, &ConversionRequest::default()),
        Err(ProvisionError::ConversionError { .. })
    ));
    assert!(matches!(
        manager.state(id),
        ArtifactState::Failed(FailureReason::ConversionError(_))
    ));
    assert!(!manager.store().paths(manager.unit(id)).pfx.exists());

    // The certificate is still good; detection re-arms conversion.
    assert_eq!(manager.detect_signed(id).unwrap(), Detection::Signed);
}

#[test]
fn resume_picks_up_persisted_state_and_key() {
    let dir = tempfile::tempdir().unwrap();
    let ca = TestCa::new("Test Root").unwrap();
    let unit = single(Profile::Html5Gw, "gw.corp.example");

    let mut first = LifecycleManager::new(OpensslBackend::new(), store(&dir));
    let id = generated(&mut first, unit.clone());
    place_signed(&first, id, &ca);
    drop(first);

    let mut second = LifecycleManager::new(OpensslBackend::new(), store(&dir));
    let id = second.resume(unit.clone()).unwrap();
    assert_eq!(*second.state(id), ArtifactState::AwaitingSignature);
    assert_eq!(second.detect_signed(id).unwrap(), Detection::Signed);

    // A unit that was never generated starts empty.
    let other = single(Profile::Pvwa, "pvwa.corp.example");
    let fresh = second.resume(other).unwrap();
    assert_eq!(*second.state(fresh), ArtifactState::Empty);
}

#[test]
fn verification_failure_moves_unit_to_conversion_error() {
    let ca = TestCa::new("Test Root").unwrap();
    for verify in [VerifyOutcome::Reject, VerifyOutcome::Error] {
        let dir = tempfile::tempdir().unwrap();
        let backend = ScriptedBackend {
            verify,
            ..Default::default()
        };
        let mut manager = LifecycleManager::new(&backend, store(&dir));
        let id = generated(&mut manager, single(Profile::Psm, "psm.corp.example"));
        place_signed(&manager, id, &ca);
        manager.detect_signed(id).unwrap();

        assert!(matches!(
            manager.convert(id, &ConversionRequest::default()),
            Err(ProvisionError::ConversionError { .. })
        ));
        assert!(matches!(
            manager.state(id),
            ArtifactState::Failed(FailureReason::ConversionError(_))
        ));
        // The bundle was written before verification ran.
        let paths = manager.store().paths(manager.unit(id));
        assert!(paths.pfx.exists());
        let manifest = manager.store().load_manifest(manager.unit(id)).unwrap().unwrap();
        assert!(matches!(manifest.state, ArtifactState::Failed(_)));

        assert_eq!(manager.detect_signed(id).unwrap(), Detection::Signed);
    }
}
