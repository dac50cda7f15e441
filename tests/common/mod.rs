//! Shared test fixtures: generated keys, certificates, SCTs and signed log lists.
//!
//! Only depends on external crates so the library's unit tests can mount
//! the same file.

#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use boring::ec::{EcGroup, EcKey};
use boring::hash::MessageDigest;
use boring::nid::Nid;
use boring::pkey::{PKey, Private};
use boring::rsa::Rsa;
use boring::sign::Signer;
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::OnceLock;
use std::time::Duration;
use x509_cert::certificate::{TbsCertificate, Version};
use x509_cert::der::asn1::{BitString, OctetString};
use x509_cert::der::oid::ObjectIdentifier;
use x509_cert::der::{Decode, Encode};
use x509_cert::ext::Extension;
use x509_cert::name::Name;
use x509_cert::serial_number::SerialNumber;
use x509_cert::spki::{AlgorithmIdentifierOwned, SubjectPublicKeyInfoOwned};
use x509_cert::time::Validity;
use x509_cert::Certificate;

pub const SCT_TIMESTAMP: u64 = 1_700_000_000_000;

const SCT_LIST_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.4.2");
const POISON_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.3.6.1.4.1.11129.2.4.3");
const BASIC_CONSTRAINTS_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.19");
const SUBJECT_KEY_ID_OID: ObjectIdentifier = ObjectIdentifier::new_unwrap("2.5.29.14");
const ECDSA_WITH_SHA256: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.10045.4.3.2");

static SERIAL: AtomicU64 = AtomicU64::new(1);

pub struct KeyPair {
    pub key: PKey<Private>,
    /// DER SubjectPublicKeyInfo
    pub spki: Vec<u8>,
}

impl KeyPair {
    pub fn ec() -> Self {
        let group = EcGroup::from_curve_name(Nid::X9_62_PRIME256V1).unwrap();
        let key = PKey::from_ec_key(EcKey::generate(&group).unwrap()).unwrap();
        let spki = key.public_key_to_der().unwrap();
        Self { key, spki }
    }

    pub fn rsa() -> Self {
        let key = PKey::from_rsa(Rsa::generate(2048).unwrap()).unwrap();
        let spki = key.public_key_to_der().unwrap();
        Self { key, spki }
    }

    /// SHA-256 signature (PKCS#1 v1.5 for RSA, DER ECDSA for EC).
    pub fn sign(&self, data: &[u8]) -> Vec<u8> {
        let mut signer = Signer::new(MessageDigest::sha256(), &self.key).unwrap();
        signer.update(data).unwrap();
        signer.sign_to_vec().unwrap()
    }
}

/// A CT log under test control.
pub struct TestLog {
    pub keys: KeyPair,
    pub description: String,
    /// TLS SignatureAlgorithm byte (1 = RSA, 3 = ECDSA)
    pub signature_algorithm: u8,
}

impl TestLog {
    pub fn ecdsa(description: &str) -> Self {
        Self {
            keys: KeyPair::ec(),
            description: description.to_string(),
            signature_algorithm: 3,
        }
    }

    pub fn rsa(description: &str) -> Self {
        Self {
            keys: KeyPair::rsa(),
            description: description.to_string(),
            signature_algorithm: 1,
        }
    }

    pub fn id(&self) -> [u8; 32] {
        boring::sha::sha256(&self.keys.spki)
    }

    /// TLS-encoded SCT over `precert_entry`.
    pub fn sign_sct(&self, timestamp: u64, precert_entry: &[u8]) -> Vec<u8> {
        let mut signed = vec![0u8, 0u8];
        signed.extend_from_slice(&timestamp.to_be_bytes());
        signed.extend_from_slice(&[0, 1]);
        signed.extend_from_slice(precert_entry);
        signed.extend_from_slice(&[0, 0]);
        let signature = self.keys.sign(&signed);

        let mut sct = vec![0u8];
        sct.extend_from_slice(&self.id());
        sct.extend_from_slice(&timestamp.to_be_bytes());
        sct.extend_from_slice(&[0, 0]);
        sct.extend_from_slice(&[4, self.signature_algorithm]);
        sct.extend_from_slice(&(signature.len() as u16).to_be_bytes());
        sct.extend_from_slice(&signature);
        sct
    }
}

/// Key that signs every test log list.
pub fn list_signer() -> &'static KeyPair {
    static SIGNER: OnceLock<KeyPair> = OnceLock::new();
    SIGNER.get_or_init(KeyPair::rsa)
}

pub struct SignedLogList {
    pub list: Vec<u8>,
    pub signature: Vec<u8>,
}

fn log_entry(description: &str, spki: &[u8], id: &[u8; 32]) -> serde_json::Value {
    let slug = description.replace(' ', "-").to_lowercase();
    serde_json::json!({
        "description": description,
        "log_id": STANDARD.encode(id),
        "key": STANDARD.encode(spki),
        "url": format!("https://{slug}.example.com/"),
        "mmd": 86400,
        "state": { "usable": { "timestamp": "2024-01-01T00:00:00Z" } },
        "temporal_interval": {
            "start_inclusive": "2024-01-01T00:00:00Z",
            "end_exclusive": "2030-01-01T00:00:00Z"
        }
    })
}

fn log_list_document(entries: Vec<serde_json::Value>) -> Vec<u8> {
    let document = serde_json::json!({
        "version": "1.0",
        "log_list_timestamp": "2025-01-01T00:00:00Z",
        "operators": [{
            "name": "Test Operator",
            "email": ["ct@example.com"],
            "logs": entries
        }]
    });
    serde_json::to_vec(&document).unwrap()
}

pub fn log_list_json_with_ids(logs: &[(&TestLog, [u8; 32])]) -> Vec<u8> {
    let entries = logs
        .iter()
        .map(|(log, id)| log_entry(&log.description, &log.keys.spki, id))
        .collect();
    log_list_document(entries)
}

/// Log list over raw SPKIs, for logs whose private key is not ours.
pub fn log_list_json_for_keys(logs: &[(&str, &[u8])]) -> Vec<u8> {
    let entries = logs
        .iter()
        .map(|(description, spki)| log_entry(description, spki, &boring::sha::sha256(spki)))
        .collect();
    log_list_document(entries)
}

pub fn log_list_json(logs: &[&TestLog]) -> Vec<u8> {
    let with_ids: Vec<(&TestLog, [u8; 32])> = logs.iter().map(|log| (*log, log.id())).collect();
    log_list_json_with_ids(&with_ids)
}

pub fn sign_log_list(list: Vec<u8>) -> SignedLogList {
    let signature = list_signer().sign(&list);
    SignedLogList { list, signature }
}

pub fn signed_log_list(logs: &[&TestLog]) -> SignedLogList {
    sign_log_list(log_list_json(logs))
}

/// Self-signed CA that issues test leaves.
pub struct Issuer {
    pub keys: KeyPair,
    pub der: Vec<u8>,
}

impl Issuer {
    pub fn new() -> Self {
        let keys = KeyPair::ec();
        let name = Name::from_str("CN=Test CA,O=verifyct").unwrap();
        let tbs = TbsCertificate {
            version: Version::V3,
            serial_number: next_serial(),
            signature: ecdsa_sha256(),
            issuer: name.clone(),
            validity: Validity::from_now(Duration::from_secs(365 * 86400)).unwrap(),
            subject: name,
            subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(&keys.spki).unwrap(),
            issuer_unique_id: None,
            subject_unique_id: None,
            extensions: Some(vec![Extension {
                extn_id: BASIC_CONSTRAINTS_OID,
                critical: true,
                extn_value: OctetString::new(vec![0x30, 0x03, 0x01, 0x01, 0xFF]).unwrap(),
            }]),
        };
        let der = sign_certificate(tbs, &keys);
        Self { keys, der }
    }
}

fn next_serial() -> SerialNumber {
    let bytes = SERIAL.fetch_add(1, Ordering::Relaxed).to_be_bytes();
    let start = bytes.iter().position(|b| *b != 0).unwrap_or(7);
    SerialNumber::new(&bytes[start..]).unwrap()
}

fn ecdsa_sha256() -> AlgorithmIdentifierOwned {
    AlgorithmIdentifierOwned {
        oid: ECDSA_WITH_SHA256,
        parameters: None,
    }
}

pub fn basic_constraints() -> Extension {
    Extension {
        extn_id: BASIC_CONSTRAINTS_OID,
        critical: true,
        extn_value: OctetString::new(vec![0x30, 0x00]).unwrap(),
    }
}

pub fn subject_key_identifier() -> Extension {
    let mut value = vec![0x04, 0x04];
    value.extend_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF]);
    Extension {
        extn_id: SUBJECT_KEY_ID_OID,
        critical: false,
        extn_value: OctetString::new(value).unwrap(),
    }
}

pub fn poison_extension() -> Extension {
    Extension {
        extn_id: POISON_OID,
        critical: true,
        extn_value: OctetString::new(vec![0x05, 0x00]).unwrap(),
    }
}

/// SCT list extension; the extension value is an OCTET STRING wrapping the TLS list.
pub fn sct_list_extension(tls_list: &[u8]) -> Extension {
    let inner = OctetString::new(tls_list.to_vec()).unwrap().to_der().unwrap();
    Extension {
        extn_id: SCT_LIST_OID,
        critical: false,
        extn_value: OctetString::new(inner).unwrap(),
    }
}

pub fn encode_sct_list(scts: &[Vec<u8>]) -> Vec<u8> {
    let mut body = Vec::new();
    for sct in scts {
        body.extend_from_slice(&(sct.len() as u16).to_be_bytes());
        body.extend_from_slice(sct);
    }
    let mut out = (body.len() as u16).to_be_bytes().to_vec();
    out.extend(body);
    out
}

/// Leaf TBS issued by `issuer` with the given extensions, in order.
pub fn leaf_tbs(issuer: &Issuer, extensions: Vec<Extension>) -> TbsCertificate {
    let issuer_cert = Certificate::from_der(&issuer.der).unwrap();
    let serial = next_serial();
    let cn = format!("CN=leaf-{}.example.com", hex::encode(serial.as_bytes()));
    let subject = Name::from_str(&cn).unwrap();
    let leaf_key = KeyPair::ec();
    TbsCertificate {
        version: Version::V3,
        serial_number: serial,
        signature: ecdsa_sha256(),
        issuer: issuer_cert.tbs_certificate.subject,
        validity: Validity::from_now(Duration::from_secs(90 * 86400)).unwrap(),
        subject,
        subject_public_key_info: SubjectPublicKeyInfoOwned::from_der(&leaf_key.spki).unwrap(),
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: (!extensions.is_empty()).then_some(extensions),
    }
}

pub fn sign_certificate(tbs: TbsCertificate, signer: &KeyPair) -> Vec<u8> {
    let signature = signer.sign(&tbs.to_der().unwrap());
    Certificate {
        tbs_certificate: tbs,
        signature_algorithm: ecdsa_sha256(),
        signature: BitString::from_bytes(&signature).unwrap(),
    }
    .to_der()
    .unwrap()
}

/// `PreCert` bytes computed straight from the pre-SCT TBS.
pub fn precert_entry(issuer: &Issuer, tbs_der: &[u8]) -> Vec<u8> {
    let mut out = boring::sha::sha256(&issuer.keys.spki).to_vec();
    out.extend_from_slice(&(tbs_der.len() as u32).to_be_bytes()[1..]);
    out.extend_from_slice(tbs_der);
    out
}

pub enum SctSource<'a> {
    /// Correctly signed by this log
    Valid(&'a TestLog),
    /// Signed by this log, then one signature byte flipped
    Corrupted(&'a TestLog),
    /// Correctly signed by a log that no catalog knows
    Unknown,
}

pub struct LeafFixture {
    pub der: Vec<u8>,
    /// Expected `PreCert` signing input
    pub precert_entry: Vec<u8>,
}

/// Final certificate with an embedded SCT list, one SCT per source.
pub fn leaf_with_scts(issuer: &Issuer, sources: &[SctSource<'_>]) -> LeafFixture {
    let mut tbs = leaf_tbs(issuer, vec![basic_constraints(), subject_key_identifier()]);
    let entry = precert_entry(issuer, &tbs.to_der().unwrap());

    let stranger = TestLog::ecdsa("Unknown Log");
    let scts: Vec<Vec<u8>> = sources
        .iter()
        .map(|source| match source {
            SctSource::Valid(log) => log.sign_sct(SCT_TIMESTAMP, &entry),
            SctSource::Corrupted(log) => {
                let mut sct = log.sign_sct(SCT_TIMESTAMP, &entry);
                let last = sct.len() - 1;
                sct[last] ^= 0x01;
                sct
            }
            SctSource::Unknown => stranger.sign_sct(SCT_TIMESTAMP, &entry),
        })
        .collect();

    if let Some(exts) = tbs.extensions.as_mut() {
        exts.push(sct_list_extension(&encode_sct_list(&scts)));
    }
    LeafFixture {
        der: sign_certificate(tbs, &issuer.keys),
        precert_entry: entry,
    }
}

/// Precertificate carrying the poison extension.
pub fn poisoned_precert(issuer: &Issuer) -> LeafFixture {
    let base = leaf_tbs(issuer, vec![basic_constraints(), subject_key_identifier()]);
    let entry = precert_entry(issuer, &base.to_der().unwrap());

    let mut poisoned = base;
    if let Some(exts) = poisoned.extensions.as_mut() {
        exts.insert(1, poison_extension());
    }
    LeafFixture {
        der: sign_certificate(poisoned, &issuer.keys),
        precert_entry: entry,
    }
}

/// Leaf without any CT extension.
pub fn plain_leaf(issuer: &Issuer) -> Vec<u8> {
    sign_certificate(leaf_tbs(issuer, vec![basic_constraints()]), &issuer.keys)
}

/// Strip PEM armor and decode the body without re-encoding it.
pub fn pem_to_der(pem: &str) -> Vec<u8> {
    let body: String = pem
        .lines()
        .filter(|line| !line.starts_with("-----"))
        .collect();
    STANDARD.decode(body).unwrap()
}

/// Certificate issued by the public sigstore CA, with one SCT from its CT log.
pub struct RealChain {
    pub leaf: Vec<u8>,
    pub issuer: Vec<u8>,
    /// DER SubjectPublicKeyInfo of the log that signed the SCT
    pub log_key: Vec<u8>,
    /// `PreCert` bytes dumped by an independent X.509 implementation
    pub precert_entry: Vec<u8>,
}

pub const REAL_SCT_TIMESTAMP: u64 = 1_702_446_655_020;

pub fn sigstore_chain() -> RealChain {
    let log_key = PKey::public_key_from_pem(include_bytes!("../data/sigstore-ctfe.pem")).unwrap();
    let dump: String = include_str!("../data/sigstore-precert-entry.hex")
        .split_whitespace()
        .collect();

    RealChain {
        leaf: pem_to_der(include_str!("../data/sigstore-leaf.pem")),
        issuer: pem_to_der(include_str!("../data/sigstore-intermediate.pem")),
        log_key: log_key.public_key_to_der().unwrap(),
        precert_entry: hex::decode(dump).unwrap(),
    }
}
