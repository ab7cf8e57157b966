use std::fmt;
use std::fs;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use base64::Engine;
use log::debug;
use sha2::{Digest, Sha256};
use x509_parser::error::PEMError;
use x509_parser::pem::Pem;

/// Extensions picked up when scanning directories for certificate files.
pub const CERTIFICATE_EXTENSIONS: &[&str] = &["crt", "cer", "pem"];

/// A single DER certificate is never expected to be larger than this.
pub const MAX_CERT_SIZE: usize = 16 * 1024;

const PEM_LABEL: &str = "CERTIFICATE";

#[derive(Debug, thiserror::Error)]
pub enum CertificateError {
    #[error("Can't read {path:?}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Malformed X509 server certificate: {0}")]
    Malformed(String),
    #[error("Certificate too large: {0} bytes (max {MAX_CERT_SIZE})")]
    TooLarge(usize),
}

/// An immutable X.509 certificate.
///
/// Two certificates are the same certificate iff their DER encodings are equal,
/// everything else is derived from the encoding when the certificate is loaded.
#[derive(Clone)]
pub struct Certificate {
    der: Vec<u8>,
    fingerprint: String,
    subject: String,
    common_name: Option<String>,
    not_before: i64,
    not_after: i64,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self, CertificateError> {
        if der.len() > MAX_CERT_SIZE {
            return Err(CertificateError::TooLarge(der.len()));
        }

        let (rest, cert) = x509_parser::parse_x509_certificate(der)
            .map_err(|e| CertificateError::Malformed(format!("{:?}", e)))?;
        // Anything after the certificate itself is not part of its identity
        let der = &der[..der.len() - rest.len()];

        let subject = cert.subject().to_string();
        let common_name = cert
            .subject()
            .iter_common_name()
            .next()
            .and_then(|cn| cn.as_str().ok())
            .map(String::from);
        let validity = cert.validity();

        Ok(Self {
            der: der.to_vec(),
            fingerprint: sha256_hex(der),
            subject,
            common_name,
            not_before: validity.not_before.timestamp(),
            not_after: validity.not_after.timestamp(),
        })
    }

    /// Parses the first `CERTIFICATE` block of `input`. Other blocks, such as
    /// a private key stored next to the certificate, are skipped.
    pub fn from_pem(input: &[u8]) -> Result<Self, CertificateError> {
        for pem in Pem::iter_from_buffer(input) {
            let pem = match pem {
                Ok(pem) => pem,
                Err(PEMError::MissingHeader) => break,
                Err(e) => return Err(CertificateError::Malformed(e.to_string())),
            };
            if pem.label == PEM_LABEL {
                return Self::from_der(&pem.contents);
            }
            debug!("Skipping {} block", pem.label);
        }
        Err(CertificateError::Malformed(format!(
            "no {} block found",
            PEM_LABEL
        )))
    }

    /// Accepts both PEM and raw DER input.
    pub fn from_bytes(input: &[u8]) -> Result<Self, CertificateError> {
        if input.windows(11).any(|w| w == b"-----BEGIN ") {
            Self::from_pem(input)
        } else {
            Self::from_der(input)
        }
    }

    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// SHA-256 of the DER encoding, lowercase hex.
    pub fn fingerprint(&self) -> &str {
        &self.fingerprint
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    /// The subject common name, or the whole subject when it has none.
    pub fn common_name(&self) -> &str {
        self.common_name.as_deref().unwrap_or(&self.subject)
    }

    pub fn not_before(&self) -> i64 {
        self.not_before
    }

    pub fn not_after(&self) -> i64 {
        self.not_after
    }

    pub fn is_valid(&self) -> bool {
        self.is_valid_at(unix_now())
    }

    pub fn is_valid_at(&self, timestamp: i64) -> bool {
        self.not_before <= timestamp && timestamp <= self.not_after
    }

    pub fn to_pem(&self) -> String {
        encode_pem(PEM_LABEL, &self.der)
    }
}

impl PartialEq for Certificate {
    fn eq(&self, other: &Self) -> bool {
        self.der == other.der
    }
}

impl Eq for Certificate {}

impl Hash for Certificate {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.der.hash(state);
    }
}

impl fmt::Debug for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Certificate")
            .field("subject", &self.subject)
            .field("fingerprint", &self.fingerprint)
            .finish()
    }
}

impl fmt::Display for Certificate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.common_name(), &self.fingerprint[..16])
    }
}

/// Reads a `.crt`, `.cer` or `.pem` file, PEM or DER encoded.
pub fn load_certificate_from_file(path: impl AsRef<Path>) -> Result<Certificate, CertificateError> {
    let path = path.as_ref();
    let bytes = fs::read(path).map_err(|source| CertificateError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Certificate::from_bytes(&bytes)
}

pub fn is_certificate_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| {
            CERTIFICATE_EXTENSIONS
                .iter()
                .any(|known| ext.eq_ignore_ascii_case(known))
        })
        .unwrap_or(false)
}

/// Base64 body wrapped at 64 columns between `BEGIN`/`END` lines for `label`.
pub(crate) fn encode_pem(label: &str, contents: &[u8]) -> String {
    let encoded = base64::engine::general_purpose::STANDARD.encode(contents);
    let mut pem = String::with_capacity(encoded.len() + encoded.len() / 64 + 2 * label.len() + 40);
    pem.push_str(&format!("-----BEGIN {}-----\n", label));
    for line in encoded.as_bytes().chunks(64) {
        pem.push_str(&String::from_utf8_lossy(line));
        pem.push('\n');
    }
    pem.push_str(&format!("-----END {}-----\n", label));
    pem
}

fn sha256_hex(bytes: &[u8]) -> String {
    Sha256::digest(bytes)
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

fn unix_now() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing;

    #[test]
    fn parses_pem_and_der() {
        let generated = testing::generate("Alpha");
        let from_pem = Certificate::from_pem(generated.pem().as_bytes()).unwrap();
        let from_der = Certificate::from_der(generated.der().as_ref()).unwrap();

        assert_eq!(from_pem, from_der);
        assert_eq!(from_pem.common_name(), "Alpha");
        assert_eq!(from_pem.subject(), "CN=Alpha");
        assert_eq!(from_pem.fingerprint().len(), 64);
    }

    #[test]
    fn identity_is_the_encoding() {
        let a = testing::certificate("Same name");
        let b = testing::certificate("Same name");

        assert_ne!(a, b);
        assert_eq!(a, a.clone());
    }

    #[test]
    fn pem_output_parses_back() {
        let cert = testing::certificate("Beta");
        let pem = cert.to_pem();

        assert!(pem.starts_with("-----BEGIN CERTIFICATE-----\n"));
        assert!(pem.lines().all(|line| line.len() <= 64));
        assert_eq!(Certificate::from_pem(pem.as_bytes()).unwrap(), cert);
    }

    #[test]
    fn validity() {
        let current = testing::certificate("Current");
        let expired = testing::expired("Expired");

        assert!(current.is_valid());
        assert!(!expired.is_valid());
        assert!(expired.is_valid_at(expired.not_before()));
        assert!(!expired.is_valid_at(expired.not_after() + 1));
    }

    #[test]
    fn garbage_is_malformed() {
        let res = Certificate::from_bytes(b"not a certificate");
        assert!(matches!(res, Err(CertificateError::Malformed(_))));

        let res = Certificate::from_bytes(
            b"-----BEGIN CERTIFICATE-----\n@@@@\n-----END CERTIFICATE-----\n",
        );
        assert!(matches!(res, Err(CertificateError::Malformed(_))));
    }

    #[test]
    fn pem_without_certificate_is_malformed() {
        let key = rcgen::KeyPair::generate().unwrap();
        let res = Certificate::from_bytes(key.serialize_pem().as_bytes());
        assert!(matches!(res, Err(CertificateError::Malformed(_))));
    }

    #[test]
    fn key_before_certificate_is_skipped() {
        let key = rcgen::KeyPair::generate().unwrap();
        let generated = testing::generate("Keyed");
        let bundle = format!("{}{}", key.serialize_pem(), generated.pem());

        let cert = Certificate::from_bytes(bundle.as_bytes()).unwrap();
        assert_eq!(cert.common_name(), "Keyed");
        assert_eq!(cert.der(), generated.der().as_ref());
    }

    #[test]
    fn too_large() {
        let res = Certificate::from_der(&vec![0u8; MAX_CERT_SIZE + 1]);
        assert!(matches!(res, Err(CertificateError::TooLarge(_))));
    }

    #[test]
    fn load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let generated = testing::generate("Gamma");
        let pem_path = dir.path().join("gamma.pem");
        let der_path = dir.path().join("gamma.cer");
        fs::write(&pem_path, generated.pem()).unwrap();
        fs::write(&der_path, generated.der()).unwrap();

        let from_pem = load_certificate_from_file(&pem_path).unwrap();
        let from_der = load_certificate_from_file(&der_path).unwrap();
        assert_eq!(from_pem, from_der);

        let missing = load_certificate_from_file(dir.path().join("missing.crt"));
        assert!(matches!(missing, Err(CertificateError::Io { .. })));
    }

    #[test]
    fn certificate_extensions() {
        assert!(is_certificate_file(Path::new("a/server.crt")));
        assert!(is_certificate_file(Path::new("server.CER")));
        assert!(is_certificate_file(Path::new("server.pem")));
        assert!(!is_certificate_file(Path::new("server.key")));
        assert!(!is_certificate_file(Path::new("pem")));
    }
}
