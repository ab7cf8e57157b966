use std::fs;
use std::path::{Path, PathBuf};

use trust::Certificate;

pub fn generate(common_name: &str) -> rcgen::Certificate {
    let key = rcgen::KeyPair::generate().unwrap();
    let mut params = rcgen::CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    params
        .distinguished_name
        .push(rcgen::DnType::CommonName, common_name);
    params.self_signed(&key).unwrap()
}

pub fn certificate(common_name: &str) -> Certificate {
    Certificate::from_der(generate(common_name).der().as_ref()).unwrap()
}

/// Writes a fresh PEM certificate to `dir/file_name`.
pub fn write_pem(dir: &Path, file_name: &str, common_name: &str) -> PathBuf {
    let path = dir.join(file_name);
    fs::write(&path, generate(common_name).pem()).unwrap();
    path
}
