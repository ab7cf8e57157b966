//! Certificates and stores for tests.

use std::collections::HashSet;

use rcgen::{CertificateParams, DnType, KeyPair};

use crate::{Certificate, StoreError, StoreEvent, TrustStoreMap, TrustStoreRepo};

pub fn generate(common_name: &str) -> rcgen::Certificate {
    generate_with(common_name, |_| {})
}

fn generate_with(common_name: &str, f: impl FnOnce(&mut CertificateParams)) -> rcgen::Certificate {
    let key = KeyPair::generate().unwrap();
    let mut params = CertificateParams::new(vec!["localhost".to_string()]).unwrap();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    f(&mut params);
    params.self_signed(&key).unwrap()
}

pub fn certificate(common_name: &str) -> Certificate {
    Certificate::from_der(generate(common_name).der().as_ref()).unwrap()
}

pub fn expired(common_name: &str) -> Certificate {
    let generated = generate_with(common_name, |params| {
        params.not_before = rcgen::date_time_ymd(2000, 1, 1);
        params.not_after = rcgen::date_time_ymd(2001, 1, 1);
    });
    Certificate::from_der(generated.der().as_ref()).unwrap()
}

/// A store that refuses some certificates and counts mutations.
#[derive(Debug, Default)]
pub struct FlakyStore {
    pub inner: TrustStoreMap,
    pub reject_add: HashSet<Certificate>,
    pub reject_remove: HashSet<Certificate>,
    pub calls: usize,
}

impl FlakyStore {
    pub fn with(certificates: &[Certificate]) -> Self {
        Self {
            inner: TrustStoreMap::from_certificates(certificates.iter().cloned()),
            ..Default::default()
        }
    }
}

impl TrustStoreRepo for FlakyStore {
    fn certificates(&self) -> Vec<Certificate> {
        self.inner.certificates()
    }

    fn add(&mut self, certificate: &Certificate) -> Result<bool, StoreError> {
        self.calls += 1;
        if self.reject_add.contains(certificate) {
            return Err(StoreError::Rejected("add refused".into()));
        }
        self.inner.add(certificate)
    }

    fn remove(&mut self, certificate: &Certificate) -> Result<bool, StoreError> {
        self.calls += 1;
        if self.reject_remove.contains(certificate) {
            return Err(StoreError::Rejected("remove refused".into()));
        }
        self.inner.remove(certificate)
    }

    fn subscribe(&mut self) -> flume::Receiver<StoreEvent> {
        self.inner.subscribe()
    }
}
