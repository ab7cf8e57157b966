use std::fs;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::{debug, warn};
use x509_parser::error::PEMError;
use x509_parser::pem::Pem;

use crate::certificate::{encode_pem, Certificate, CertificateError};

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid certificate in trust store: {0}")]
    Certificate(#[from] CertificateError),
    #[error("Rejected by the trust store: {0}")]
    Rejected(String),
}

/// Emitted after a certificate has been added to or removed from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreEvent {
    Added(Certificate),
    Removed(Certificate),
}

/// The authoritative list of trusted certificates.
///
/// `add` returns `Ok(false)` when the certificate is already trusted and
/// `remove` returns `Ok(false)` when it wasn't.
pub trait TrustStoreRepo: std::fmt::Debug {
    fn certificates(&self) -> Vec<Certificate>;
    fn contains(&self, certificate: &Certificate) -> bool {
        self.certificates().contains(certificate)
    }
    fn add(&mut self, certificate: &Certificate) -> Result<bool, StoreError>;
    fn remove(&mut self, certificate: &Certificate) -> Result<bool, StoreError>;
    fn subscribe(&mut self) -> flume::Receiver<StoreEvent>;
}

#[derive(Debug, Default)]
struct Listeners(Vec<flume::Sender<StoreEvent>>);

impl Listeners {
    fn subscribe(&mut self) -> flume::Receiver<StoreEvent> {
        let (sender, receiver) = flume::unbounded();
        self.0.push(sender);
        receiver
    }

    fn notify(&mut self, event: StoreEvent) {
        // Receivers that were dropped are forgotten
        self.0.retain(|sender| sender.send(event.clone()).is_ok());
    }
}

#[derive(Debug, Default)]
pub struct TrustStoreMap {
    certificates: Vec<Certificate>,
    listeners: Listeners,
}

impl TrustStoreMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_certificates(certificates: impl IntoIterator<Item = Certificate>) -> Self {
        let mut this = Self::new();
        for certificate in certificates {
            if !this.certificates.contains(&certificate) {
                this.certificates.push(certificate);
            }
        }
        this
    }
}

impl TrustStoreRepo for TrustStoreMap {
    fn certificates(&self) -> Vec<Certificate> {
        self.certificates.clone()
    }

    fn contains(&self, certificate: &Certificate) -> bool {
        self.certificates.contains(certificate)
    }

    fn add(&mut self, certificate: &Certificate) -> Result<bool, StoreError> {
        if self.contains(certificate) {
            return Ok(false);
        }
        self.certificates.push(certificate.clone());
        self.listeners.notify(StoreEvent::Added(certificate.clone()));
        Ok(true)
    }

    fn remove(&mut self, certificate: &Certificate) -> Result<bool, StoreError> {
        match self.certificates.iter().position(|c| c == certificate) {
            Some(i) => {
                let removed = self.certificates.remove(i);
                self.listeners.notify(StoreEvent::Removed(removed));
                Ok(true)
            }
            None => Ok(false),
        }
    }

    fn subscribe(&mut self) -> flume::Receiver<StoreEvent> {
        self.listeners.subscribe()
    }
}

/// A trust store kept as a PEM bundle on disk.
///
/// Additions are appended to the bundle, removals rewrite it. The file is
/// only opened for the duration of a single mutation. Blocks other than
/// certificates are kept as they are and written back on rewrites.
#[derive(Debug)]
pub struct TrustStoreFile {
    path: PathBuf,
    store: TrustStoreMap,
    foreign: Vec<String>,
}

impl TrustStoreFile {
    /// Loads the bundle at `path`. A missing file is an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let path = path.into();
        let (store, foreign) = if path.exists() {
            let (certificates, foreign) = Self::read_bundle(&path)?;
            (TrustStoreMap::from_certificates(certificates), foreign)
        } else {
            (TrustStoreMap::new(), vec![])
        };
        debug!(
            "Loaded {} certificates from {:?}",
            store.certificates.len(),
            path
        );

        Ok(Self {
            path,
            store,
            foreign,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_bundle(path: &Path) -> Result<(Vec<Certificate>, Vec<String>), StoreError> {
        let content = fs::read(path)?;
        let mut certificates = vec![];
        let mut foreign = vec![];
        for pem in Pem::iter_from_buffer(&content) {
            let pem = match pem {
                Ok(pem) => pem,
                // Only trailing text after the last block
                Err(PEMError::MissingHeader) => break,
                Err(e) => return Err(CertificateError::Malformed(e.to_string()).into()),
            };
            if pem.label != "CERTIFICATE" {
                warn!("Skipping {} block in {:?}", pem.label, path);
                foreign.push(encode_pem(&pem.label, &pem.contents));
                continue;
            }
            certificates.push(Certificate::from_der(&pem.contents)?);
        }
        Ok((certificates, foreign))
    }

    /// Whether the bundle is missing, empty or already ends with a newline.
    fn ends_with_newline(&self) -> Result<bool, StoreError> {
        let mut file = match fs::File::open(&self.path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(true),
            Err(e) => return Err(e.into()),
        };
        if file.metadata()?.len() == 0 {
            return Ok(true);
        }
        file.seek(SeekFrom::End(-1))?;
        let mut last = [0u8; 1];
        file.read_exact(&mut last)?;
        Ok(last[0] == b'\n')
    }

    fn ensure_parent(&self) -> Result<(), StoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        Ok(())
    }
}

impl TrustStoreRepo for TrustStoreFile {
    fn certificates(&self) -> Vec<Certificate> {
        self.store.certificates()
    }

    fn contains(&self, certificate: &Certificate) -> bool {
        self.store.contains(certificate)
    }

    fn add(&mut self, certificate: &Certificate) -> Result<bool, StoreError> {
        if self.store.contains(certificate) {
            return Ok(false);
        }
        self.ensure_parent()?;
        let mut block = certificate.to_pem();
        if !self.ends_with_newline()? {
            block.insert(0, '\n');
        }
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        file.write_all(block.as_bytes())?;
        debug!("Appended {} to {:?}", certificate, self.path);

        self.store.add(certificate)
    }

    fn remove(&mut self, certificate: &Certificate) -> Result<bool, StoreError> {
        if !self.store.contains(certificate) {
            return Ok(false);
        }
        let bundle: String = self
            .foreign
            .iter()
            .cloned()
            .chain(
                self.store
                    .certificates
                    .iter()
                    .filter(|c| *c != certificate)
                    .map(Certificate::to_pem),
            )
            .collect();
        self.ensure_parent()?;
        fs::write(&self.path, bundle)?;
        debug!("Removed {} from {:?}", certificate, self.path);

        self.store.remove(certificate)
    }

    fn subscribe(&mut self) -> flume::Receiver<StoreEvent> {
        self.store.subscribe()
    }
}
