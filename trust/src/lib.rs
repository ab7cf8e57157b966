pub mod certificate;
pub mod reconcile;
pub mod trust_store;

#[cfg(test)]
mod testing;

pub use certificate::{
    is_certificate_file, load_certificate_from_file, Certificate, CertificateError,
    CERTIFICATE_EXTENSIONS,
};
pub use reconcile::{apply, diff, is_modified, ConfigFlags, Diff, ReconcileError};
pub use trust_store::{StoreError, StoreEvent, TrustStoreFile, TrustStoreMap, TrustStoreRepo};
