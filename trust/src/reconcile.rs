//! Reconciliation of an edited certificate list against a trust store.
//!
//! [`apply`] is best effort: changes are committed one by one and the first
//! refused change aborts the rest, leaving what was already done in place.

use std::collections::HashSet;

use log::{debug, info};
use serde::{Deserialize, Serialize};

use crate::certificate::Certificate;
use crate::trust_store::{StoreError, TrustStoreRepo};

/// Check toggles persisted next to the trust store. Nothing enforces them yet.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConfigFlags {
    #[serde(default)]
    pub check_hostname: bool,
    #[serde(default)]
    pub check_validity: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Diff {
    pub added: Vec<Certificate>,
    pub removed: Vec<Certificate>,
}

impl Diff {
    pub fn is_empty(&self) -> bool {
        self.added.is_empty() && self.removed.is_empty()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ReconcileError {
    #[error("Cannot add certificate {}", .certificate.common_name())]
    AddFailed {
        certificate: Certificate,
        #[source]
        source: StoreError,
    },
    #[error("Cannot remove certificate {}", .certificate.common_name())]
    RemoveFailed {
        certificate: Certificate,
        #[source]
        source: StoreError,
    },
}

impl ReconcileError {
    pub fn certificate(&self) -> &Certificate {
        match self {
            ReconcileError::AddFailed { certificate, .. } => certificate,
            ReconcileError::RemoveFailed { certificate, .. } => certificate,
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            ReconcileError::AddFailed { .. } => "Cannot Add Certificate",
            ReconcileError::RemoveFailed { .. } => "Cannot Remove Certificate",
        }
    }
}

/// Certificates to add to and remove from `persisted` so that it holds the
/// same set as `displayed`. Each list keeps the order of its source.
pub fn diff(displayed: &[Certificate], persisted: &[Certificate]) -> Diff {
    Diff {
        added: difference(displayed, persisted),
        removed: difference(persisted, displayed),
    }
}

fn difference(from: &[Certificate], other: &[Certificate]) -> Vec<Certificate> {
    let other: HashSet<&Certificate> = other.iter().collect();
    let mut seen = HashSet::new();
    from.iter()
        .filter(|c| !other.contains(*c) && seen.insert(*c))
        .cloned()
        .collect()
}

pub fn is_modified(
    displayed: &[Certificate],
    persisted: &[Certificate],
    flags: &ConfigFlags,
    pending: &ConfigFlags,
) -> bool {
    flags != pending || as_set(displayed) != as_set(persisted)
}

fn as_set(certificates: &[Certificate]) -> HashSet<&Certificate> {
    certificates.iter().collect()
}

/// Makes `repo` hold exactly `displayed`, then stores `pending` into `flags`.
///
/// Additions run before removals. There is no rollback: on error, the changes
/// made before the failing one stay committed and `flags` is left untouched.
pub fn apply<R: TrustStoreRepo + ?Sized>(
    repo: &mut R,
    displayed: &[Certificate],
    flags: &mut ConfigFlags,
    pending: ConfigFlags,
) -> Result<Diff, ReconcileError> {
    let existing = repo.certificates();
    let diff = diff(displayed, &existing);
    debug!(
        "Reconciling trust store: {} to add, {} to remove",
        diff.added.len(),
        diff.removed.len()
    );

    for certificate in &diff.added {
        repo.add(certificate)
            .map_err(|source| ReconcileError::AddFailed {
                certificate: certificate.clone(),
                source,
            })?;
    }

    for certificate in &diff.removed {
        repo.remove(certificate)
            .map_err(|source| ReconcileError::RemoveFailed {
                certificate: certificate.clone(),
                source,
            })?;
    }

    *flags = pending;
    if !diff.is_empty() {
        info!(
            "Trust store updated: {} added, {} removed",
            diff.added.len(),
            diff.removed.len()
        );
    }
    Ok(diff)
}
