use std::path::Path;

use log::{debug, warn};
use trust::{
    Certificate, CertificateError, ConfigFlags, Diff, ReconcileError, StoreEvent, TrustStoreRepo,
};

use crate::config::Config;

pub const ID: &str = "http.certificates";
pub const DISPLAY_NAME: &str = "Server Certificates";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    Added(Certificate),
    /// Already in the list, nothing was changed.
    Duplicate(Certificate),
}

/// Editable view of the trusted server certificates and their check flags.
///
/// Edits only touch the displayed list until [`CertificateSettings::apply`]
/// reconciles it with the store.
#[derive(Debug)]
pub struct CertificateSettings<R: TrustStoreRepo> {
    store: R,
    events: flume::Receiver<StoreEvent>,
    config: Config,
    displayed: Vec<Certificate>,
    selected: Option<usize>,
    pending: ConfigFlags,
}

impl<R: TrustStoreRepo> CertificateSettings<R> {
    pub fn new(mut store: R, config: Config) -> Self {
        let events = store.subscribe();
        let mut this = Self {
            store,
            events,
            config,
            displayed: vec![],
            selected: None,
            pending: config.certificates,
        };
        this.reset();
        this
    }

    pub fn id(&self) -> &'static str {
        ID
    }

    pub fn display_name(&self) -> &'static str {
        DISPLAY_NAME
    }

    /// Throws away every edit and shows the store as it is.
    pub fn reset(&mut self) {
        self.events.drain().for_each(drop);
        self.displayed = self.store.certificates();
        self.selected = self.first_index();
        self.pending = self.config.certificates;
    }

    pub fn certificates(&self) -> &[Certificate] {
        &self.displayed
    }

    pub fn store(&self) -> &R {
        &self.store
    }

    #[cfg(test)]
    pub fn store_mut(&mut self) -> &mut R {
        &mut self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn selected(&self) -> Option<&Certificate> {
        self.selected.and_then(|i| self.displayed.get(i))
    }

    pub fn select(&mut self, index: usize) -> bool {
        if index < self.displayed.len() {
            self.selected = Some(index);
            true
        } else {
            false
        }
    }

    /// Key under which a certificate's details are shown.
    pub fn card_name(certificate: &Certificate) -> &str {
        certificate.subject()
    }

    pub fn import(&mut self, path: impl AsRef<Path>) -> Result<ImportOutcome, CertificateError> {
        let certificate = trust::load_certificate_from_file(path)?;
        if self.displayed.contains(&certificate) {
            warn!("Certificate already exists: {}", certificate);
            return Ok(ImportOutcome::Duplicate(certificate));
        }

        debug!("Imported {}", certificate);
        self.displayed.push(certificate.clone());
        self.selected = Some(self.displayed.len() - 1);
        Ok(ImportOutcome::Added(certificate))
    }

    /// Removes the certificates at `indices` from the list and returns them.
    /// Indices past the end are ignored.
    pub fn remove_selected(&mut self, indices: &[usize]) -> Vec<Certificate> {
        let mut removed: Vec<Certificate> = vec![];
        for certificate in indices.iter().filter_map(|&i| self.displayed.get(i)) {
            if !removed.contains(certificate) {
                removed.push(certificate.clone());
            }
        }
        self.displayed.retain(|c| !removed.contains(c));
        self.selected = self.first_index();
        removed
    }

    /// Replaces the whole list, keeping the first occurrence of duplicates.
    pub fn set_certificates(&mut self, certificates: impl IntoIterator<Item = Certificate>) {
        self.displayed.clear();
        for certificate in certificates {
            if !self.displayed.contains(&certificate) {
                self.displayed.push(certificate);
            }
        }
        self.selected = self.first_index();
    }

    /// Positions of the certificates whose fingerprint starts with `selector`
    /// or whose common name is exactly `selector`.
    pub fn find(&self, selector: &str) -> Vec<usize> {
        let prefix = selector.to_ascii_lowercase();
        self.displayed
            .iter()
            .enumerate()
            .filter(|(_, c)| {
                c.common_name() == selector
                    || (!prefix.is_empty() && c.fingerprint().starts_with(&prefix))
            })
            .map(|(i, _)| i)
            .collect()
    }

    pub fn set_check_hostname(&mut self, check: bool) {
        self.pending.check_hostname = check;
    }

    pub fn set_check_validity(&mut self, check: bool) {
        self.pending.check_validity = check;
    }

    pub fn pending_flags(&self) -> ConfigFlags {
        self.pending
    }

    pub fn is_modified(&self) -> bool {
        trust::is_modified(
            &self.displayed,
            &self.store.certificates(),
            &self.config.certificates,
            &self.pending,
        )
    }

    /// Writes the edits to the store. On success the config holds the pending
    /// flags and should be saved by the caller.
    pub fn apply(&mut self) -> Result<Diff, ReconcileError> {
        let applied = trust::apply(
            &mut self.store,
            &self.displayed,
            &mut self.config.certificates,
            self.pending,
        )?;
        // Our own changes come back as events, they are no-ops here
        self.process_events();
        Ok(applied)
    }

    /// Mirrors changes made to the store by someone else into the list.
    /// Returns how many entries changed.
    pub fn process_events(&mut self) -> usize {
        let mut changed = 0;
        for event in self.events.try_iter() {
            match event {
                StoreEvent::Added(certificate) => {
                    if !self.displayed.contains(&certificate) {
                        self.displayed.push(certificate);
                        changed += 1;
                    }
                }
                StoreEvent::Removed(certificate) => {
                    let before = self.displayed.len();
                    self.displayed.retain(|c| *c != certificate);
                    changed += before - self.displayed.len();
                }
            }
        }
        if self.selected.map_or(true, |i| i >= self.displayed.len()) {
            self.selected = self.first_index();
        }
        changed
    }

    fn first_index(&self) -> Option<usize> {
        if self.displayed.is_empty() {
            None
        } else {
            Some(0)
        }
    }
}
