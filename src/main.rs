use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::Parser;
use log::{info, warn};
use trust::{Certificate, Diff, TrustStoreFile, TrustStoreRepo};

mod certificate_settings;
mod cli;
mod common;
mod config;
#[cfg(test)]
mod testing;

use certificate_settings::{CertificateSettings, ImportOutcome};
use cli::{Cli, Command};
use config::Config;

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let default_filter = if cli.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let settings_path = cli.config.unwrap_or_else(|| (*common::SETTINGS_PATH).clone());
    let store_path = cli.store.unwrap_or_else(|| (*common::TRUST_STORE_PATH).clone());
    common::create_base_files(&settings_path, &store_path)?;

    let config = Config::load(&settings_path)?;
    let store = TrustStoreFile::open(&store_path)
        .with_context(|| format!("Opening trust store at {:?}", store_path))?;
    let mut settings = CertificateSettings::new(store, config);

    match cli.command {
        Command::List => list(&settings),
        Command::Show { selector } => {
            let found = settings.find(&selector);
            match found.first() {
                Some(&index) if settings.select(index) => show(&settings),
                _ => bail!("No certificate matches {:?}", selector),
            }
        }
        Command::Import { files } => {
            let mut failed = 0;
            for file in &files {
                match settings.import(file) {
                    Ok(ImportOutcome::Added(certificate)) => println!("Imported {}", certificate),
                    Ok(ImportOutcome::Duplicate(certificate)) => {
                        println!("Not imported, certificate already exists: {}", certificate)
                    }
                    Err(e) => {
                        eprintln!("Not imported {:?}: {}", file, e);
                        failed += 1;
                    }
                }
            }
            commit(&mut settings, &settings_path)?;
            if failed > 0 {
                bail!("{} of {} files were not imported", failed, files.len());
            }
            Ok(())
        }
        Command::Remove { selectors } => {
            let mut indices = vec![];
            for selector in &selectors {
                let found = settings.find(selector);
                if found.is_empty() {
                    bail!("No certificate matches {:?}", selector);
                }
                indices.extend(found);
            }
            for certificate in settings.remove_selected(&indices) {
                println!("Removed {}", certificate);
            }
            commit(&mut settings, &settings_path)
        }
        Command::Sync { paths, dry_run } => {
            let mut certificates = vec![];
            for path in &paths {
                certificates.extend(collect_certificates(path)?);
            }
            settings.set_certificates(certificates);

            let diff = trust::diff(settings.certificates(), &settings.store().certificates());
            print_diff(&diff);
            if dry_run {
                return Ok(());
            }
            commit(&mut settings, &settings_path)
        }
        Command::Config {
            check_hostname,
            check_validity,
        } => {
            if let Some(check) = check_hostname {
                settings.set_check_hostname(check);
            }
            if let Some(check) = check_validity {
                settings.set_check_validity(check);
            }
            commit(&mut settings, &settings_path)?;

            let flags = settings.pending_flags();
            println!("check_hostname = {}", flags.check_hostname);
            println!("check_validity = {}", flags.check_validity);
            Ok(())
        }
    }
}

fn list<R: TrustStoreRepo>(settings: &CertificateSettings<R>) -> anyhow::Result<()> {
    println!("{} [{}]", settings.display_name(), settings.id());
    if settings.certificates().is_empty() {
        println!("No certificates");
    }
    for certificate in settings.certificates() {
        let marker = if certificate.is_valid() { ' ' } else { '!' };
        println!(
            "{} {}  {}  expires {}",
            marker,
            certificate.common_name(),
            certificate.fingerprint(),
            format_date(certificate.not_after())
        );
    }
    Ok(())
}

fn show<R: TrustStoreRepo>(settings: &CertificateSettings<R>) -> anyhow::Result<()> {
    let certificate = match settings.selected() {
        Some(certificate) => certificate,
        None => bail!("No certificate selected"),
    };
    println!("{}", CertificateSettings::<R>::card_name(certificate));
    println!("  Common name:  {}", certificate.common_name());
    println!("  SHA-256:      {}", certificate.fingerprint());
    println!("  Valid from:   {}", format_date(certificate.not_before()));
    println!("  Valid until:  {}", format_date(certificate.not_after()));
    if !certificate.is_valid() {
        println!("  Not valid at the current time");
    }
    Ok(())
}

/// Applies pending edits and saves the config when everything went through.
fn commit<R: TrustStoreRepo>(
    settings: &mut CertificateSettings<R>,
    settings_path: &Path,
) -> anyhow::Result<()> {
    if !settings.is_modified() {
        info!("Nothing to apply");
        return Ok(());
    }

    match settings.apply() {
        Ok(diff) => {
            info!(
                "Applied {} additions and {} removals",
                diff.added.len(),
                diff.removed.len()
            );
            settings.config().save(settings_path)
        }
        Err(e) => {
            warn!("Trust store left partially updated");
            let title = e.title();
            Err(e).context(title)
        }
    }
}

/// The certificate in `path`, or every certificate file directly inside it.
fn collect_certificates(path: &Path) -> anyhow::Result<Vec<Certificate>> {
    if !path.is_dir() {
        let certificate = trust::load_certificate_from_file(path)
            .with_context(|| format!("Loading certificate {:?}", path))?;
        return Ok(vec![certificate]);
    }

    let mut files: Vec<PathBuf> = fs::read_dir(path)
        .with_context(|| format!("Reading directory {:?}", path))?
        .filter_map(|entry| entry.ok().map(|entry| entry.path()))
        .filter(|file| file.is_file() && trust::is_certificate_file(file))
        .collect();
    files.sort();

    files
        .iter()
        .map(|file| {
            trust::load_certificate_from_file(file)
                .with_context(|| format!("Loading certificate {:?}", file))
        })
        .collect()
}

fn print_diff(diff: &Diff) {
    if diff.is_empty() {
        println!("Nothing to change");
        return;
    }
    for certificate in &diff.added {
        println!("+ {}", certificate);
    }
    for certificate in &diff.removed {
        println!("- {}", certificate);
    }
}

fn format_date(timestamp: i64) -> String {
    chrono::DateTime::from_timestamp(timestamp, 0)
        .map(|date| date.format("%Y-%m-%d").to_string())
        .unwrap_or_else(|| timestamp.to_string())
}
