use std::path::PathBuf;

use clap::{Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "trustconf",
    version,
    about = "Manage the trusted server certificates",
    after_help = "Examples:\n  trustconf list\n  trustconf import ./server.crt\n  trustconf sync ./certs --dry-run\n  trustconf config --check-hostname true"
)]
pub struct Cli {
    /// Trust store bundle (PEM).
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,
    /// Config file.
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
    /// Log every change made to the store.
    #[arg(long, short, global = true)]
    pub verbose: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Show the trusted certificates.
    List,
    /// Show the details of one certificate.
    Show {
        /// Common name or fingerprint prefix.
        selector: String,
    },
    /// Trust the certificates in the given .crt, .cer or .pem files.
    Import {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
    /// Stop trusting certificates, selected by common name or fingerprint prefix.
    Remove {
        #[arg(required = true)]
        selectors: Vec<String>,
    },
    /// Trust exactly the certificates found in the given files and directories.
    Sync {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Only show what would change.
        #[arg(long)]
        dry_run: bool,
    },
    /// Show or change the check flags.
    Config {
        #[arg(long)]
        check_hostname: Option<bool>,
        #[arg(long)]
        check_validity: Option<bool>,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn verify_cli() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parse_sync() {
        let cli = Cli::try_parse_from(["trustconf", "sync", "a.pem", "certs", "--dry-run", "-v"]).unwrap();

        assert!(cli.verbose);
        match cli.command {
            Command::Sync { paths, dry_run } => {
                assert_eq!(paths, vec![PathBuf::from("a.pem"), PathBuf::from("certs")]);
                assert!(dry_run);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn parse_config_flags() {
        let cli = Cli::try_parse_from([
            "trustconf",
            "--store",
            "store.pem",
            "config",
            "--check-hostname",
            "true",
        ])
        .unwrap();

        assert_eq!(cli.store, Some(PathBuf::from("store.pem")));
        match cli.command {
            Command::Config {
                check_hostname,
                check_validity,
            } => {
                assert_eq!(check_hostname, Some(true));
                assert_eq!(check_validity, None);
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn import_needs_files() {
        assert!(Cli::try_parse_from(["trustconf", "import"]).is_err());
    }
}
