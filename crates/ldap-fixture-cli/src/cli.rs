//! Command-line arguments and their mapping onto [`ServerOptions`].

use anyhow::{Context, Result};
use clap::Parser;
use ldap_fixture_core::ldif;
use ldap_fixture_core::types::{DEFAULT_HOST, DEFAULT_ROOTDN, DEFAULT_SUFFIX};
use ldap_fixture_server::config::DEFAULT_STARTUP_TIMEOUT_SECS;
use ldap_fixture_server::{ServerOptions, TlsConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Run a disposable OpenLDAP server until interrupted.
#[derive(Parser, Debug)]
#[command(name = "ldap-fixture", version)]
pub(crate) struct Cli {
    /// Port to listen on; a free one is picked when omitted.
    #[arg(long)]
    pub(crate) port: Option<u16>,
    /// Host to listen on.
    #[arg(long, default_value = DEFAULT_HOST)]
    pub(crate) host: String,
    /// DN of the root entry.
    #[arg(long, default_value = DEFAULT_SUFFIX)]
    pub(crate) suffix: String,
    /// DN of the admin user.
    #[arg(long, default_value = DEFAULT_ROOTDN)]
    pub(crate) rootdn: String,
    /// Admin password; a random one is generated when omitted.
    #[arg(long)]
    pub(crate) rootpw: Option<String>,
    /// slapd debug level.
    #[arg(long, default_value_t = 0)]
    pub(crate) debug: u32,
    /// Also serve the HTTP control endpoint on this address.
    #[arg(long, value_name = "HOST:PORT")]
    pub(crate) control: Option<String>,
    /// LDIF file loaded after the root entry.
    #[arg(long, value_name = "FILE")]
    pub(crate) initial: Option<PathBuf>,
    /// Schemas to include, by name or absolute path.
    #[arg(long, num_args = 1.., value_name = "SCHEMA")]
    pub(crate) schemas: Vec<String>,
    /// Warn about and skip schemas that cannot be found.
    #[arg(long)]
    pub(crate) skip_missing_schemas: bool,
    /// Seconds to wait for slapd to accept connections.
    #[arg(long, value_name = "SECS", default_value_t = DEFAULT_STARTUP_TIMEOUT_SECS)]
    pub(crate) startup_timeout: u64,
    /// Trust root PEM; enables ldaps.
    #[arg(long, value_name = "FILE", requires_all = ["tls_chain", "tls_cert", "tls_key"])]
    pub(crate) tls_root: Option<PathBuf>,
    /// Certificate chain PEM served by slapd.
    #[arg(long, value_name = "FILE", requires = "tls_root")]
    pub(crate) tls_chain: Option<PathBuf>,
    /// Server certificate PEM.
    #[arg(long, value_name = "FILE", requires = "tls_root")]
    pub(crate) tls_cert: Option<PathBuf>,
    /// Server private key PEM.
    #[arg(long, value_name = "FILE", requires = "tls_root")]
    pub(crate) tls_key: Option<PathBuf>,
}

impl Cli {
    /// Builds server options, reading every referenced file.
    pub(crate) fn into_options(self) -> Result<ServerOptions> {
        let mut options = ServerOptions::new()
            .with_host(self.host)
            .with_suffix(self.suffix)
            .with_rootdn(self.rootdn)
            .with_slapd_debug(self.debug)
            .with_skip_missing_schemas(self.skip_missing_schemas)
            .with_startup_timeout(Duration::from_secs(self.startup_timeout));

        if let Some(port) = self.port {
            options = options.with_port(port);
        }
        if let Some(rootpw) = self.rootpw {
            options = options.with_rootpw(rootpw);
        }
        if let Some(control) = self.control {
            options = options.with_control_address(control);
        }
        if !self.schemas.is_empty() {
            options = options.with_schemas(self.schemas);
        }
        if let Some(path) = self.initial {
            let text = fs::read(&path)
                .with_context(|| format!("reading initial data {}", path.display()))?;
            let data = ldif::decode(text)
                .with_context(|| format!("parsing initial data {}", path.display()))?;
            options = options.with_initial_data(data);
        }
        if let (Some(root), Some(chain), Some(cert), Some(key)) =
            (self.tls_root, self.tls_chain, self.tls_cert, self.tls_key)
        {
            options = options.with_tls(TlsConfig::new(
                read_pem(&root)?,
                vec![read_pem(&chain)?],
                read_pem(&cert)?,
                read_pem(&key)?,
            ));
        }
        Ok(options)
    }
}

fn read_pem(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(args: &[&str]) -> std::result::Result<Cli, clap::Error> {
        Cli::try_parse_from(std::iter::once("ldap-fixture").chain(args.iter().copied()))
    }

    #[test]
    fn command_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn defaults_map_to_default_options() {
        let options = parse(&[]).unwrap().into_options().unwrap();
        let defaults = ServerOptions::default();
        assert_eq!(options.suffix, defaults.suffix);
        assert_eq!(options.rootdn, defaults.rootdn);
        assert_eq!(options.rootpw, "");
        assert_eq!(options.host, defaults.host);
        assert_eq!(options.port, None);
        assert_eq!(options.schemas, defaults.schemas);
        assert_eq!(options.startup_timeout_secs, defaults.startup_timeout_secs);
        assert!(options.tls.is_none());
        assert!(options.control_address.is_none());
    }

    #[test]
    fn flags_override_options() {
        let options = parse(&[
            "--port",
            "3890",
            "--host",
            "127.0.0.1",
            "--suffix",
            "dc=test,dc=local",
            "--rootdn",
            "cn=admin,dc=test,dc=local",
            "--rootpw",
            "secret",
            "--debug",
            "256",
            "--control",
            "127.0.0.1:8089",
            "--schemas",
            "core.schema",
            "cosine.schema",
            "--skip-missing-schemas",
            "--startup-timeout",
            "30",
        ])
        .unwrap()
        .into_options()
        .unwrap();

        assert_eq!(options.port, Some(3890));
        assert_eq!(options.host, "127.0.0.1");
        assert_eq!(options.suffix, "dc=test,dc=local");
        assert_eq!(options.rootdn, "cn=admin,dc=test,dc=local");
        assert_eq!(options.rootpw, "secret");
        assert_eq!(options.slapd_debug, 256);
        assert_eq!(options.control_address.as_deref(), Some("127.0.0.1:8089"));
        assert_eq!(options.schemas, vec!["core.schema", "cosine.schema"]);
        assert!(options.skip_missing_schemas);
        assert_eq!(options.startup_timeout_secs, 30);
    }

    #[test]
    fn initial_data_is_read_from_ldif_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("initial.ldif");
        fs::write(&path, "version: 1\n\ndn: ou=people\nou: people\n").unwrap();

        let options = parse(&["--initial", path.to_str().unwrap()])
            .unwrap()
            .into_options()
            .unwrap();
        assert!(options.initial_data.contains("ou=people"));
    }

    #[test]
    fn unreadable_initial_data_is_an_error() {
        let err = parse(&["--initial", "/nonexistent/initial.ldif"])
            .unwrap()
            .into_options()
            .unwrap_err();
        assert!(format!("{err:#}").contains("/nonexistent/initial.ldif"));
    }

    #[test]
    fn tls_flags_must_come_together() {
        assert!(parse(&["--tls-root", "root.pem"]).is_err());
        assert!(parse(&["--tls-key", "key.pem"]).is_err());
    }

    #[test]
    fn tls_files_are_loaded() {
        let dir = tempfile::tempdir().unwrap();
        let file = |name: &str, body: &str| {
            let path = dir.path().join(name);
            fs::write(&path, body).unwrap();
            path.display().to_string()
        };
        let root = file("root.pem", "ROOT");
        let chain = file("chain.pem", "CHAIN");
        let cert = file("cert.pem", "CERT");
        let key = file("key.pem", "KEY");

        let options = parse(&[
            "--tls-root",
            &root,
            "--tls-chain",
            &chain,
            "--tls-cert",
            &cert,
            "--tls-key",
            &key,
        ])
        .unwrap()
        .into_options()
        .unwrap();

        assert_eq!(
            options.tls,
            Some(TlsConfig::new("ROOT", vec!["CHAIN".to_string()], "CERT", "KEY"))
        );
    }
}
