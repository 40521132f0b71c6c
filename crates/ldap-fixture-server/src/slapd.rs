//! `slapd.conf` generation.

use ldap_fixture_core::Result;
use std::fmt::Write as _;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::ServerConfig;
use crate::workspace::Workspace;

/// Renders the server configuration for `workspace`.
///
/// Every argument is quoted so paths and DNs containing spaces survive.
#[must_use]
pub fn render(config: &ServerConfig, workspace: &Workspace) -> String {
    let mut out = String::new();
    for schema in &config.schema_paths {
        directive(&mut out, "include", &path_arg(schema));
    }
    if workspace.has_tls() {
        directive(&mut out, "TLSCACertificateFile", &path_arg(&workspace.chain_path()));
        directive(&mut out, "TLSCertificateFile", &path_arg(&workspace.certificate_path()));
        directive(&mut out, "TLSCertificateKeyFile", &path_arg(&workspace.key_path()));
    }
    directive(&mut out, "moduleload", "back_mdb");
    directive(&mut out, "database", "mdb");
    directive(&mut out, "directory", &path_arg(&workspace.data_dir()));
    directive(&mut out, "suffix", config.suffix.as_str());
    directive(&mut out, "rootdn", &config.rootdn);
    directive(&mut out, "rootpw", &config.rootpw);
    out
}

/// Renders and writes `slapd.conf` into the workspace, returning its path.
///
/// # Errors
///
/// Returns [`Error::Io`](ldap_fixture_core::Error::Io) if the file cannot be written.
pub fn write_config(config: &ServerConfig, workspace: &Workspace) -> Result<PathBuf> {
    let path = workspace.config_path();
    fs::write(&path, render(config, workspace))?;
    Ok(path)
}

/// Quotes a value for `slapd.conf`.
#[must_use]
pub fn quote(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for ch in value.chars() {
        if matches!(ch, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(ch);
    }
    quoted.push('"');
    quoted
}

fn path_arg(path: &Path) -> String {
    path.display().to_string()
}

fn directive(out: &mut String, name: &str, value: &str) {
    let _ = writeln!(out, "{name} {}", quote(value));
}
