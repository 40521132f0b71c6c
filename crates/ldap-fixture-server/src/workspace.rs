//! Scratch directory owned by one server instance.

use ldap_fixture_core::{Result, TlsConfig};
use std::fs;
use std::path::{Path, PathBuf};
use tempfile::TempDir;
use tracing::debug;

/// Prefix of every workspace directory name.
pub const WORKSPACE_PREFIX: &str = "ldap-fixture-";

const DATA_DIR: &str = "ldif-data";
const CONFIG_FILE: &str = "slapd.conf";
const CA_BUNDLE: &str = "ca-bundle.pem";
const CHAIN: &str = "chain.pem";
const CERTIFICATE: &str = "server.crt";
const KEY: &str = "server.key";

/// Temporary directory holding `slapd.conf`, the database and TLS files.
///
/// The directory is removed by [`Workspace::destroy`], or when the value is
/// dropped.
#[derive(Debug)]
pub struct Workspace {
    path: PathBuf,
    dir: Option<TempDir>,
    tls: bool,
}

impl Workspace {
    /// Creates a fresh workspace, writing the TLS files when `tls` is given.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](ldap_fixture_core::Error::Io) if any file cannot be written;
    /// nothing is left behind in that case.
    pub fn create(tls: Option<&TlsConfig>) -> Result<Self> {
        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir()?;
        let workspace = Self {
            path: dir.path().to_path_buf(),
            dir: Some(dir),
            tls: tls.is_some(),
        };

        fs::create_dir(workspace.data_dir())?;
        if let Some(tls) = tls {
            fs::write(workspace.ca_bundle_path(), &tls.root)?;
            fs::write(workspace.chain_path(), tls.chain_pem())?;
            fs::write(workspace.certificate_path(), &tls.certificate)?;
            fs::write(workspace.key_path(), &tls.key)?;
        }

        debug!(path = %workspace.path.display(), "created workspace");
        Ok(workspace)
    }

    /// Root of the workspace.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the directory still exists on disk.
    #[must_use]
    pub fn exists(&self) -> bool {
        self.dir.is_some() && self.path.is_dir()
    }

    /// Backing store directory.
    #[must_use]
    pub fn data_dir(&self) -> PathBuf {
        self.path.join(DATA_DIR)
    }

    /// Generated server configuration.
    #[must_use]
    pub fn config_path(&self) -> PathBuf {
        self.path.join(CONFIG_FILE)
    }

    /// Trust root handed to client tools.
    #[must_use]
    pub fn ca_bundle_path(&self) -> PathBuf {
        self.path.join(CA_BUNDLE)
    }

    /// Certificate chain served by slapd.
    #[must_use]
    pub fn chain_path(&self) -> PathBuf {
        self.path.join(CHAIN)
    }

    /// Leaf certificate.
    #[must_use]
    pub fn certificate_path(&self) -> PathBuf {
        self.path.join(CERTIFICATE)
    }

    /// Leaf private key.
    #[must_use]
    pub fn key_path(&self) -> PathBuf {
        self.path.join(KEY)
    }

    /// Whether TLS files were written.
    #[must_use]
    pub const fn has_tls(&self) -> bool {
        self.tls
    }

    /// Gives up ownership of the directory, leaving it on disk.
    #[must_use]
    pub fn keep(mut self) -> PathBuf {
        if let Some(dir) = self.dir.take() {
            // Newer tempfile releases rename this to `keep`.
            #[allow(deprecated)]
            let _ = dir.into_path();
        }
        self.path
    }

    /// Removes the workspace recursively. Calling it again is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`](ldap_fixture_core::Error::Io) if removal fails.
    pub fn destroy(&mut self) -> Result<()> {
        if let Some(dir) = self.dir.take() {
            dir.close()?;
            debug!(path = %self.path.display(), "removed workspace");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tls() -> TlsConfig {
        TlsConfig::new(
            "ROOT",
            vec!["  INTERMEDIATE\n".to_string(), "\nROOT\n".to_string()],
            "CERT",
            "KEY",
        )
    }

    #[test]
    fn create_lays_out_directory() {
        let mut workspace = Workspace::create(None).unwrap();
        assert!(workspace.exists());
        assert!(workspace.data_dir().is_dir());
        assert!(!workspace.ca_bundle_path().exists());
        assert!(!workspace.has_tls());
        assert!(workspace
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(WORKSPACE_PREFIX));
        workspace.destroy().unwrap();
    }

    #[test]
    fn create_writes_tls_material() {
        let workspace = Workspace::create(Some(&tls())).unwrap();
        assert!(workspace.has_tls());
        assert_eq!(fs::read_to_string(workspace.ca_bundle_path()).unwrap(), "ROOT");
        assert_eq!(
            fs::read_to_string(workspace.chain_path()).unwrap(),
            "INTERMEDIATE\nROOT"
        );
        assert_eq!(fs::read_to_string(workspace.certificate_path()).unwrap(), "CERT");
        assert_eq!(fs::read_to_string(workspace.key_path()).unwrap(), "KEY");
    }

    #[test]
    fn destroy_is_idempotent() {
        let mut workspace = Workspace::create(None).unwrap();
        let path = workspace.path().to_path_buf();
        workspace.destroy().unwrap();
        assert!(!path.exists());
        assert!(!workspace.exists());
        workspace.destroy().unwrap();
    }

    #[test]
    fn workspaces_are_distinct() {
        let first = Workspace::create(None).unwrap();
        let second = Workspace::create(None).unwrap();
        assert_ne!(first.path(), second.path());
    }

    #[test]
    fn drop_removes_directory() {
        let workspace = Workspace::create(None).unwrap();
        let path = workspace.path().to_path_buf();
        drop(workspace);
        assert!(!path.exists());
    }

    #[test]
    fn keep_leaves_directory_behind() {
        let workspace = Workspace::create(None).unwrap();
        let path = workspace.keep();
        assert!(path.join("ldif-data").is_dir());
        fs::remove_dir_all(&path).unwrap();
    }
}
