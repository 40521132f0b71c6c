//! Locating the OpenLDAP binaries and schema directory.

use ldap_fixture_core::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Schema directories searched when none are configured.
pub const DEFAULT_SCHEMA_DIRS: &[&str] = &[
    "/etc/ldap/schema",
    "/etc/openldap/schema",
    "/usr/local/openldap/schema",
];

/// Binary directories searched, before `$PATH`, when none are configured.
pub const DEFAULT_BINARY_DIRS: &[&str] = &[
    "/usr/sbin",
    "/usr/bin",
    "/usr/lib/openldap",
    "/usr/lib64/openldap",
    "/usr/local/sbin",
    "/usr/local/bin",
];

/// File whose presence marks a usable schema directory.
pub const CORE_SCHEMA: &str = "core.schema";

/// Resolved locations of everything the fixture executes or includes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolPaths {
    /// The directory server
    pub slapd: PathBuf,
    /// Client used to add entries
    pub ldapadd: PathBuf,
    /// Client used to delete entries
    pub ldapdelete: PathBuf,
    /// Client used to read entries
    pub ldapsearch: PathBuf,
    /// Configuration checker
    pub slaptest: PathBuf,
    /// Directory holding `core.schema` and friends
    pub schema_dir: PathBuf,
}

impl ToolPaths {
    /// Finds each tool in the first directory of `binary_dirs` that has it,
    /// and the first directory of `schema_dirs` containing `core.schema`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ConfigError`] naming the missing file and the
    /// directories that were tried.
    pub fn discover(binary_dirs: &[PathBuf], schema_dirs: &[PathBuf]) -> Result<Self> {
        let schema_dir = schema_dirs
            .iter()
            .find(|dir| dir.join(CORE_SCHEMA).is_file())
            .cloned()
            .ok_or_else(|| missing(CORE_SCHEMA, schema_dirs))?;

        let paths = Self {
            slapd: find_binary("slapd", binary_dirs)?,
            ldapadd: find_binary("ldapadd", binary_dirs)?,
            ldapdelete: find_binary("ldapdelete", binary_dirs)?,
            ldapsearch: find_binary("ldapsearch", binary_dirs)?,
            slaptest: find_binary("slaptest", binary_dirs)?,
            schema_dir,
        };
        debug!(slapd = %paths.slapd.display(), schema_dir = %paths.schema_dir.display(), "located OpenLDAP");
        Ok(paths)
    }

    /// Discovers the tools in the default locations.
    ///
    /// # Errors
    ///
    /// See [`ToolPaths::discover`].
    pub fn discover_default() -> Result<Self> {
        Self::discover(&default_binary_dirs(), &default_schema_dirs())
    }

    /// Resolves a schema name against the schema directory.
    ///
    /// Absolute paths are returned unchanged.
    #[must_use]
    pub fn schema_path(&self, schema: &str) -> PathBuf {
        let path = Path::new(schema);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.schema_dir.join(path)
        }
    }
}

/// The default binary search path followed by every `$PATH` entry.
#[must_use]
pub fn default_binary_dirs() -> Vec<PathBuf> {
    let mut dirs: Vec<PathBuf> = DEFAULT_BINARY_DIRS.iter().map(PathBuf::from).collect();
    if let Some(path) = std::env::var_os("PATH") {
        dirs.extend(std::env::split_paths(&path));
    }
    dirs
}

/// The default schema search path.
#[must_use]
pub fn default_schema_dirs() -> Vec<PathBuf> {
    DEFAULT_SCHEMA_DIRS.iter().map(PathBuf::from).collect()
}

fn find_binary(name: &str, dirs: &[PathBuf]) -> Result<PathBuf> {
    dirs.iter()
        .map(|dir| dir.join(name))
        .find(|candidate| candidate.is_file())
        .ok_or_else(|| missing(name, dirs))
}

fn missing(name: &str, dirs: &[PathBuf]) -> Error {
    let tried = dirs
        .iter()
        .map(|dir| dir.display().to_string())
        .collect::<Vec<_>>()
        .join(", ");
    Error::ConfigError(format!("could not find {name} in any of: {tried}"))
}
